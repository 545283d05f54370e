//! # Restart archives
//!
//! Binary (`bincode`) snapshot of a time integrator: a header with the
//! scheme name, order, time, step number and time step history, followed
//! by all history vectors in a fixed, scheme dependent order and the
//! cached preconditioners. A resumed run reuses the stored
//! preconditioners, so it reproduces the uninterrupted run exactly.
//!
//! # Example
//! ```
//! use rustdg::restart::{RestartArchive, RestartHeader};
//! use rustdg::types::DofVector;
//!
//! let dir = std::env::temp_dir().join("rustdg_doc_restart.bin");
//! let archive = RestartArchive::new(
//!     RestartHeader {
//!         scheme: "demo".to_string(),
//!         order: 2,
//!         time: 0.5,
//!         time_step_number: 6,
//!         time_steps: vec![0.1, 0.1],
//!     },
//!     vec![DofVector::from(vec![1., 2.]), DofVector::from(vec![3., 4.])],
//! );
//! archive.write(&dir).unwrap();
//! let restored = RestartArchive::read(&dir).unwrap();
//! assert_eq!(archive, restored);
//! # std::fs::remove_file(&dir).unwrap();
//! ```
use crate::error::{DgError, Result};
use crate::solvers::PreconditionerSnapshot;
use crate::time_integration::TimeIntBdfBase;
use crate::types::DofVector;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Archive format version
pub const RESTART_VERSION: u32 = 2;

/// Settings for periodically written restart files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartData {
    /// Write restart files
    pub write_restart: bool,
    /// Simulated time between two restart files
    pub interval_time: f64,
    /// Path of the restart file, overwritten every time
    pub filename: String,
}

impl Default for RestartData {
    fn default() -> Self {
        Self {
            write_restart: false,
            interval_time: f64::MAX,
            filename: "restart.bin".to_string(),
        }
    }
}

impl RestartData {
    /// True if the step from `time - dt` to `time` crossed a write instant
    pub fn do_write(&self, time: f64, dt: f64, start_time: f64) -> bool {
        if !self.write_restart || self.interval_time <= 0. {
            return false;
        }
        let previous = ((time - dt - start_time) / self.interval_time + 1e-10).floor();
        let current = ((time - start_time) / self.interval_time + 1e-10).floor();
        current > previous
    }
}

/// Scalar state of a BDF integrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartHeader {
    /// Name of the time integration scheme
    pub scheme: String,
    /// Target order of the BDF scheme
    pub order: usize,
    /// Time of the last completed step
    pub time: f64,
    /// Number of the next step
    pub time_step_number: usize,
    /// Time step history
    pub time_steps: Vec<f64>,
}

impl RestartHeader {
    /// Header of `base` for `scheme`
    pub fn from_base(scheme: &str, base: &TimeIntBdfBase) -> Self {
        Self {
            scheme: scheme.to_string(),
            order: base.order,
            time: base.time,
            time_step_number: base.time_step_number,
            time_steps: base.time_steps.clone(),
        }
    }

    /// Restore time, step counter and time step history into `base`
    ///
    /// # Errors
    /// Scheme or order of the archive differ from `base`.
    pub fn restore_base(&self, scheme: &str, base: &mut TimeIntBdfBase) -> Result<()> {
        if self.scheme != scheme {
            return Err(DgError::Config(format!(
                "restart archive written by scheme {}, cannot resume {}",
                self.scheme, scheme
            )));
        }
        if self.order != base.order || self.time_steps.len() != base.time_steps.len() {
            return Err(DgError::Config(format!(
                "restart archive has order {}, integrator has order {}",
                self.order, base.order
            )));
        }
        base.time = self.time;
        base.time_step_number = self.time_step_number;
        base.time_steps.copy_from_slice(&self.time_steps);
        base.update_time_integrator_constants();
        Ok(())
    }
}

/// Complete restart archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartArchive {
    /// Format version
    pub version: u32,
    /// Scalar state
    pub header: RestartHeader,
    /// History vectors
    pub vectors: Vec<DofVector>,
    /// Cached preconditioners, `None` if not built yet
    pub preconditioners: Vec<Option<PreconditionerSnapshot>>,
}

impl RestartArchive {
    /// Archive of the current format version
    pub fn new(header: RestartHeader, vectors: Vec<DofVector>) -> Self {
        Self {
            version: RESTART_VERSION,
            header,
            vectors,
            preconditioners: vec![],
        }
    }

    /// Attach the cached preconditioners of the integrator
    pub fn with_preconditioners(mut self, preconditioners: Vec<Option<PreconditionerSnapshot>>) -> Self {
        self.preconditioners = preconditioners;
        self
    }

    /// Write to `path`
    ///
    /// # Errors
    /// File cannot be created or written.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        log::info!(
            "restart archive written to {} at time {:.6e}",
            path.as_ref().display(),
            self.header.time
        );
        Ok(())
    }

    /// Read from `path`
    ///
    /// # Errors
    /// File cannot be opened, is corrupt or has a different version.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let archive: Self = bincode::deserialize_from(reader)?;
        if archive.version != RESTART_VERSION {
            return Err(DgError::Config(format!(
                "restart archive version {} not supported, expected {}",
                archive.version, RESTART_VERSION
            )));
        }
        Ok(archive)
    }

    /// Check the number and sizes of the history vectors
    ///
    /// # Errors
    /// Vector count or length mismatch.
    pub fn validate(&self, sizes: &[usize]) -> Result<()> {
        if self.vectors.len() != sizes.len() {
            return Err(DgError::Config(format!(
                "restart archive holds {} vectors, expected {}",
                self.vectors.len(),
                sizes.len()
            )));
        }
        for (i, (v, n)) in self.vectors.iter().zip(sizes).enumerate() {
            if v.len() != *n {
                return Err(DgError::Config(format!(
                    "restart vector {} has length {}, expected {}",
                    i,
                    v.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    /// Move the stored preconditioners out, `count` are expected
    ///
    /// # Errors
    /// The archive holds a different number of preconditioners.
    pub fn take_preconditioners(&mut self, count: usize) -> Result<Vec<Option<PreconditionerSnapshot>>> {
        if self.preconditioners.len() != count {
            return Err(DgError::Config(format!(
                "restart archive holds {} preconditioners, expected {}",
                self.preconditioners.len(),
                count
            )));
        }
        Ok(std::mem::take(&mut self.preconditioners))
    }
}

/// Integrators that can be paused and resumed
pub trait Restart {
    /// Write the complete integrator state to `path`
    ///
    /// # Errors
    /// Io or serialization failure.
    fn write_restart(&self, path: &Path) -> Result<()>;

    /// Resume from the state stored in `path`
    ///
    /// # Errors
    /// Io failure or an archive of a different scheme, order or size.
    fn read_restart(&mut self, path: &Path) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_header_restores_base() {
        let mut base = TimeIntBdfBase::new(2, true, 0., 1., 0.1).unwrap();
        base.do_timestep_post();
        base.do_timestep_post();
        base.set_time_step_size(0.05);
        let header = RestartHeader::from_base("pressure correction", &base);

        let mut fresh = TimeIntBdfBase::new(2, true, 0., 1., 0.1).unwrap();
        header.restore_base("pressure correction", &mut fresh).unwrap();
        assert_eq!(fresh, base);
        assert!(header.restore_base("dual splitting", &mut fresh).is_err());
    }

    #[test]
    fn test_archive_validate() {
        let header = RestartHeader {
            scheme: "s".to_string(),
            order: 1,
            time: 0.,
            time_step_number: 1,
            time_steps: vec![0.1],
        };
        let mut archive = RestartArchive::new(header, vec![DofVector::zeros(3)])
            .with_preconditioners(vec![None]);
        assert!(archive.validate(&[3]).is_ok());
        assert!(archive.validate(&[4]).is_err());
        assert!(archive.validate(&[3, 3]).is_err());
        assert!(archive.take_preconditioners(2).is_err());
        assert_eq!(archive.take_preconditioners(1).unwrap(), vec![None]);
    }

    #[test]
    fn test_archive_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.bin");
        let header = RestartHeader {
            scheme: "s".to_string(),
            order: 2,
            time: 0.25,
            time_step_number: 3,
            time_steps: vec![0.1, 0.15],
        };
        let archive = RestartArchive::new(header, vec![DofVector::from(vec![1., -2.])])
            .with_preconditioners(vec![
                Some(PreconditionerSnapshot::PointJacobi(DofVector::from(vec![0.5, 0.25]))),
                Some(PreconditionerSnapshot::InverseMass),
            ]);
        archive.write(&path).unwrap();
        assert_eq!(RestartArchive::read(&path).unwrap(), archive);
        // no write access to a directory path
        assert!(matches!(archive.write(dir.path()), Err(DgError::Io(_))));
    }

    #[test]
    fn test_write_instants() {
        let data = RestartData {
            write_restart: true,
            interval_time: 0.25,
            filename: String::new(),
        };
        assert!(!data.do_write(0.2, 0.1, 0.));
        assert!(data.do_write(0.3, 0.1, 0.));
        assert!(data.do_write(0.25, 0.05, 0.));
        assert!(!data.do_write(0.3, 0.05, 0.));
    }
}
