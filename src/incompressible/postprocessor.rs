//! Post-processing hook of the incompressible solvers
//!
//! The time integrators call [`PostProcessor::do_postprocessing`] once
//! per completed time step with the same arguments for every scheme.
use crate::fe::DgSpace;
use crate::functions::{interpolate, l2_error, l2_norm, mean_value, FunctionPtr};
use crate::types::DofVector;

/// Receives the solution after every time step
pub trait PostProcessor {
    /// Called with the end-of-step velocity, the intermediate velocity of
    /// the splitting schemes (the velocity itself for the coupled scheme),
    /// the pressure, the time and the number of the completed step
    fn do_postprocessing(
        &mut self,
        velocity: &DofVector,
        intermediate_velocity: &DofVector,
        pressure: &DofVector,
        time: f64,
        time_step_number: usize,
    );
}

/// Diagnostics of one time step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowDiagnostics {
    /// Time
    pub time: f64,
    /// Kinetic energy $ \frac{1}{2} \int |u|^2 $
    pub kinetic_energy: f64,
    /// Relative L2 error of the velocity, if an analytical solution is known
    pub error_velocity: Option<f64>,
    /// Relative L2 error of the pressure with matched mean values
    pub error_pressure: Option<f64>,
}

/// Logs kinetic energy and errors every `interval` steps
pub struct LoggingPostProcessor {
    space_u: DgSpace,
    space_p: DgSpace,
    analytical_velocity: Option<FunctionPtr>,
    analytical_pressure: Option<FunctionPtr>,
    /// Log every n-th step
    pub interval: usize,
    /// Diagnostics of the last step
    pub last: Option<FlowDiagnostics>,
}

impl LoggingPostProcessor {
    /// Post-processor without reference solution
    pub fn new(space_u: &DgSpace, space_p: &DgSpace) -> Self {
        Self {
            space_u: space_u.clone(),
            space_p: space_p.clone(),
            analytical_velocity: None,
            analytical_pressure: None,
            interval: 1,
            last: None,
        }
    }

    /// Compare against an analytical solution
    pub fn with_analytical_solution(mut self, velocity: FunctionPtr, pressure: FunctionPtr) -> Self {
        self.analytical_velocity = Some(velocity);
        self.analytical_pressure = Some(pressure);
        self
    }

    fn relative(err: f64, norm: f64) -> f64 {
        if norm > 1e-12 {
            err / norm
        } else {
            err
        }
    }

    fn pressure_error(&self, pressure: &DofVector, exact: &FunctionPtr, time: f64) -> f64 {
        let exact_mean = mean_value(&self.space_p, &interpolate(&self.space_p, exact.as_ref(), time), 0);
        let shift = exact_mean - mean_value(&self.space_p, pressure, 0);
        let shifted = pressure.mapv(|p| p + shift);
        let (err, norm) = l2_error(&self.space_p, &shifted, exact.as_ref(), time);
        Self::relative(err, norm)
    }
}

impl PostProcessor for LoggingPostProcessor {
    fn do_postprocessing(
        &mut self,
        velocity: &DofVector,
        _intermediate_velocity: &DofVector,
        pressure: &DofVector,
        time: f64,
        time_step_number: usize,
    ) {
        let energy = 0.5 * l2_norm(&self.space_u, velocity).powi(2);
        let error_velocity = self.analytical_velocity.as_ref().map(|f| {
            let (err, norm) = l2_error(&self.space_u, velocity, f.as_ref(), time);
            Self::relative(err, norm)
        });
        let error_pressure = self
            .analytical_pressure
            .as_ref()
            .map(|f| self.pressure_error(pressure, f, time));
        let diagnostics = FlowDiagnostics {
            time,
            kinetic_energy: energy,
            error_velocity,
            error_pressure,
        };
        if time_step_number % self.interval.max(1) == 0 {
            match (error_velocity, error_pressure) {
                (Some(eu), Some(ep)) => log::info!(
                    "step {:>6}, time = {:.4e}: energy = {:.6e}, error u = {:.4e}, error p = {:.4e}",
                    time_step_number,
                    time,
                    energy,
                    eu,
                    ep
                ),
                _ => log::info!(
                    "step {:>6}, time = {:.4e}: energy = {:.6e}",
                    time_step_number,
                    time,
                    energy
                ),
            }
        }
        self.last = Some(diagnostics);
    }
}
