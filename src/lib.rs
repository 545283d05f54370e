//! # `rustdg`: Matrix-free discontinuous Galerkin solver for incompressible flows
//!<img align="right" src="https://rustacean.net/assets/cuddlyferris.png" width="80">
//!
//! # Details
//!
//! Discretization with nodal discontinuous Galerkin elements of arbitrary
//! polynomial degree on structured Cartesian grids. All operators are
//! evaluated matrix-free, cell by cell, and parallelized over the cells
//! with `rayon`.
//!
//! ## Implemented solver
//!
//! - `Incompressible Navier-Stokes: dual splitting scheme`,
//! see [`incompressible::time_integration::TimeIntBdfDualSplitting`]
//! - `Incompressible Navier-Stokes: pressure correction scheme`,
//! see [`incompressible::time_integration::TimeIntBdfPressureCorrection`]
//! - `Incompressible Navier-Stokes: coupled solution approach`,
//! see [`incompressible::time_integration::TimeIntBdfCoupled`]
//! - `Scalar convection-diffusion`,
//! see [`convection_diffusion::TimeIntBdfConvDiff`]
//!
//! Turbulence is modelled with eddy viscosity models, see
//! [`incompressible::spatial::turbulence_model`]. Partitioned
//! fluid-structure interaction is driven by [`fsi::FixedPointSolver`],
//! data is transferred between non-matching grids by
//! [`interface_coupling::InterfaceCoupling`].
//!
//! # Example
//! Decay of a Taylor-Green vortex with the pressure correction scheme
//! ```
//! use rustdg::incompressible::{taylor_green, InputParameters, TemporalDiscretization};
//! use rustdg::{integrate, Integrate};
//!
//! let mut param = InputParameters::default();
//! param.temporal_discretization = TemporalDiscretization::BdfPressureCorrection;
//! param.degree_u = 3;
//! param.viscosity = 0.1;
//! param.time_step_size = 1e-2;
//! param.end_time = 0.05;
//! let mut navier = taylor_green::setup(&param, 1).unwrap();
//! integrate(navier.as_mut(), 0.05, None).unwrap();
//! assert!((navier.get_time() - 0.05).abs() < 1e-10);
//! ```
//!
//! ## Restart
//!
//! All time integrators write their complete state to a binary restart
//! archive (`bincode`), see [`restart`].
//!
//! ## Documentation
//!
//! Download and run:
//!
//! `cargo doc --open`
#![warn(missing_docs)]
#![allow(clippy::unnecessary_cast)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#[macro_use]
extern crate enum_dispatch;
pub mod convection_diffusion;
pub mod error;
pub mod fe;
pub mod fsi;
pub mod functions;
pub mod grid;
pub mod incompressible;
pub mod interface_coupling;
pub mod operators;
pub mod restart;
pub mod solvers;
pub mod time_integration;
pub mod types;
pub use error::{DgError, Result};

const MAX_TIMESTEP: usize = 10_000_000;

/// Integrate trait, step forward in time, and write results
pub trait Integrate {
    /// Update solution
    ///
    /// # Errors
    /// A solver of the time step failed.
    fn update(&mut self) -> Result<()>;
    /// Receive current time
    fn get_time(&self) -> f64;
    /// Get timestep
    fn get_dt(&self) -> f64;
    /// Callback function (can be used for i/o)
    fn callback(&mut self);
    /// Additional break criteria
    fn exit(&mut self) -> bool;
}

impl<T: Integrate + ?Sized> Integrate for Box<T> {
    fn update(&mut self) -> Result<()> {
        (**self).update()
    }

    fn get_time(&self) -> f64 {
        (**self).get_time()
    }

    fn get_dt(&self) -> f64 {
        (**self).get_dt()
    }

    fn callback(&mut self) {
        (**self).callback();
    }

    fn exit(&mut self) -> bool {
        (**self).exit()
    }
}

/// Integrade pde, that implements the Integrate trait.
///
/// Specify `save_intervall` to force writing an output.
///
/// Stop Criteria:
/// 1. Timestep limit
/// 2. Time limit
/// 3. [`Integrate::exit`]
///
/// # Errors
/// The first failing time step aborts the integration.
pub fn integrate<T: Integrate + ?Sized>(
    pde: &mut T,
    max_time: f64,
    save_intervall: Option<f64>,
) -> Result<()> {
    let mut timestep: usize = 0;
    let eps_dt = pde.get_dt() * 1e-4;
    loop {
        // Update
        if let Err(err) = pde.update() {
            log::error!("time step {} failed at time {:.6e}: {}", timestep + 1, pde.get_time(), err);
            return Err(err);
        }
        timestep += 1;

        // Save
        if let Some(dt_save) = &save_intervall {
            if (pde.get_time() % dt_save) < pde.get_dt() / 2.
                || (pde.get_time() % dt_save) > dt_save - pde.get_dt() / 2.
            {
                log::debug!("Save at time: {:4.3}", pde.get_time());
                pde.callback();
            }
        }

        // Break
        if pde.get_time() + eps_dt >= max_time {
            log::info!("time limit reached: {:?}", pde.get_time());
            break;
        }
        if timestep >= MAX_TIMESTEP {
            log::warn!("timestep limit reached: {:?}", timestep);
            break;
        }
        if pde.exit() {
            log::info!("break criteria triggered");
            break;
        }
    }
    Ok(())
}
