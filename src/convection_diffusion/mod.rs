//! # Scalar convection-diffusion
//!
//! $$
//! \frac{\partial c}{\partial t} + \nabla \cdot (c \, b) - \kappa \Delta c = f
//! $$
//! with a prescribed velocity field $ b(x, t) $, discretized with the
//! upwind transport operator and SIPG diffusion, integrated in time with
//! BDF and an explicit or implicit convective term.
//!
//! # Example
//! First steps of the rotating hill
//! ```
//! use rustdg::convection_diffusion::{ConvDiffOperator, ConvDiffParameters, TimeIntBdfConvDiff};
//! use rustdg::convection_diffusion::rotating_hill;
//! use rustdg::fe::DgSpace;
//! use rustdg::grid::Grid;
//! use rustdg::{integrate, Integrate};
//! use std::sync::Arc;
//!
//! let mut param = ConvDiffParameters::default();
//! param.end_time = 0.01;
//! param.time_step_size = 1e-3;
//! let grid = Arc::new(Grid::hyper_cube(2, -1., 1.));
//! let space = DgSpace::new(grid, param.degree, 1);
//! let op = ConvDiffOperator::new(
//!     &space,
//!     &param,
//!     rotating_hill::boundary_descriptor(),
//!     Some(rotating_hill::velocity()),
//!     None,
//! )
//! .unwrap();
//! let mut solver = TimeIntBdfConvDiff::new(param, op, rotating_hill::solution()).unwrap();
//! integrate(&mut solver, 0.01, None).unwrap();
//! assert!((solver.get_time() - 0.01).abs() < 1e-12);
//! ```
pub mod operator;
pub mod rotating_hill;
pub mod time_integration;
pub use operator::{ConvDiffOperator, ConvDiffSystem};
pub use time_integration::TimeIntBdfConvDiff;

use crate::error::{DgError, Result};
use crate::solvers::{PreconditionerType, SolverData, SolverType};
use crate::time_integration::{TreatmentOfConvectiveTerm, MAX_ORDER};
use serde::{Deserialize, Serialize};

/// Parameters of a convection-diffusion simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvDiffParameters {
    /// Start time
    pub start_time: f64,
    /// End time
    pub end_time: f64,
    /// Polynomial degree
    pub degree: usize,
    /// Diffusivity $ \kappa $, zero disables the diffusive term
    pub diffusivity: f64,
    /// Interior penalty factor of the diffusive term
    pub ip_factor: f64,
    /// BDF order
    pub order_time_integrator: usize,
    /// Ramp up the order during the first steps
    pub start_with_low_order: bool,
    /// Time step size
    pub time_step_size: f64,
    /// Treatment of the convective term
    pub treatment_of_convective_term: TreatmentOfConvectiveTerm,
    /// Linear solver of the implicit system
    pub solver: SolverType,
    /// Tolerances of the linear solver
    pub solver_data: SolverData,
    /// Preconditioner of the implicit system
    pub preconditioner: PreconditionerType,
    /// Rebuild the preconditioner every time step
    pub update_preconditioner: bool,
}

impl Default for ConvDiffParameters {
    fn default() -> Self {
        Self {
            start_time: 0.,
            end_time: 1.,
            degree: 3,
            diffusivity: 0.,
            ip_factor: 1.,
            order_time_integrator: 2,
            start_with_low_order: true,
            time_step_size: 1e-3,
            treatment_of_convective_term: TreatmentOfConvectiveTerm::Explicit,
            solver: SolverType::GMRES,
            solver_data: SolverData::new(1000, 1e-20, 1e-8),
            preconditioner: PreconditionerType::InverseMassMatrix,
            update_preconditioner: true,
        }
    }
}

impl ConvDiffParameters {
    /// Reject inconsistent parameters
    ///
    /// # Errors
    /// Unsupported order, invalid times or a solver that does not fit
    /// the system.
    pub fn check(&self) -> Result<()> {
        if !(1..=MAX_ORDER).contains(&self.order_time_integrator) {
            return Err(DgError::Config(format!(
                "order_time_integrator = {} not supported",
                self.order_time_integrator
            )));
        }
        if self.end_time <= self.start_time {
            return Err(DgError::config("end_time must be larger than start_time"));
        }
        if self.time_step_size <= 0. {
            return Err(DgError::config("time_step_size must be positive"));
        }
        if self.diffusivity < 0. {
            return Err(DgError::config("diffusivity must be non-negative"));
        }
        if self.degree == 0 {
            return Err(DgError::config("degree must be at least one"));
        }
        if self.treatment_of_convective_term == TreatmentOfConvectiveTerm::Implicit
            && self.solver == SolverType::CG
        {
            return Err(DgError::config(
                "CG requires a symmetric system, use GMRES with an implicit convective term",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_parameters() {
        let mut param = ConvDiffParameters::default();
        assert!(param.check().is_ok());
        param.treatment_of_convective_term = TreatmentOfConvectiveTerm::Implicit;
        param.solver = SolverType::CG;
        assert!(param.check().is_err());
        param.solver = SolverType::GMRES;
        param.order_time_integrator = 0;
        assert!(param.check().is_err());
    }
}
