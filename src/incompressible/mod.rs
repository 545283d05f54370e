//! # Incompressible Navier-Stokes equations
//!
//! $$
//! \frac{\partial u}{\partial t} + \nabla \cdot (u \otimes u)
//! - \nu \Delta u + \nabla p = f,
//! \quad \nabla \cdot u = 0
//! $$
//!
//! Velocity of degree $ k $ and pressure of degree $ k-1 $, integrated in
//! time with BDF of order 1 to 4 and one of three solution strategies,
//! see [`TemporalDiscretization`]:
//!
//! - dual splitting, [`time_integration::TimeIntBdfDualSplitting`]
//! - pressure correction, [`time_integration::TimeIntBdfPressureCorrection`]
//! - coupled, [`time_integration::TimeIntBdfCoupled`]
//!
//! All three implement [`IncompressibleSolver`] and are created from a
//! [`FlowProblem`] by [`create_time_integrator`].
pub mod boundary;
pub mod parameters;
pub mod postprocessor;
pub mod spatial;
pub mod taylor_green;
pub mod time_integration;
pub use boundary::FlowBoundaryDescriptor;
pub use parameters::{EquationType, InputParameters, TemporalDiscretization};
pub use postprocessor::{FlowDiagnostics, LoggingPostProcessor, PostProcessor};

use crate::error::Result;
use crate::functions::FunctionPtr;
use crate::grid::Grid;
use crate::restart::Restart;
use crate::time_integration::TimeIntBdfBase;
use crate::types::DofVector;
use crate::Integrate;
use spatial::{
    CoupledOperator, DualSplittingOperator, PressureCorrectionOperator, SpatialOperatorBase,
};
use std::sync::Arc;
use time_integration::{TimeIntBdfCoupled, TimeIntBdfDualSplitting, TimeIntBdfPressureCorrection};

/// Common interface of the incompressible time integrators
pub trait IncompressibleSolver: Integrate + Restart {
    /// Velocity at the current time
    fn get_velocity(&self) -> &DofVector;

    /// Pressure at the current time
    fn get_pressure(&self) -> &DofVector;

    /// Time, step sizes and BDF constants
    fn time_integrator(&self) -> &TimeIntBdfBase;

    /// Spatial operators
    fn spatial(&self) -> &SpatialOperatorBase;

    /// Replace the post-processor called after every step
    fn set_postprocessor(&mut self, postprocessor: Box<dyn PostProcessor>);
}

/// Geometry, boundary data and reference solution of a flow problem
#[derive(Clone)]
pub struct FlowProblem {
    /// Grid
    pub grid: Arc<Grid>,
    /// Boundary conditions
    pub bc: FlowBoundaryDescriptor,
    /// Analytical velocity, also the initial condition
    pub analytical_velocity: FunctionPtr,
    /// Analytical pressure, also the initial condition
    pub analytical_pressure: FunctionPtr,
    /// Body force, `None` without external forcing
    pub body_force: Option<FunctionPtr>,
}

/// Spatial operators and time integrator selected by
/// `param.temporal_discretization`
///
/// # Errors
/// Invalid parameters or boundary conditions.
pub fn create_time_integrator(
    param: &InputParameters,
    problem: FlowProblem,
) -> Result<Box<dyn IncompressibleSolver>> {
    let base = SpatialOperatorBase::new(problem.grid, param, problem.bc, problem.body_force)?;
    let velocity = problem.analytical_velocity;
    let pressure = problem.analytical_pressure;
    let solver: Box<dyn IncompressibleSolver> = match param.temporal_discretization {
        TemporalDiscretization::BdfDualSplitting => Box::new(TimeIntBdfDualSplitting::new(
            DualSplittingOperator::new(base),
            velocity,
            pressure,
        )?),
        TemporalDiscretization::BdfPressureCorrection => Box::new(TimeIntBdfPressureCorrection::new(
            PressureCorrectionOperator::new(base),
            velocity,
            pressure,
        )?),
        TemporalDiscretization::BdfCoupled => Box::new(TimeIntBdfCoupled::new(
            CoupledOperator::new(base),
            velocity,
            pressure,
        )?),
    };
    Ok(solver)
}
