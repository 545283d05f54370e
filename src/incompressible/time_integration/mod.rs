//! BDF time integrators of the incompressible flow schemes
//!
//! The integrators own the solution histories (index 0 at $ t_n $) and
//! call the capabilities of their spatial operator once per sub-step.
//! Histories are initialized from the analytical solution, at the former
//! time levels $ t_{n-i} $ unless the order is ramped up.
pub mod coupled;
pub mod dual_splitting;
pub mod pressure_correction;
pub use coupled::TimeIntBdfCoupled;
pub use dual_splitting::TimeIntBdfDualSplitting;
pub use pressure_correction::TimeIntBdfPressureCorrection;

use super::spatial::SpatialOperatorBase;
use crate::error::Result;
use crate::fe::DgSpace;
use crate::functions::{interpolate, FunctionPtr};
use crate::restart::Restart;
use crate::time_integration::TimeIntBdfBase;
use crate::types::DofVector;
use std::path::Path;

/// Solver iterations of the last time step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationCounts {
    /// Linear iterations of the momentum (or coupled) system
    pub momentum: usize,
    /// Newton iterations
    pub newton: usize,
    /// Pressure Poisson iterations
    pub pressure: usize,
    /// Projection iterations, zero without divergence penalty
    pub projection: usize,
    /// Viscous step iterations (dual splitting)
    pub viscous: usize,
}

/// Time of history level `i` at the start of the simulation
pub(crate) fn initial_time(base: &TimeIntBdfBase, i: usize) -> f64 {
    if base.start_with_low_order {
        base.time
    } else {
        base.get_previous_time(i)
    }
}

/// History of `order` levels interpolated from `f`
pub(crate) fn initial_history(space: &DgSpace, f: &FunctionPtr, base: &TimeIntBdfBase) -> Vec<DofVector> {
    (0..base.order)
        .map(|i| interpolate(space, f.as_ref(), initial_time(base, i)))
        .collect()
}

/// Convective terms of all levels of `velocity`, empty unless the
/// convective term is extrapolated in time
pub(crate) fn initial_convective_history(
    op: &SpatialOperatorBase,
    velocity: &[DofVector],
    base: &TimeIntBdfBase,
) -> Vec<DofVector> {
    if !op.param.explicit_convection() {
        return Vec::new();
    }
    velocity
        .iter()
        .enumerate()
        .map(|(i, u)| {
            let mut c = op.space_u.zero_vector();
            op.evaluate_convective_term(&mut c, u, initial_time(base, i));
            c
        })
        .collect()
}

/// Write a restart archive if the last step crossed a write instant
pub(crate) fn write_restart_if_due<R: Restart + ?Sized>(
    solver: &R,
    op: &SpatialOperatorBase,
    base: &TimeIntBdfBase,
) -> Result<()> {
    let data = &op.param.restart_data;
    if data.do_write(base.time, base.get_time_step_size(), base.start_time) {
        solver.write_restart(Path::new(&data.filename))?;
    }
    Ok(())
}
