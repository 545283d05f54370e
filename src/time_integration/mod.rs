//! # BDF time integration
//!
//! Shared state of all multistep integrators: time, time step history,
//! active order and coefficients. History vectors are stored per time
//! level with index 0 being $ t_n $, the last completed step.
pub mod bdf_constants;
pub use bdf_constants::{BdfConstants, ExtrapolationConstants, MAX_ORDER};

use crate::error::{DgError, Result};
use crate::types::DofVector;
use serde::{Deserialize, Serialize};

/// Treatment of the convective term in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreatmentOfConvectiveTerm {
    /// Extrapolated from previous time levels
    Explicit,
    /// Part of the implicit system of the new time level
    Implicit,
}

/// Time, step counter and coefficients of a BDF integrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIntBdfBase {
    /// Target order
    pub order: usize,
    /// Start with order one and increase the order by one per step
    pub start_with_low_order: bool,
    /// Start time
    pub start_time: f64,
    /// End time
    pub end_time: f64,
    /// Time $ t_n $ of the last completed step
    pub time: f64,
    /// Time step sizes, `[0]` is the step currently solved
    pub time_steps: Vec<f64>,
    /// Number of the step currently solved, starting at 1
    pub time_step_number: usize,
    /// BDF constants of the current step
    pub bdf: BdfConstants,
    /// Extrapolation constants of the current step
    pub extra: ExtrapolationConstants,
}

impl TimeIntBdfBase {
    /// Integrator state at `start_time`
    ///
    /// # Errors
    /// Unsupported order or a non-positive time step.
    pub fn new(
        order: usize,
        start_with_low_order: bool,
        start_time: f64,
        end_time: f64,
        dt: f64,
    ) -> Result<Self> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(DgError::Config(format!(
                "order of the time integrator must be in 1..={}, got {}",
                MAX_ORDER, order
            )));
        }
        if dt <= 0. {
            return Err(DgError::config("time step size must be positive"));
        }
        if end_time <= start_time {
            return Err(DgError::config("end time must be larger than start time"));
        }
        let time_steps = vec![dt; order];
        let mut base = Self {
            order,
            start_with_low_order,
            start_time,
            end_time,
            time: start_time,
            bdf: BdfConstants::new(order, &time_steps),
            extra: ExtrapolationConstants::new(order, &time_steps),
            time_steps,
            time_step_number: 1,
        };
        base.update_time_integrator_constants();
        Ok(base)
    }

    /// Order used in the current step
    pub fn current_order(&self) -> usize {
        if self.start_with_low_order {
            self.order.min(self.time_step_number)
        } else {
            self.order
        }
    }

    /// Recompute BDF and extrapolation constants for the current order
    /// and time step history
    pub fn update_time_integrator_constants(&mut self) {
        let order = self.current_order();
        self.bdf.update(order, &self.time_steps);
        self.extra.update(order, &self.time_steps);
    }

    /// Current time step size
    pub fn get_time_step_size(&self) -> f64 {
        self.time_steps[0]
    }

    /// Change the size of the step currently solved
    pub fn set_time_step_size(&mut self, dt: f64) {
        self.time_steps[0] = dt;
        self.update_time_integrator_constants();
    }

    /// Time $ t_{n+1} $ of the step currently solved
    pub fn get_next_time(&self) -> f64 {
        self.time + self.time_steps[0]
    }

    /// Time $ t_{n-i} $ of history level `i`
    pub fn get_previous_time(&self, i: usize) -> f64 {
        self.time - self.time_steps[1..=i].iter().sum::<f64>()
    }

    /// End time reached (up to a small fraction of the time step)
    pub fn finished(&self) -> bool {
        self.time + 1e-4 * self.time_steps[0] >= self.end_time
    }

    /// Advance time and step counter after a completed step and
    /// prepare the constants of the next one
    pub fn do_timestep_post(&mut self) {
        self.time += self.time_steps[0];
        self.time_step_number += 1;
        let dt = self.time_steps[0];
        self.time_steps.rotate_right(1);
        self.time_steps[0] = dt;
        self.update_time_integrator_constants();
    }
}

/// Rotate a history by one level and store `new` at level 0
pub fn push_back(history: &mut [DofVector], new: &DofVector) {
    history.rotate_right(1);
    history[0].assign(new);
}

/// $ \sum_i c_i v_i $ over the first `coefficients.len()` levels
pub fn weighted_sum(dst: &mut DofVector, coefficients: &[f64], history: &[DofVector]) {
    dst.fill(0.);
    for (c, v) in coefficients.iter().zip(history) {
        dst.scaled_add(*c, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_order_start() {
        let mut base = TimeIntBdfBase::new(3, true, 0., 1., 0.1).unwrap();
        assert_eq!(base.current_order(), 1);
        assert_eq!(base.bdf.alpha.len(), 1);
        base.do_timestep_post();
        assert_eq!(base.current_order(), 2);
        base.do_timestep_post();
        base.do_timestep_post();
        assert_eq!(base.current_order(), 3);
        assert!((base.time - 0.3).abs() < 1e-14);
        assert!((base.get_previous_time(2) - 0.1).abs() < 1e-14);
        assert!((base.get_next_time() - 0.4).abs() < 1e-14);

        let base = TimeIntBdfBase::new(3, false, 0., 1., 0.1).unwrap();
        assert_eq!(base.current_order(), 3);
        assert!(TimeIntBdfBase::new(5, false, 0., 1., 0.1).is_err());
    }

    #[test]
    fn test_push_back() {
        let mut history = vec![DofVector::from(vec![1.]), DofVector::from(vec![2.])];
        push_back(&mut history, &DofVector::from(vec![0.]));
        assert_eq!(history[0][0], 0.);
        assert_eq!(history[1][0], 1.);
    }
}
