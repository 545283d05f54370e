//! # Partitioned fluid-structure interaction
//!
//! The coupled problem is written as a fixed point equation for the
//! interface displacement $ d = S(F(d)) $, where the fluid solve `F`
//! maps a displacement to interface stresses and the structure solve
//! `S` maps stresses back to a displacement. [`FixedPointSolver`]
//! iterates
//! $$
//! d_{i+1} = d_i + \omega_i (\tilde{d}_i - d_i)
//! $$
//! with dynamic Aitken relaxation of $ \omega_i $.
//!
//! # Example
//! ```
//! use ndarray::Array1;
//! use rustdg::fsi::{FixedPointData, FixedPointSolver, PartitionedProblem};
//! use rustdg::types::DofVector;
//!
//! /// d = 0.5 d + 1, fixed point d = 2
//! struct Contraction;
//!
//! impl PartitionedProblem for Contraction {
//!     fn apply(&mut self, d: &DofVector) -> rustdg::Result<DofVector> {
//!         Ok(d.mapv(|x| 0.5 * x + 1.))
//!     }
//! }
//!
//! let solver = FixedPointSolver::new(FixedPointData::default());
//! let mut d = Array1::zeros(3);
//! solver.solve(&mut Contraction, &mut d).unwrap();
//! assert!(d.iter().all(|x| (x - 2.).abs() < 1e-10));
//! ```
use crate::error::{DgError, Result};
use crate::types::DofVector;
use serde::{Deserialize, Serialize};

/// Parameters of the partitioned iteration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPointData {
    /// Absolute tolerance of the interface residual
    pub abs_tol: f64,
    /// Tolerance relative to the first residual
    pub rel_tol: f64,
    /// Relaxation parameter of the first iteration
    pub omega_init: f64,
    /// Iteration cap
    pub partitioned_iter_max: usize,
}

impl Default for FixedPointData {
    fn default() -> Self {
        Self {
            abs_tol: 1e-12,
            rel_tol: 1e-3,
            omega_init: 0.1,
            partitioned_iter_max: 100,
        }
    }
}

/// One sweep through all subproblems of a partitioned scheme
pub trait PartitionedProblem {
    /// Solve fluid and structure for the interface displacement `d` and
    /// return the resulting displacement
    ///
    /// # Errors
    /// A subproblem failed.
    fn apply(&mut self, d: &DofVector) -> Result<DofVector>;
}

/// Fixed point iteration with Aitken relaxation
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPointSolver {
    /// Parameters
    pub data: FixedPointData,
}

impl FixedPointSolver {
    /// New solver
    pub fn new(data: FixedPointData) -> Self {
        Self { data }
    }

    /// Converged if the residual is below the absolute tolerance or has
    /// decreased by `rel_tol` relative to the first one
    fn check_convergence(&self, residual_norm: f64, initial_norm: f64) -> bool {
        residual_norm < self.data.abs_tol || residual_norm < self.data.rel_tol * initial_norm
    }

    /// Aitken update
    /// $$
    /// \omega_i = -\omega_{i-1} \frac{r_{i-1} \cdot (r_i - r_{i-1})}{|r_i - r_{i-1}|^2}
    /// $$
    fn update_relaxation_parameter(
        &self,
        omega: f64,
        iteration: usize,
        residual: &DofVector,
        residual_last: &DofVector,
    ) -> f64 {
        if iteration == 0 {
            return self.data.omega_init;
        }
        let delta = residual - residual_last;
        let denominator = delta.dot(&delta);
        if denominator > 0. {
            -omega * residual_last.dot(&delta) / denominator
        } else {
            omega
        }
    }

    /// Iterate on the interface displacement `d` until converged.
    /// Returns the number of partitioned iterations.
    ///
    /// # Errors
    /// A subproblem failed, or no convergence within
    /// `partitioned_iter_max` iterations.
    pub fn solve<P: PartitionedProblem + ?Sized>(
        &self,
        problem: &mut P,
        d: &mut DofVector,
    ) -> Result<usize> {
        let mut omega = self.data.omega_init;
        let mut residual_last: Option<DofVector> = None;
        let mut initial_norm = 0.;
        let mut residual_norm = f64::INFINITY;
        for iteration in 0..self.data.partitioned_iter_max {
            let d_tilde = problem.apply(d)?;
            let residual = &d_tilde - &*d;
            residual_norm = residual.dot(&residual).sqrt();
            if iteration == 0 {
                initial_norm = residual_norm;
            }
            log::debug!(
                "partitioned iteration {}: residual {:.4e}, omega {:.4e}",
                iteration,
                residual_norm,
                omega
            );
            if self.check_convergence(residual_norm, initial_norm) {
                log::info!(
                    "partitioned iteration converged after {} iterations (residual {:.3e})",
                    iteration,
                    residual_norm
                );
                return Ok(iteration);
            }
            omega = match &residual_last {
                Some(last) => self.update_relaxation_parameter(omega, iteration, &residual, last),
                None => self.data.omega_init,
            };
            d.scaled_add(omega, &residual);
            residual_last = Some(residual);
        }
        log::warn!(
            "partitioned iteration not converged, residual {:.3e}",
            residual_norm
        );
        Err(DgError::NotConverged {
            solver: "fixed-point",
            max_iter: self.data.partitioned_iter_max,
            residual: residual_norm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    /// Linear map d -> A d + b with a contraction or an expansion
    struct Affine {
        scale: f64,
        shift: f64,
        calls: usize,
    }

    impl PartitionedProblem for Affine {
        fn apply(&mut self, d: &DofVector) -> Result<DofVector> {
            self.calls += 1;
            Ok(d.mapv(|x| self.scale * x + self.shift))
        }
    }

    #[test]
    fn test_aitken_accelerates_contraction() {
        let data = FixedPointData {
            rel_tol: 1e-10,
            ..FixedPointData::default()
        };
        let mut problem = Affine {
            scale: 0.9,
            shift: 1.,
            calls: 0,
        };
        let mut d = Array1::zeros(4);
        let iterations = FixedPointSolver::new(data).solve(&mut problem, &mut d).unwrap();
        for x in d.iter() {
            assert!((x - 10.).abs() < 1e-8, "got {}", x);
        }
        // a scalar affine map is solved exactly by the first secant update
        assert!(iterations <= 4, "{} iterations", iterations);
        assert_eq!(problem.calls, iterations + 1);
    }

    #[test]
    fn test_relaxation_parameter() {
        let solver = FixedPointSolver::default();
        let r_last = array![1., 0.];
        let r = array![0.5, 0.];
        assert!((solver.update_relaxation_parameter(0.3, 0, &r, &r_last) - 0.1).abs() < 1e-14);
        // -0.2 * (1 * -0.5) / 0.25 = 0.4
        assert!((solver.update_relaxation_parameter(0.2, 1, &r, &r_last) - 0.4).abs() < 1e-14);
        assert!((solver.update_relaxation_parameter(0.2, 1, &r_last, &r_last) - 0.2).abs() < 1e-14);
    }

    #[test]
    fn test_not_converged() {
        let data = FixedPointData {
            partitioned_iter_max: 3,
            rel_tol: 1e-14,
            abs_tol: 0.,
            ..FixedPointData::default()
        };
        // residual alternates sign with a non-affine map
        struct Oscillating;
        impl PartitionedProblem for Oscillating {
            fn apply(&mut self, d: &DofVector) -> Result<DofVector> {
                Ok(d.mapv(|x| (x + 1.).sin() * 3. + x.powi(3)))
            }
        }
        let mut d = array![0.2];
        let result = FixedPointSolver::new(data).solve(&mut Oscillating, &mut d);
        assert!(matches!(
            result,
            Err(DgError::NotConverged { solver: "fixed-point", max_iter: 3, .. })
        ));
    }
}
