//! Newton solver for nonlinear systems $ R(u) = 0 $
//!
//! Each iteration solves the linearized system
//! $ J(u_k) \delta u = R(u_k) $ and updates $ u_{k+1} = u_k - \delta u $.
use crate::error::{DgError, Result};
use crate::types::DofVector;
use serde::{Deserialize, Serialize};

/// Tolerances of the Newton solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewtonSolverData {
    /// Maximum number of Newton iterations
    pub max_iter: usize,
    /// Absolute tolerance on the residual norm
    pub abs_tol: f64,
    /// Tolerance relative to the initial residual norm
    pub rel_tol: f64,
}

impl Default for NewtonSolverData {
    fn default() -> Self {
        Self {
            max_iter: 100,
            abs_tol: 1e-12,
            rel_tol: 1e-6,
        }
    }
}

/// Nonlinear problem solved by [`NewtonSolver`]
pub trait NonlinearResidualProvider {
    /// $ dst = R(u) $
    ///
    /// # Errors
    /// Missing setup of the residual data.
    fn evaluate_residual(&mut self, dst: &mut DofVector, u: &DofVector) -> Result<()>;

    /// Solve $ J(u) \, du = residual $, returns the linear iterations.
    /// The preconditioner is rebuilt only if `update_preconditioner` is set.
    ///
    /// # Errors
    /// Linear solver failed.
    fn solve_linearized(
        &mut self,
        du: &mut DofVector,
        residual: &DofVector,
        u: &DofVector,
        update_preconditioner: bool,
    ) -> Result<usize>;
}

/// Newton solver
#[derive(Debug, Clone)]
pub struct NewtonSolver {
    /// Tolerances
    pub data: NewtonSolverData,
    /// Rebuild the preconditioner of the linearized problem
    pub update_preconditioner: bool,
    /// Rebuild only every n-th Newton iteration
    pub update_preconditioner_every_newton_iter: usize,
}

impl NewtonSolver {
    /// Newton solver with fixed preconditioner
    pub fn new(data: NewtonSolverData) -> Self {
        Self {
            data,
            update_preconditioner: false,
            update_preconditioner_every_newton_iter: 1,
        }
    }

    /// Solve $ R(u) = 0 $ with initial guess `u`.
    ///
    /// Returns `(newton_iterations, linear_iterations)`.
    ///
    /// # Errors
    /// Iteration cap exceeded, the linear solver failed or the residual
    /// is not finite.
    pub fn solve<P: NonlinearResidualProvider + ?Sized>(
        &self,
        problem: &mut P,
        u: &mut DofVector,
    ) -> Result<(usize, usize)> {
        let mut residual = DofVector::zeros(u.len());
        let mut du = DofVector::zeros(u.len());
        problem.evaluate_residual(&mut residual, u)?;
        let norm_r0 = residual_norm(&residual, 0)?;
        let mut norm_r = norm_r0;
        let mut newton_iter = 0;
        let mut linear_iter = 0;
        let every = self.update_preconditioner_every_newton_iter.max(1);

        while norm_r > self.data.abs_tol && norm_r > self.data.rel_tol * norm_r0 {
            if newton_iter >= self.data.max_iter {
                return Err(DgError::NotConverged {
                    solver: "Newton",
                    max_iter: self.data.max_iter,
                    residual: norm_r,
                });
            }
            let update = self.update_preconditioner && newton_iter % every == 0;
            du.fill(0.);
            linear_iter += problem.solve_linearized(&mut du, &residual, u, update)?;
            *u -= &du;
            problem.evaluate_residual(&mut residual, u)?;
            newton_iter += 1;
            norm_r = residual_norm(&residual, newton_iter)?;
            log::debug!(
                "Newton iteration {:>3}: residual {:.4e}, |du| {:.4e}",
                newton_iter,
                norm_r,
                du.dot(&du).sqrt()
            );
        }
        Ok((newton_iter, linear_iter))
    }
}

/// Euclidean norm, non-finite values are a numerical failure
fn residual_norm(residual: &DofVector, iteration: usize) -> Result<f64> {
    let norm = residual.dot(residual).sqrt();
    if norm.is_finite() {
        Ok(norm)
    } else {
        Err(DgError::numerical(format!(
            "Newton residual is {} in iteration {}",
            norm, iteration
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// R(u) = u_i^3 + u_i - b_i, diagonal Jacobian
    struct Cubic {
        b: DofVector,
        updates: usize,
    }

    impl NonlinearResidualProvider for Cubic {
        fn evaluate_residual(&mut self, dst: &mut DofVector, u: &DofVector) -> Result<()> {
            dst.assign(&(u.mapv(|x| x * x * x + x) - &self.b));
            Ok(())
        }

        fn solve_linearized(
            &mut self,
            du: &mut DofVector,
            residual: &DofVector,
            u: &DofVector,
            update_preconditioner: bool,
        ) -> Result<usize> {
            if update_preconditioner {
                self.updates += 1;
            }
            du.assign(&(residual / &u.mapv(|x| 3. * x * x + 1.)));
            Ok(1)
        }
    }

    #[test]
    fn test_newton_cubic() {
        let mut problem = Cubic {
            b: DofVector::from(vec![2., 10., -30.]),
            updates: 0,
        };
        let mut u = DofVector::zeros(3);
        let mut newton = NewtonSolver::new(NewtonSolverData {
            max_iter: 50,
            abs_tol: 1e-12,
            rel_tol: 1e-14,
        });
        newton.update_preconditioner = true;
        newton.update_preconditioner_every_newton_iter = 2;
        let (iter, linear) = newton.solve(&mut problem, &mut u).unwrap();
        assert_eq!(iter, linear);
        assert_eq!(problem.updates, (iter + 1) / 2);
        assert!((u[0] - 1.).abs() < 1e-10);
        assert!((u[1] - 2.).abs() < 1e-10);
        assert!((u[2] + 3.).abs() < 1e-10);
    }

    #[test]
    fn test_newton_iteration_cap() {
        let mut problem = Cubic {
            b: DofVector::from(vec![1e3]),
            updates: 0,
        };
        let mut u = DofVector::zeros(1);
        let newton = NewtonSolver::new(NewtonSolverData {
            max_iter: 2,
            abs_tol: 1e-12,
            rel_tol: 1e-12,
        });
        assert!(newton.solve(&mut problem, &mut u).is_err());
    }

    /// Residual turns NaN once the iterate leaves zero
    struct Diverging;

    impl NonlinearResidualProvider for Diverging {
        fn evaluate_residual(&mut self, dst: &mut DofVector, u: &DofVector) -> Result<()> {
            if u.iter().all(|x| *x == 0.) {
                dst.fill(1.);
            } else {
                dst.fill(f64::NAN);
            }
            Ok(())
        }

        fn solve_linearized(
            &mut self,
            du: &mut DofVector,
            residual: &DofVector,
            _u: &DofVector,
            _update_preconditioner: bool,
        ) -> Result<usize> {
            du.assign(residual);
            Ok(1)
        }
    }

    #[test]
    fn test_newton_nan_residual_is_an_error() {
        let newton = NewtonSolver::new(NewtonSolverData {
            max_iter: 5,
            ..NewtonSolverData::default()
        });
        let mut u = DofVector::zeros(2);
        let result = newton.solve(&mut Diverging, &mut u);
        assert!(matches!(result, Err(DgError::Numerical(_))));

        let mut u = DofVector::from(vec![1., 1.]);
        let result = newton.solve(&mut Diverging, &mut u);
        assert!(matches!(result, Err(DgError::Numerical(_))));
    }
}
