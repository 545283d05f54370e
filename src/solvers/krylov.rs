//! Krylov subspace solvers
//!
//! Convergence is reached when the residual norm drops below
//! `abs_tol` or below `rel_tol` times the initial residual norm.
//! Exceeding `max_iter` is an error.
use super::{norm_l2, residual, LinearOperator, Precondition, SolverType};
use crate::error::{DgError, Result};
use crate::types::DofVector;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Tolerances and iteration caps of an iterative solver
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverData {
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Absolute residual tolerance
    pub abs_tol: f64,
    /// Residual tolerance relative to the initial residual
    pub rel_tol: f64,
    /// Krylov space dimension before restart (GMRES variants)
    pub max_krylov_size: usize,
}

impl Default for SolverData {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            abs_tol: 1e-12,
            rel_tol: 1e-6,
            max_krylov_size: 30,
        }
    }
}

impl SolverData {
    /// New tolerances with default Krylov size
    pub fn new(max_iter: usize, abs_tol: f64, rel_tol: f64) -> Self {
        Self {
            max_iter,
            abs_tol,
            rel_tol,
            ..Self::default()
        }
    }

    fn converged(&self, res: f64, res0: f64) -> bool {
        res < self.abs_tol || res < self.rel_tol * res0
    }
}

/// Solve $ A x = b $, returns the number of iterations
#[enum_dispatch]
pub trait Solve {
    /// Solve with `x` as initial guess, `x` is overwritten by the solution
    ///
    /// # Errors
    /// Iteration cap exceeded.
    fn solve(
        &self,
        op: &dyn LinearOperator,
        prec: &dyn Precondition,
        x: &mut DofVector,
        b: &DofVector,
    ) -> Result<usize>;
}

/// Collection of Krylov solvers
#[enum_dispatch(Solve)]
#[derive(Debug, Clone)]
pub enum LinearSolver {
    /// Preconditioned conjugate gradients
    Cg(Cg),
    /// Right preconditioned restarted GMRES
    Gmres(Gmres),
    /// Flexible GMRES
    Fgmres(Fgmres),
}

impl LinearSolver {
    /// Solver of type `solver_type` with tolerances `data`
    pub fn new(solver_type: SolverType, data: SolverData) -> Self {
        match solver_type {
            SolverType::CG => Self::Cg(Cg { data }),
            SolverType::GMRES => Self::Gmres(Gmres { data }),
            SolverType::FGMRES => Self::Fgmres(Fgmres { data }),
        }
    }
}

/// Preconditioned conjugate gradient method
#[derive(Debug, Clone)]
pub struct Cg {
    /// Tolerances
    pub data: SolverData,
}

impl Solve for Cg {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        prec: &dyn Precondition,
        x: &mut DofVector,
        b: &DofVector,
    ) -> Result<usize> {
        let mut r = residual(op, x, b);
        let res0 = norm_l2(&r);
        if res0 < self.data.abs_tol {
            return Ok(0);
        }
        let mut z = DofVector::zeros(b.len());
        let mut q = DofVector::zeros(b.len());
        prec.vmult(&mut z, &r);
        let mut p = z.clone();
        let mut rz = r.dot(&z);
        let mut res = res0;
        for it in 1..=self.data.max_iter {
            op.vmult(&mut q, &p);
            let alpha = rz / p.dot(&q);
            x.scaled_add(alpha, &p);
            r.scaled_add(-alpha, &q);
            res = norm_l2(&r);
            log::trace!("CG iteration {:>4}: residual {:.4e}", it, res);
            if self.data.converged(res, res0) {
                return Ok(it);
            }
            prec.vmult(&mut z, &r);
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            p *= beta;
            p += &z;
        }
        Err(DgError::NotConverged {
            solver: "CG",
            max_iter: self.data.max_iter,
            residual: res,
        })
    }
}

/// Restarted GMRES, right preconditioned
#[derive(Debug, Clone)]
pub struct Gmres {
    /// Tolerances
    pub data: SolverData,
}

impl Solve for Gmres {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        prec: &dyn Precondition,
        x: &mut DofVector,
        b: &DofVector,
    ) -> Result<usize> {
        gmres(op, prec, x, b, &self.data, false, "GMRES")
    }
}

/// Flexible GMRES, stores the preconditioned basis
#[derive(Debug, Clone)]
pub struct Fgmres {
    /// Tolerances
    pub data: SolverData,
}

impl Solve for Fgmres {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        prec: &dyn Precondition,
        x: &mut DofVector,
        b: &DofVector,
    ) -> Result<usize> {
        gmres(op, prec, x, b, &self.data, true, "FGMRES")
    }
}

/// Givens rotation $ (c, s) $ eliminating `b` in $ (a, b) $
fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0. {
        (1., 0.)
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = 1. / (1. + t * t).sqrt();
        (s * t, s)
    } else {
        let t = b / a;
        let c = 1. / (1. + t * t).sqrt();
        (c, c * t)
    }
}

/// Shared implementation of GMRES and FGMRES
#[allow(clippy::too_many_arguments, clippy::many_single_char_names)]
fn gmres(
    op: &dyn LinearOperator,
    prec: &dyn Precondition,
    x: &mut DofVector,
    b: &DofVector,
    data: &SolverData,
    flexible: bool,
    name: &'static str,
) -> Result<usize> {
    let m = data.max_krylov_size.max(1);
    let mut r = residual(op, x, b);
    let mut beta = norm_l2(&r);
    let res0 = beta;
    if res0 < data.abs_tol {
        return Ok(0);
    }
    let mut total = 0;
    loop {
        let mut v: Vec<DofVector> = Vec::with_capacity(m + 1);
        let mut z: Vec<DofVector> = Vec::new();
        let mut h = Array2::<f64>::zeros((m + 1, m));
        let mut cs = vec![0.; m];
        let mut sn = vec![0.; m];
        let mut g = vec![0.; m + 1];
        g[0] = beta;
        v.push(&r / beta);

        let mut k = 0;
        let mut converged = false;
        let mut res = beta;
        for j in 0..m {
            let mut zj = DofVector::zeros(b.len());
            prec.vmult(&mut zj, &v[j]);
            let mut w = DofVector::zeros(b.len());
            op.vmult(&mut w, &zj);
            if flexible {
                z.push(zj);
            }
            // modified Gram-Schmidt
            for (i, vi) in v.iter().enumerate() {
                h[[i, j]] = w.dot(vi);
                w.scaled_add(-h[[i, j]], vi);
            }
            h[[j + 1, j]] = norm_l2(&w);
            for i in 0..j {
                let tmp = cs[i] * h[[i, j]] + sn[i] * h[[i + 1, j]];
                h[[i + 1, j]] = -sn[i] * h[[i, j]] + cs[i] * h[[i + 1, j]];
                h[[i, j]] = tmp;
            }
            let (c, s) = givens(h[[j, j]], h[[j + 1, j]]);
            cs[j] = c;
            sn[j] = s;
            let hjj1 = h[[j + 1, j]];
            h[[j, j]] = c * h[[j, j]] + s * hjj1;
            h[[j + 1, j]] = 0.;
            g[j + 1] = -s * g[j];
            g[j] *= c;

            total += 1;
            k = j + 1;
            res = g[j + 1].abs();
            log::trace!("{} iteration {:>4}: residual {:.4e}", name, total, res);
            converged = data.converged(res, res0);
            let breakdown = hjj1 <= f64::MIN_POSITIVE;
            if converged || breakdown || total >= data.max_iter {
                converged |= breakdown;
                break;
            }
            w /= hjj1;
            v.push(w);
        }

        // back substitution
        let mut y = vec![0.; k];
        for i in (0..k).rev() {
            let mut sum = g[i];
            for l in i + 1..k {
                sum -= h[[i, l]] * y[l];
            }
            y[i] = sum / h[[i, i]];
        }
        if flexible {
            for (yi, zi) in y.iter().zip(&z) {
                x.scaled_add(*yi, zi);
            }
        } else {
            let mut t = DofVector::zeros(b.len());
            for (yi, vi) in y.iter().zip(&v) {
                t.scaled_add(*yi, vi);
            }
            let mut pt = DofVector::zeros(b.len());
            prec.vmult(&mut pt, &t);
            *x += &pt;
        }

        if converged {
            return Ok(total);
        }
        if total >= data.max_iter {
            return Err(DgError::NotConverged {
                solver: name,
                max_iter: data.max_iter,
                residual: res,
            });
        }
        r = residual(op, x, b);
        beta = norm_l2(&r);
        if data.converged(beta, res0) {
            return Ok(total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::{IdentityPreconditioner, PointJacobi};
    use ndarray::Array2;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    /// Dense test matrix
    struct Dense(Array2<f64>);

    impl LinearOperator for Dense {
        fn size(&self) -> usize {
            self.0.nrows()
        }

        fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
            dst.assign(&self.0.dot(src));
        }
    }

    fn spd(n: usize) -> Array2<f64> {
        let a = Array2::random((n, n), Uniform::new(-1., 1.));
        a.t().dot(&a) + Array2::<f64>::eye(n) * n as f64
    }

    fn check_solution(op: &Dense, x: &DofVector, b: &DofVector) {
        let r = residual(op, x, b);
        assert!(norm_l2(&r) < 1e-8 * norm_l2(b), "residual too large {}", norm_l2(&r));
    }

    #[test]
    fn test_cg_spd() {
        let op = Dense(spd(40));
        let b = DofVector::random(40, Uniform::new(0., 1.));
        let mut x = DofVector::zeros(40);
        let prec = PointJacobi::new(&op.0.diag().to_owned()).unwrap();
        let solver = LinearSolver::new(SolverType::CG, SolverData::new(200, 1e-14, 1e-12));
        let iter = solver.solve(&op, &prec, &mut x, &b).unwrap();
        assert!(iter > 0 && iter <= 40 + 5);
        check_solution(&op, &x, &b);
    }

    #[test]
    fn test_gmres_nonsymmetric_with_restart() {
        let mut a = spd(50);
        for i in 0..49 {
            a[[i, i + 1]] += 3.;
        }
        let op = Dense(a);
        let b = DofVector::random(50, Uniform::new(-1., 1.));
        for solver_type in [SolverType::GMRES, SolverType::FGMRES] {
            let mut data = SolverData::new(500, 1e-14, 1e-12);
            data.max_krylov_size = 10;
            let solver = LinearSolver::new(solver_type, data);
            let mut x = DofVector::zeros(50);
            solver
                .solve(&op, &IdentityPreconditioner, &mut x, &b)
                .unwrap();
            check_solution(&op, &x, &b);
        }
    }

    #[test]
    fn test_iteration_cap_is_error() {
        let op = Dense(spd(30));
        let b = DofVector::random(30, Uniform::new(0., 1.));
        let mut x = DofVector::zeros(30);
        let solver = LinearSolver::new(SolverType::CG, SolverData::new(2, 1e-14, 1e-14));
        let err = solver
            .solve(&op, &IdentityPreconditioner, &mut x, &b)
            .unwrap_err();
        assert!(matches!(err, DgError::NotConverged { solver: "CG", .. }));
    }
}
