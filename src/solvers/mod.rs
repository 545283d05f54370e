//! # Collection of iterative solvers
//!
//! Krylov solvers (CG, GMRES, FGMRES) and preconditioners work on
//! anything that implements [`LinearOperator`]. The enums
//! [`LinearSolver`] and [`Preconditioner`] dispatch statically over
//! the implemented variants.
#![allow(clippy::module_name_repetitions)]
pub mod krylov;
pub mod newton;
pub mod preconditioner;
pub use krylov::{Cg, Fgmres, Gmres, LinearSolver, Solve, SolverData};
pub use newton::{NewtonSolver, NewtonSolverData, NonlinearResidualProvider};
pub use preconditioner::{
    BlockJacobi, IdentityPreconditioner, InverseMassPreconditioner, PointJacobi, Precondition,
    Preconditioner, PreconditionerSnapshot,
};

use crate::operators::{apply, CellKernel};
use crate::types::DofVector;
use serde::{Deserialize, Serialize};

/// Matrix-free linear operator $ y = A x $
pub trait LinearOperator: Sync {
    /// Number of rows (equal to the number of columns)
    fn size(&self) -> usize;

    /// $ dst = A \, src $
    fn vmult(&self, dst: &mut DofVector, src: &DofVector);
}

impl<K: CellKernel> LinearOperator for K {
    fn size(&self) -> usize {
        self.row_space().n_dofs()
    }

    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        apply(self, src, dst);
    }
}

/// Available Krylov solvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverType {
    /// Conjugate gradients, symmetric positive (semi-)definite operators
    CG,
    /// Restarted GMRES with right preconditioning
    GMRES,
    /// Flexible GMRES, the preconditioner may change between iterations
    FGMRES,
}

/// Available preconditioners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerType {
    /// No preconditioning
    None,
    /// Inverse diagonal
    PointJacobi,
    /// Inverse of the cell blocks
    BlockJacobi,
    /// Inverse mass matrix
    InverseMassMatrix,
}

/// Euclidean norm
pub fn norm_l2(v: &DofVector) -> f64 {
    v.dot(v).sqrt()
}

/// Residual $ b - A x $
pub fn residual(op: &dyn LinearOperator, x: &DofVector, b: &DofVector) -> DofVector {
    let mut r = DofVector::zeros(b.len());
    op.vmult(&mut r, x);
    r *= -1.;
    r += b;
    r
}

/// Remove the constant vector from `v` in the Euclidean sense, such that
/// a right hand side lies in the range of a singular symmetric operator
/// whose kernel is spanned by the constants
pub fn project_out_constant(v: &mut DofVector) {
    let mean = v.sum() / v.len() as f64;
    v.mapv_inplace(|x| x - mean);
}
