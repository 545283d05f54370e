//! # Matrix-free cell operators
//!
//! Every operator evaluates the rows of one cell at a time
//! ([`CellKernel::cell_apply`]), reading the source vector of the cell
//! itself and of its face neighbors. Global operator actions, diagonals
//! and cell block diagonals are all derived from this kernel.
//!
//! Face integrals are computed twice, once from each side of an
//! interior face, such that cells can be processed independently.
pub mod body_force;
pub mod convective;
pub mod divergence_penalty;
pub mod gradient;
pub mod laplace;
pub mod mass;
pub mod transport;
pub use body_force::BodyForceOperator;
pub use convective::{ConvectiveOperator, LinearizedConvective};
pub use divergence_penalty::DivergencePenaltyOperator;
pub use gradient::{DivergenceOperator, GradientOperator};
pub use laplace::{LaplaceOperator, VariableCoefficients};
pub use mass::{apply_inverse_mass, MassOperator};
pub use transport::{TransportAt, TransportOperator};

use crate::error::{DgError, Result};
use crate::fe::DgSpace;
use crate::functions::FunctionPtr;
use crate::grid::{BoundaryId, Grid};
use crate::types::{DofVector, Point};
use nalgebra::DMatrix;
use ndarray::Array1;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Kind of boundary condition on one boundary id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryType {
    /// Prescribed value
    Dirichlet,
    /// Prescribed flux
    Neumann,
}

/// Boundary data per boundary id
#[derive(Clone, Default)]
pub struct BoundaryDescriptor {
    /// Dirichlet data $ g(x, t) $
    pub dirichlet: BTreeMap<BoundaryId, FunctionPtr>,
    /// Neumann data $ h(x, t) $
    pub neumann: BTreeMap<BoundaryId, FunctionPtr>,
}

impl BoundaryDescriptor {
    /// Empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add Dirichlet data on `id`
    pub fn with_dirichlet(mut self, id: BoundaryId, f: FunctionPtr) -> Self {
        self.dirichlet.insert(id, f);
        self
    }

    /// Add Neumann data on `id`
    pub fn with_neumann(mut self, id: BoundaryId, f: FunctionPtr) -> Self {
        self.neumann.insert(id, f);
        self
    }

    /// Boundary type and data on `id`
    pub fn get(&self, id: BoundaryId) -> Option<(BoundaryType, &FunctionPtr)> {
        if let Some(f) = self.dirichlet.get(&id) {
            Some((BoundaryType::Dirichlet, f))
        } else {
            self.neumann.get(&id).map(|f| (BoundaryType::Neumann, f))
        }
    }

    /// True if `id` carries Dirichlet data
    pub fn is_dirichlet(&self, id: BoundaryId) -> bool {
        self.dirichlet.contains_key(&id)
    }

    /// True if there is no Dirichlet boundary
    pub fn is_pure_neumann(&self) -> bool {
        self.dirichlet.is_empty()
    }

    /// Every boundary id of `grid` must be assigned exactly once and
    /// carry data with `n_components` components.
    ///
    /// # Errors
    /// Missing, doubly assigned or ill-shaped boundary data.
    pub fn verify(&self, grid: &Grid, n_components: usize, name: &str) -> Result<()> {
        for id in grid.boundary_ids_used() {
            match (self.dirichlet.get(&id), self.neumann.get(&id)) {
                (Some(_), Some(_)) => {
                    return Err(DgError::Config(format!(
                        "{}: boundary id {} is both Dirichlet and Neumann",
                        name, id
                    )))
                }
                (None, None) => {
                    return Err(DgError::Config(format!(
                        "{}: no boundary condition for boundary id {}",
                        name, id
                    )))
                }
                (Some(f), None) | (None, Some(f)) => {
                    if f.n_components() != n_components {
                        return Err(DgError::Config(format!(
                            "{}: boundary function on id {} has {} components, expected {}",
                            name,
                            id,
                            f.n_components(),
                            n_components
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Quadrature point on a boundary face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacePoint {
    /// Cell owning the face
    pub cell: usize,
    /// Face number within the cell
    pub face: usize,
    /// Quadrature point index on the face
    pub q: usize,
    /// Boundary id of the face
    pub boundary_id: BoundaryId,
    /// Physical position
    pub point: Point,
}

/// Inhomogeneous boundary contributions of an affine operator.
///
/// The full operator reads $ A(u) = A_0 u - rhs(t) $ with $ A_0 $ the
/// homogeneous part evaluated by [`CellKernel`].
pub trait RhsAssembler {
    /// $ dst \mathrel{+}= rhs(t) $
    fn rhs_add(&self, dst: &mut DofVector, time: f64);
}

/// Operator defined by its rows on one cell
pub trait CellKernel: Sync {
    /// Space of the rows (destination)
    fn row_space(&self) -> &DgSpace;

    /// Space of the columns (source)
    fn column_space(&self) -> &DgSpace {
        self.row_space()
    }

    /// Rows of `cell` of the operator applied to `src`.
    /// `dst` is the cell chunk of the destination and is overwritten.
    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]);
}

/// Contiguous view of a dof vector
#[inline]
pub(crate) fn as_slice(v: &DofVector) -> &[f64] {
    v.as_slice().expect("dof vectors are contiguous")
}

/// Contiguous mutable view of a dof vector
#[inline]
pub(crate) fn as_slice_mut(v: &mut DofVector) -> &mut [f64] {
    v.as_slice_mut().expect("dof vectors are contiguous")
}

/// Chunk of component `comp` of `cell`
#[inline]
pub(crate) fn component<'a>(space: &DgSpace, v: &'a [f64], cell: usize, comp: usize) -> &'a [f64] {
    let start = space.dof(cell, comp, 0);
    &v[start..start + space.n_cell_nodes()]
}

/// Run `kernel(cell, chunk)` on all cells in parallel
pub fn cell_loop<F>(space: &DgSpace, dst: &mut DofVector, kernel: F)
where
    F: Fn(usize, &mut [f64]) + Send + Sync,
{
    let chunk = space.dofs_per_cell();
    as_slice_mut(dst)
        .par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(cell, out)| kernel(cell, out));
}

/// $ dst = A \, src $
pub fn apply<K: CellKernel + ?Sized>(kernel: &K, src: &DofVector, dst: &mut DofVector) {
    cell_loop(kernel.row_space(), dst, |cell, out| {
        kernel.cell_apply(cell, src, out)
    });
}

/// $ dst \mathrel{+}= A \, src $
pub fn apply_add<K: CellKernel + ?Sized>(kernel: &K, src: &DofVector, dst: &mut DofVector) {
    let mut tmp = kernel.row_space().zero_vector();
    apply(kernel, src, &mut tmp);
    *dst += &tmp;
}

/// Diagonal of a square operator
pub fn diagonal<K: CellKernel + ?Sized>(kernel: &K) -> DofVector {
    let space = kernel.row_space();
    let n_local = space.dofs_per_cell();
    let mut diag = space.zero_vector();
    as_slice_mut(&mut diag)
        .par_chunks_mut(n_local)
        .enumerate()
        .for_each_init(
            || (space.zero_vector(), vec![0.; n_local]),
            |(unit, column), (cell, out)| {
                let offset = cell * n_local;
                for (k, d) in out.iter_mut().enumerate() {
                    unit[offset + k] = 1.;
                    kernel.cell_apply(cell, unit, column);
                    unit[offset + k] = 0.;
                    *d = column[k];
                }
            },
        );
    diag
}

/// Diagonal blocks of a square operator, one dense matrix per cell
pub fn block_diagonal<K: CellKernel + ?Sized>(kernel: &K) -> Vec<DMatrix<f64>> {
    let space = kernel.row_space();
    let n_local = space.dofs_per_cell();
    (0..space.grid.n_active_cells())
        .into_par_iter()
        .map_init(
            || (space.zero_vector(), vec![0.; n_local]),
            |(unit, column), cell| {
                let offset = cell * n_local;
                let mut block = DMatrix::zeros(n_local, n_local);
                for k in 0..n_local {
                    unit[offset + k] = 1.;
                    kernel.cell_apply(cell, unit, column);
                    unit[offset + k] = 0.;
                    for (i, c) in column.iter().enumerate() {
                        block[(i, k)] = *c;
                    }
                }
                block
            },
        )
        .collect()
}

/// Dense matrix of a (small) operator, column by column. Test utility.
pub fn assemble_dense<K: CellKernel + ?Sized>(kernel: &K) -> DMatrix<f64> {
    let n_rows = kernel.row_space().n_dofs();
    let n_cols = kernel.column_space().n_dofs();
    let mut matrix = DMatrix::zeros(n_rows, n_cols);
    let mut unit: DofVector = Array1::zeros(n_cols);
    let mut column = kernel.row_space().zero_vector();
    for k in 0..n_cols {
        unit[k] = 1.;
        apply(kernel, &unit, &mut column);
        unit[k] = 0.;
        for (i, c) in column.iter().enumerate() {
            matrix[(i, k)] = *c;
        }
    }
    matrix
}

/// Interior penalty parameter on a face normal to direction `dir`
#[inline]
pub(crate) fn penalty_parameter(space: &DgSpace, ip_factor: f64, dir: usize) -> f64 {
    let k1 = (space.degree() + 1) as f64;
    ip_factor * k1 * k1 * 2. / space.grid.h[dir]
}
