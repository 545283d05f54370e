//! Preconditioners $ P^{-1} \approx A^{-1} $
use super::PreconditionerType;
use crate::error::{DgError, Result};
use crate::fe::DgSpace;
use crate::operators::{
    apply_inverse_mass, as_slice, as_slice_mut, block_diagonal, diagonal, CellKernel,
};
use crate::types::DofVector;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Apply $ P^{-1} $
#[enum_dispatch]
pub trait Precondition: Sync {
    /// $ dst = P^{-1} src $
    fn vmult(&self, dst: &mut DofVector, src: &DofVector);
}

/// Collection of preconditioners
#[enum_dispatch(Precondition)]
#[derive(Debug, Clone)]
pub enum Preconditioner {
    /// No preconditioning
    Identity(IdentityPreconditioner),
    /// Inverse diagonal
    PointJacobi(PointJacobi),
    /// Inverse cell blocks
    BlockJacobi(BlockJacobi),
    /// Inverse mass matrix
    InverseMass(InverseMassPreconditioner),
}

impl Preconditioner {
    /// Preconditioner of type `kind` for the square operator `kernel`
    ///
    /// # Errors
    /// Zero diagonal entries or singular cell blocks.
    pub fn from_kernel<K: CellKernel + ?Sized>(kind: PreconditionerType, kernel: &K) -> Result<Self> {
        let prec = match kind {
            PreconditionerType::None => IdentityPreconditioner.into(),
            PreconditionerType::PointJacobi => PointJacobi::new(&diagonal(kernel))?.into(),
            PreconditionerType::BlockJacobi => BlockJacobi::new(block_diagonal(kernel))?.into(),
            PreconditionerType::InverseMassMatrix => InverseMassPreconditioner {
                space: kernel.row_space().clone(),
            }
            .into(),
        };
        log::debug!("preconditioner {:?} set up", kind);
        Ok(prec)
    }

    /// Type of the preconditioner
    pub fn kind(&self) -> PreconditionerType {
        match self {
            Self::Identity(_) => PreconditionerType::None,
            Self::PointJacobi(_) => PreconditionerType::PointJacobi,
            Self::BlockJacobi(_) => PreconditionerType::BlockJacobi,
            Self::InverseMass(_) => PreconditionerType::InverseMassMatrix,
        }
    }

    /// Operator dependent data, enough to reinstall the preconditioner
    /// without the operator it was built from
    pub fn snapshot(&self) -> PreconditionerSnapshot {
        match self {
            Self::Identity(_) => PreconditionerSnapshot::Identity,
            Self::PointJacobi(p) => PreconditionerSnapshot::PointJacobi(p.inverse_diagonal.clone()),
            Self::BlockJacobi(p) => PreconditionerSnapshot::BlockJacobi {
                block_size: p.block_size,
                inverse_blocks: p.inverse_blocks.iter().map(|b| b.as_slice().to_vec()).collect(),
            },
            Self::InverseMass(_) => PreconditionerSnapshot::InverseMass,
        }
    }

    /// Reinstall a preconditioner from its snapshot on `space`
    ///
    /// # Errors
    /// Snapshot sizes do not match `space`.
    pub fn from_snapshot(snapshot: PreconditionerSnapshot, space: &DgSpace) -> Result<Self> {
        let n = space.n_dofs();
        let prec = match snapshot {
            PreconditionerSnapshot::Identity => IdentityPreconditioner.into(),
            PreconditionerSnapshot::PointJacobi(inverse_diagonal) => {
                if inverse_diagonal.len() != n {
                    return Err(DgError::Config(format!(
                        "point Jacobi snapshot has {} entries, space has {} dofs",
                        inverse_diagonal.len(),
                        n
                    )));
                }
                PointJacobi { inverse_diagonal }.into()
            }
            PreconditionerSnapshot::BlockJacobi {
                block_size,
                inverse_blocks,
            } => {
                let consistent = block_size * inverse_blocks.len() == n
                    && inverse_blocks.iter().all(|b| b.len() == block_size * block_size);
                if !consistent {
                    return Err(DgError::Config(format!(
                        "block Jacobi snapshot with {} blocks of size {} does not fit {} dofs",
                        inverse_blocks.len(),
                        block_size,
                        n
                    )));
                }
                BlockJacobi {
                    inverse_blocks: inverse_blocks
                        .iter()
                        .map(|b| DMatrix::from_column_slice(block_size, block_size, b))
                        .collect(),
                    block_size,
                }
                .into()
            }
            PreconditionerSnapshot::InverseMass => InverseMassPreconditioner {
                space: space.clone(),
            }
            .into(),
        };
        Ok(prec)
    }
}

/// Serializable state of a [`Preconditioner`]. Inverted blocks are
/// stored column major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreconditionerSnapshot {
    /// No preconditioning
    Identity,
    /// Inverse diagonal
    PointJacobi(DofVector),
    /// Inverse cell blocks
    BlockJacobi {
        /// Rows of one block
        block_size: usize,
        /// Inverse blocks, one per cell
        inverse_blocks: Vec<Vec<f64>>,
    },
    /// Inverse mass matrix
    InverseMass,
}

impl PreconditionerSnapshot {
    /// Type of the stored preconditioner
    pub fn kind(&self) -> PreconditionerType {
        match self {
            Self::Identity => PreconditionerType::None,
            Self::PointJacobi(_) => PreconditionerType::PointJacobi,
            Self::BlockJacobi { .. } => PreconditionerType::BlockJacobi,
            Self::InverseMass => PreconditionerType::InverseMassMatrix,
        }
    }
}

/// $ P = I $
#[derive(Debug, Clone, Copy)]
pub struct IdentityPreconditioner;

impl Precondition for IdentityPreconditioner {
    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        dst.assign(src);
    }
}

/// $ P = \mathrm{diag}(A) $
#[derive(Debug, Clone)]
pub struct PointJacobi {
    inverse_diagonal: DofVector,
}

impl PointJacobi {
    /// From the diagonal of the operator
    ///
    /// # Errors
    /// A zero diagonal entry.
    pub fn new(diagonal: &DofVector) -> Result<Self> {
        if let Some(i) = diagonal.iter().position(|d| *d == 0.) {
            return Err(DgError::Numerical(format!(
                "point Jacobi: zero diagonal entry at dof {}",
                i
            )));
        }
        Ok(Self {
            inverse_diagonal: diagonal.mapv(|d| 1. / d),
        })
    }
}

impl Precondition for PointJacobi {
    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        dst.assign(&(&self.inverse_diagonal * src));
    }
}

/// $ P = \mathrm{blockdiag}(A) $, one block per cell
#[derive(Debug, Clone)]
pub struct BlockJacobi {
    inverse_blocks: Vec<DMatrix<f64>>,
    block_size: usize,
}

impl BlockJacobi {
    /// Invert the cell blocks
    ///
    /// # Errors
    /// A singular block.
    pub fn new(blocks: Vec<DMatrix<f64>>) -> Result<Self> {
        let block_size = blocks.first().map_or(0, |b| b.nrows());
        let inverse_blocks = blocks
            .into_par_iter()
            .enumerate()
            .map(|(cell, block)| {
                block.lu().try_inverse().ok_or_else(|| {
                    DgError::Numerical(format!("block Jacobi: singular block on cell {}", cell))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            inverse_blocks,
            block_size,
        })
    }
}

impl Precondition for BlockJacobi {
    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        let src = as_slice(src);
        as_slice_mut(dst)
            .par_chunks_mut(self.block_size)
            .zip(src.par_chunks(self.block_size))
            .zip(self.inverse_blocks.par_iter())
            .for_each(|((out, x), inv)| {
                let y = inv * DVector::from_column_slice(x);
                out.copy_from_slice(y.as_slice());
            });
    }
}

/// $ P = M $
#[derive(Debug, Clone)]
pub struct InverseMassPreconditioner {
    /// Discrete space of the operator
    pub space: DgSpace,
}

impl Precondition for InverseMassPreconditioner {
    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        apply_inverse_mass(&self.space, src, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_jacobi_exact_for_block_diagonal() {
        let b0 = DMatrix::from_row_slice(2, 2, &[2., 1., 1., 3.]);
        let b1 = DMatrix::from_row_slice(2, 2, &[4., 0., 1., 1.]);
        let prec = Preconditioner::from(BlockJacobi::new(vec![b0, b1]).unwrap());
        let x = DofVector::from(vec![1., 2., 3., 4.]);
        // A x
        let ax = DofVector::from(vec![4., 7., 12., 7.]);
        let mut y = DofVector::zeros(4);
        prec.vmult(&mut y, &ax);
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_snapshot_reinstalls_identical_preconditioner() {
        use crate::grid::Grid;
        use std::sync::Arc;
        let space = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 1.)), 1, 1);
        let blocks: Vec<DMatrix<f64>> = (0..4)
            .map(|c| DMatrix::from_row_slice(4, 4, &[
                4., 1., 0., 0.,
                0.5, 3., 1., 0.,
                0., 1., 5. + c as f64, 1.,
                0., 0., 2., 6.,
            ]))
            .collect();
        let x = DofVector::from_shape_fn(space.n_dofs(), |i| (i as f64).sin());
        for prec in [
            Preconditioner::from(BlockJacobi::new(blocks).unwrap()),
            Preconditioner::from(PointJacobi::new(&DofVector::from_elem(space.n_dofs(), 3.)).unwrap()),
        ] {
            let restored = Preconditioner::from_snapshot(prec.snapshot(), &space).unwrap();
            assert_eq!(restored.kind(), prec.kind());
            let (mut y, mut z) = (space.zero_vector(), space.zero_vector());
            prec.vmult(&mut y, &x);
            restored.vmult(&mut z, &x);
            assert_eq!(y, z);
        }
        let wrong = PreconditionerSnapshot::PointJacobi(DofVector::zeros(3));
        assert!(Preconditioner::from_snapshot(wrong, &space).is_err());
    }

    #[test]
    fn test_singular_block_is_error() {
        let b0 = DMatrix::from_row_slice(2, 2, &[1., 1., 1., 1.]);
        assert!(BlockJacobi::new(vec![b0]).is_err());
        assert!(PointJacobi::new(&DofVector::from(vec![1., 0.])).is_err());
    }
}
