//! Mass matrix (diagonal through collocated quadrature)
use super::{as_slice, cell_loop, CellKernel};
use crate::fe::DgSpace;
use crate::types::DofVector;

/// $ (u, v)_\Omega $
#[derive(Debug, Clone)]
pub struct MassOperator {
    /// Discrete space
    pub space: DgSpace,
    /// Scaling factor in front of the mass matrix
    pub scaling: f64,
}

impl MassOperator {
    /// Mass operator on `space`
    pub fn new(space: &DgSpace) -> Self {
        Self {
            space: space.clone(),
            scaling: 1.,
        }
    }
}

impl CellKernel for MassOperator {
    fn row_space(&self) -> &DgSpace {
        &self.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        let nn = self.space.n_cell_nodes();
        let offset = self.space.dof(cell, 0, 0);
        let src = as_slice(src);
        for (k, d) in dst.iter_mut().enumerate() {
            *d = self.scaling * self.space.jxw(k % nn) * src[offset + k];
        }
    }
}

/// $ dst = M^{-1} src $
pub fn apply_inverse_mass(space: &DgSpace, src: &DofVector, dst: &mut DofVector) {
    let nn = space.n_cell_nodes();
    let src = as_slice(src);
    cell_loop(space, dst, |cell, out| {
        let offset = space.dof(cell, 0, 0);
        for (k, d) in out.iter_mut().enumerate() {
            *d = src[offset + k] / space.jxw(k % nn);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::operators::apply;
    use std::sync::Arc;

    #[test]
    fn test_inverse_mass() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [2., 1.]));
        let space = DgSpace::new(grid, 3, 2);
        let mass = MassOperator::new(&space);
        let x = DofVector::from_shape_fn(space.n_dofs(), |i| (i as f64).sin());
        let mut mx = space.zero_vector();
        apply(&mass, &x, &mut mx);
        let mut y = space.zero_vector();
        apply_inverse_mass(&space, &mx, &mut y);
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
