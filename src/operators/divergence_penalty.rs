//! Divergence penalty term of the projection step
//!
//! $$
//! a_D(u, v) = \sum_K \tau_K (\nabla \cdot u, \nabla \cdot v)_K,
//! \quad \tau_K = \zeta \, \Delta t \, \bar{|u|}_K \, h_{eff},
//! \quad h_{eff} = \frac{V_K^{1/d}}{k+1}
//! $$
//!
//! The term is cell local, its block diagonal is the full operator.
use super::{as_slice, component, CellKernel};
use crate::fe::{cell_gradient, DgSpace};
use crate::types::DofVector;

/// Grad-div penalty with cell-wise penalty parameter
#[derive(Debug, Clone)]
pub struct DivergencePenaltyOperator {
    /// Velocity space
    pub space: DgSpace,
    /// Penalty factor $ \zeta $
    pub factor: f64,
    /// Penalty parameter per cell
    pub tau: Vec<f64>,
}

impl DivergencePenaltyOperator {
    /// Penalty operator with zero penalty parameter
    pub fn new(space: &DgSpace, factor: f64) -> Self {
        Self {
            space: space.clone(),
            factor,
            tau: vec![0.; space.grid.n_active_cells()],
        }
    }

    /// Recompute $ \tau_K $ from `velocity` and the time step size
    pub fn update(&mut self, velocity: &DofVector, dt: f64) {
        let space = &self.space;
        let nn = space.n_cell_nodes();
        let volume = space.grid.cell_volume();
        let h_eff = volume.sqrt() / (space.degree() + 1) as f64;
        let src = as_slice(velocity);
        for (cell, tau) in self.tau.iter_mut().enumerate() {
            let ux = component(space, src, cell, 0);
            let uy = component(space, src, cell, 1);
            let norm: f64 = (0..nn)
                .map(|q| space.jxw(q) * (ux[q] * ux[q] + uy[q] * uy[q]).sqrt())
                .sum::<f64>()
                / volume;
            *tau = self.factor * dt * norm * h_eff;
        }
    }
}

impl CellKernel for DivergencePenaltyOperator {
    fn row_space(&self) -> &DgSpace {
        &self.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        let space = &self.space;
        let d = &space.basis.derivative;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let src = as_slice(src);
        let gx = cell_gradient(&space.basis, component(space, src, cell, 0), h);
        let gy = cell_gradient(&space.basis, component(space, src, cell, 1), h);
        let div: Vec<f64> = (0..nn)
            .map(|q| self.tau[cell] * space.jxw(q) * (gx[0][q] + gy[1][q]))
            .collect();
        for j in 0..n {
            for i in 0..n {
                let mut sx = 0.;
                let mut sy = 0.;
                for m in 0..n {
                    sx += 2. / h[0] * d[[m, i]] * div[m + n * j];
                    sy += 2. / h[1] * d[[m, j]] * div[i + n * m];
                }
                dst[i + n * j] = sx;
                dst[nn + i + n * j] = sy;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use crate::operators::apply;
    use std::sync::Arc;

    #[test]
    fn test_penalty_vanishes_for_solenoidal_field() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 3, 2);
        // u = (x^2, -2xy) is divergence free
        let u = interpolate(
            &space,
            from_fn(2, |p, _, c| if c == 0 { p[0] * p[0] } else { -2. * p[0] * p[1] }).as_ref(),
            0.,
        );
        let mut penalty = DivergencePenaltyOperator::new(&space, 1.);
        penalty.update(&u, 0.1);
        assert!(penalty.tau.iter().all(|t| *t > 0.));
        let mut r = space.zero_vector();
        apply(&penalty, &u, &mut r);
        assert!(r.iter().all(|x| x.abs() < 1e-12));
    }
}
