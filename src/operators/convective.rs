//! Convective term of the incompressible Navier-Stokes equations in
//! divergence formulation with local Lax-Friedrichs flux
//!
//! $$
//! c(u, v) = -(u \otimes u, \nabla v)_\Omega
//! + \langle \\{u \otimes u\\} n + \frac{\lambda}{2} [u], v \rangle,
//! \quad \lambda = 2 \max(|u^- \cdot n|, |u^+ \cdot n|)
//! $$
//!
//! Exterior values on Dirichlet boundaries are mirrored,
//! $ u^+ = -u^- + 2 g $, and copied on Neumann boundaries, $ u^+ = u^- $.
use super::{as_slice, component, BoundaryDescriptor, BoundaryType, CellKernel};
use crate::fe::{face_node, face_trace, DgSpace};
use crate::grid::{face_direction, face_normal_sign, opposite_face, FaceNeighbor, FACES_PER_CELL};
use crate::types::{DofVector, DIM};

/// Nonlinear convective operator and its linearization
#[derive(Clone)]
pub struct ConvectiveOperator {
    /// Velocity space (two components)
    pub space: DgSpace,
    /// Velocity boundary conditions
    pub bc: BoundaryDescriptor,
    /// Scales the Lax-Friedrichs penalty
    pub upwind_factor: f64,
}

/// Traces of both velocity components on one face
struct FaceValues {
    minus: [Vec<f64>; DIM],
    plus: [Vec<f64>; DIM],
}

impl FaceValues {
    fn new(n: usize) -> Self {
        Self {
            minus: [vec![0.; n], vec![0.; n]],
            plus: [vec![0.; n], vec![0.; n]],
        }
    }
}

impl ConvectiveOperator {
    /// Convective operator on the velocity space
    pub fn new(space: &DgSpace, bc: BoundaryDescriptor, upwind_factor: f64) -> Self {
        Self {
            space: space.clone(),
            bc,
            upwind_factor,
        }
    }

    /// Interior and exterior traces of `u` on `face`.
    /// `homogeneous` drops the Dirichlet data.
    fn face_values(
        &self,
        src: &[f64],
        cell: usize,
        face: usize,
        time: f64,
        homogeneous: bool,
        fv: &mut FaceValues,
    ) {
        let space = &self.space;
        let basis = &space.basis;
        for c in 0..DIM {
            face_trace(basis, component(space, src, cell, c), face, &mut fv.minus[c]);
        }
        match space.grid.neighbor(cell, face) {
            FaceNeighbor::Interior(nb) => {
                for c in 0..DIM {
                    face_trace(basis, component(space, src, nb, c), opposite_face(face), &mut fv.plus[c]);
                }
            }
            FaceNeighbor::Boundary(id) => match self.bc.get(id) {
                Some((BoundaryType::Dirichlet, g)) => {
                    for c in 0..DIM {
                        for t in 0..space.n_1d() {
                            let data = if homogeneous {
                                0.
                            } else {
                                g.value(space.face_point(cell, face, t), time, c)
                            };
                            fv.plus[c][t] = -fv.minus[c][t] + 2. * data;
                        }
                    }
                }
                _ => {
                    for c in 0..DIM {
                        fv.plus[c].copy_from_slice(&fv.minus[c]);
                    }
                }
            },
        }
    }

    /// Rows of `cell` of $ C(u) $ at time `time`, boundary data included
    pub fn evaluate_cell(&self, cell: usize, src: &DofVector, time: f64, dst: &mut [f64]) {
        let space = &self.space;
        let basis = &space.basis;
        let d = &basis.derivative;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let src = as_slice(src);
        let u = [component(space, src, cell, 0), component(space, src, cell, 1)];
        dst.iter_mut().for_each(|x| *x = 0.);

        // cell integral -(u u_d, d_d v)
        for c in 0..DIM {
            for j in 0..n {
                for i in 0..n {
                    let mut sum = 0.;
                    for m in 0..n {
                        let qx = m + n * j;
                        let qy = i + n * m;
                        sum += 2. / h[0] * d[[m, i]] * space.jxw(qx) * u[c][qx] * u[0][qx];
                        sum += 2. / h[1] * d[[m, j]] * space.jxw(qy) * u[c][qy] * u[1][qy];
                    }
                    dst[c * nn + i + n * j] = -sum;
                }
            }
        }

        let mut fv = FaceValues::new(n);
        for face in 0..FACES_PER_CELL {
            let (dir, side) = face_direction(face);
            let sign = face_normal_sign(face);
            self.face_values(src, cell, face, time, false, &mut fv);
            for t in 0..n {
                let un_m = fv.minus[dir][t] * sign;
                let un_p = fv.plus[dir][t] * sign;
                let lambda = 2. * un_m.abs().max(un_p.abs()) * self.upwind_factor;
                let w = space.face_jxw(face, t);
                for c in 0..DIM {
                    let flux = 0.5 * (fv.minus[c][t] * un_m + fv.plus[c][t] * un_p)
                        + 0.5 * lambda * (fv.minus[c][t] - fv.plus[c][t]);
                    for i in 0..n {
                        dst[c * nn + face_node(n, dir, i, t)] += w * flux * basis.face_values[side][i];
                    }
                }
            }
        }
    }

    /// Rows of `cell` of the linearized operator $ C'(u^*) \delta u $.
    /// The penalty $ \lambda $ is frozen at the linearization point.
    pub fn linearized_cell(
        &self,
        cell: usize,
        linearization: &DofVector,
        src: &DofVector,
        time: f64,
        dst: &mut [f64],
    ) {
        let space = &self.space;
        let basis = &space.basis;
        let d = &basis.derivative;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let lin = as_slice(linearization);
        let src = as_slice(src);
        let w_ = [component(space, lin, cell, 0), component(space, lin, cell, 1)];
        let du = [component(space, src, cell, 0), component(space, src, cell, 1)];
        dst.iter_mut().for_each(|x| *x = 0.);

        for c in 0..DIM {
            for j in 0..n {
                for i in 0..n {
                    let mut sum = 0.;
                    for m in 0..n {
                        let qx = m + n * j;
                        let qy = i + n * m;
                        let fx = du[c][qx] * w_[0][qx] + w_[c][qx] * du[0][qx];
                        let fy = du[c][qy] * w_[1][qy] + w_[c][qy] * du[1][qy];
                        sum += 2. / h[0] * d[[m, i]] * space.jxw(qx) * fx;
                        sum += 2. / h[1] * d[[m, j]] * space.jxw(qy) * fy;
                    }
                    dst[c * nn + i + n * j] = -sum;
                }
            }
        }

        let mut lv = FaceValues::new(n);
        let mut dv = FaceValues::new(n);
        for face in 0..FACES_PER_CELL {
            let (dir, side) = face_direction(face);
            let sign = face_normal_sign(face);
            self.face_values(lin, cell, face, time, false, &mut lv);
            self.face_values(src, cell, face, time, true, &mut dv);
            for t in 0..n {
                let wn_m = lv.minus[dir][t] * sign;
                let wn_p = lv.plus[dir][t] * sign;
                let dn_m = dv.minus[dir][t] * sign;
                let dn_p = dv.plus[dir][t] * sign;
                let lambda = 2. * wn_m.abs().max(wn_p.abs()) * self.upwind_factor;
                let w = space.face_jxw(face, t);
                for c in 0..DIM {
                    let flux = 0.5
                        * (dv.minus[c][t] * wn_m
                            + lv.minus[c][t] * dn_m
                            + dv.plus[c][t] * wn_p
                            + lv.plus[c][t] * dn_p)
                        + 0.5 * lambda * (dv.minus[c][t] - dv.plus[c][t]);
                    for i in 0..n {
                        dst[c * nn + face_node(n, dir, i, t)] += w * flux * basis.face_values[side][i];
                    }
                }
            }
        }
    }

    /// $ dst = C(src) $ at time `time`
    pub fn evaluate(&self, dst: &mut DofVector, src: &DofVector, time: f64) {
        super::cell_loop(&self.space, dst, |cell, out| {
            self.evaluate_cell(cell, src, time, out)
        });
    }

    /// $ dst \mathrel{+}= C(src) $ at time `time`
    pub fn evaluate_add(&self, dst: &mut DofVector, src: &DofVector, time: f64) {
        let mut tmp = self.space.zero_vector();
        self.evaluate(&mut tmp, src, time);
        *dst += &tmp;
    }

    /// Linearized operator at `linearization`, as a [`CellKernel`]
    pub fn linearized<'a>(&'a self, linearization: &'a DofVector, time: f64) -> LinearizedConvective<'a> {
        LinearizedConvective {
            op: self,
            linearization,
            time,
        }
    }
}

/// [`ConvectiveOperator`] linearized at a fixed velocity
pub struct LinearizedConvective<'a> {
    op: &'a ConvectiveOperator,
    linearization: &'a DofVector,
    time: f64,
}

impl CellKernel for LinearizedConvective<'_> {
    fn row_space(&self) -> &DgSpace {
        &self.op.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        self.op
            .linearized_cell(cell, self.linearization, src, self.time, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use crate::operators::apply;
    use std::sync::Arc;

    fn velocity() -> crate::functions::FunctionPtr {
        from_fn(2, |p, _, c| if c == 0 { 1. + p[0] * p[1] } else { 0.3 - p[0] })
    }

    fn test_setup() -> (DgSpace, ConvectiveOperator) {
        let grid = Arc::new(Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 2, 2);
        let zero = from_fn(2, |_, _, _| 0.);
        let bc = BoundaryDescriptor::new()
            .with_dirichlet(0, velocity())
            .with_neumann(1, zero.clone())
            .with_neumann(2, zero.clone())
            .with_neumann(3, zero);
        let op = ConvectiveOperator::new(&space, bc, 1.);
        (space, op)
    }

    #[test]
    fn test_linearization_matches_finite_difference() {
        let (space, op) = test_setup();
        let u = interpolate(&space, velocity().as_ref(), 0.);
        let du = DofVector::from_shape_fn(space.n_dofs(), |i| 1e-2 * ((i * 13) as f64).sin());
        let eps = 1e-6;
        let mut c0 = space.zero_vector();
        let mut c1 = space.zero_vector();
        op.evaluate(&mut c0, &u, 0.5);
        op.evaluate(&mut c1, &(&u + &(eps * &du)), 0.5);
        let fd = (&c1 - &c0) / eps;
        let mut lin = space.zero_vector();
        apply(&op.linearized(&u, 0.5), &du, &mut lin);
        // continuous field without jumps, the frozen lambda is exact
        for (a, b) in fd.iter().zip(lin.iter()) {
            assert!((a - b).abs() < 1e-4, "got {} expected {}", b, a);
        }
    }

    #[test]
    fn test_constant_field_periodic_zero() {
        let grid = Arc::new(
            Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.])
                .with_periodicity(0)
                .with_periodicity(1),
        );
        let space = DgSpace::new(grid, 3, 2);
        let op = ConvectiveOperator::new(&space, BoundaryDescriptor::new(), 1.);
        let u = interpolate(&space, from_fn(2, |_, _, c| [1.5, -0.5][c]).as_ref(), 0.);
        let mut c = space.zero_vector();
        op.evaluate(&mut c, &u, 0.);
        assert!(c.iter().all(|x| x.abs() < 1e-12));
    }
}
