//! Scalar transport by a prescribed velocity field, upwind flux
//!
//! $$
//! c(u, v) = -(u \, b, \nabla v)_\Omega + \langle (b \cdot n) \hat u, v \rangle
//! $$
//! with $ \hat u $ the upwind value. On inflow Dirichlet boundaries the
//! exterior value is $ g $, elsewhere on the boundary $ u^+ = u^- $.
use super::{as_slice, cell_loop, component, BoundaryDescriptor, CellKernel, RhsAssembler};
use crate::fe::{face_node, face_trace, DgSpace};
use crate::functions::FunctionPtr;
use crate::grid::{face_direction, face_normal_sign, opposite_face, FaceNeighbor, FACES_PER_CELL};
use crate::types::DofVector;

/// Transport operator for a scalar quantity
#[derive(Clone)]
pub struct TransportOperator {
    /// Scalar space
    pub space: DgSpace,
    /// Transport velocity $ b(x, t) $
    pub velocity: FunctionPtr,
    /// Boundary conditions of the scalar
    pub bc: BoundaryDescriptor,
}

impl TransportOperator {
    /// Transport operator
    pub fn new(space: &DgSpace, velocity: FunctionPtr, bc: BoundaryDescriptor) -> Self {
        Self {
            space: space.clone(),
            velocity,
            bc,
        }
    }

    /// Rows of `cell`. If `homogeneous` is false, inflow data at `time`
    /// is included.
    pub fn evaluate_cell(&self, cell: usize, src: &DofVector, time: f64, homogeneous: bool, dst: &mut [f64]) {
        let space = &self.space;
        let basis = &space.basis;
        let d = &basis.derivative;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let src = as_slice(src);
        let u = component(space, src, cell, 0);
        let b: Vec<[f64; 2]> = (0..nn)
            .map(|q| {
                let p = space.node_point(cell, q);
                [self.velocity.value(p, time, 0), self.velocity.value(p, time, 1)]
            })
            .collect();

        for j in 0..n {
            for i in 0..n {
                let mut sum = 0.;
                for m in 0..n {
                    let qx = m + n * j;
                    let qy = i + n * m;
                    sum += 2. / h[0] * d[[m, i]] * space.jxw(qx) * u[qx] * b[qx][0];
                    sum += 2. / h[1] * d[[m, j]] * space.jxw(qy) * u[qy] * b[qy][1];
                }
                dst[i + n * j] = -sum;
            }
        }

        let mut um = vec![0.; n];
        let mut up = vec![0.; n];
        for face in 0..FACES_PER_CELL {
            let (dir, side) = face_direction(face);
            let sign = face_normal_sign(face);
            face_trace(basis, u, face, &mut um);
            let inflow = match space.grid.neighbor(cell, face) {
                FaceNeighbor::Interior(nb) => {
                    face_trace(basis, component(space, src, nb, 0), opposite_face(face), &mut up);
                    None
                }
                FaceNeighbor::Boundary(id) => {
                    up.copy_from_slice(&um);
                    self.bc.dirichlet.get(&id)
                }
            };
            for t in 0..n {
                let p = space.face_point(cell, face, t);
                let bn = sign * self.velocity.value(p, time, dir);
                let upwind = if bn >= 0. {
                    um[t]
                } else {
                    match inflow {
                        Some(_) if homogeneous => 0.,
                        Some(g) => g.value(p, time, 0),
                        None => up[t],
                    }
                };
                let w = space.face_jxw(face, t);
                for i in 0..n {
                    dst[face_node(n, dir, i, t)] += w * bn * upwind * basis.face_values[side][i];
                }
            }
        }
    }

    /// $ dst = C(src) $ including the inflow data at `time`
    pub fn evaluate(&self, dst: &mut DofVector, src: &DofVector, time: f64) {
        cell_loop(&self.space, dst, |cell, out| {
            self.evaluate_cell(cell, src, time, false, out)
        });
    }

    /// Homogeneous operator at `time`, as a [`CellKernel`]
    pub fn at(&self, time: f64) -> TransportAt<'_> {
        TransportAt { op: self, time }
    }
}

impl RhsAssembler for TransportOperator {
    /// Subtract the inflow contribution at `time` from `dst`,
    /// such that $ C(u) = C_0 u - rhs $
    fn rhs_add(&self, dst: &mut DofVector, time: f64) {
        let zero = self.space.zero_vector();
        let mut inflow = self.space.zero_vector();
        self.evaluate(&mut inflow, &zero, time);
        *dst -= &inflow;
    }
}

/// [`TransportOperator`] at a fixed time with homogeneous boundary data
pub struct TransportAt<'a> {
    op: &'a TransportOperator,
    time: f64,
}

impl CellKernel for TransportAt<'_> {
    fn row_space(&self) -> &DgSpace {
        &self.op.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        self.op.evaluate_cell(cell, src, self.time, true, dst)
    }
}
