//! Weak pressure gradient and velocity divergence
//!
//! $$
//! g(p, v) = -(\nabla \cdot v, p)_\Omega + \langle v \cdot n, \\{p\\} \rangle,
//! \quad
//! d(u, q) = -(\nabla q, u)_\Omega + \langle q, \\{u\\} \cdot n \rangle
//! $$
//!
//! Both are integrated with the velocity quadrature, the pressure is
//! interpolated to the velocity nodes. With homogeneous boundary data
//! the discrete operators are adjoint, $ G = -D^T $.
//!
//! On velocity Dirichlet boundaries $ \\{u\\} = g_u $ and $ \\{p\\} = p^- $,
//! on pressure Dirichlet boundaries $ \\{p\\} = g_p $ and $ \\{u\\} = u^- $.
use super::{as_slice, component, BoundaryDescriptor, CellKernel, RhsAssembler};
use crate::fe::{face_node, face_trace, DgSpace};
use crate::functions::FunctionPtr;
use crate::grid::{face_direction, face_normal_sign, opposite_face, FaceNeighbor, FACES_PER_CELL};
use crate::types::{DofVector, DIM};
use ndarray::Array2;

/// Interpolation from the pressure to the velocity nodes
#[derive(Debug, Clone)]
struct PressureToVelocity {
    /// `values[[q, b]]` $= l^p_b(\xi^u_q)$
    values: Array2<f64>,
    /// `derivatives[[q, b]]` $= l^{p\prime}_b(\xi^u_q)$
    derivatives: Array2<f64>,
}

impl PressureToVelocity {
    fn new(space_u: &DgSpace, space_p: &DgSpace) -> Self {
        Self {
            values: space_p.basis.interpolation_matrix(&space_u.basis.nodes),
            derivatives: space_p.basis.derivative_matrix_at(&space_u.basis.nodes),
        }
    }

    /// Pressure chunk evaluated at the velocity nodes
    fn interpolate(&self, p: &[f64], nu: usize, np: usize, out: &mut [f64]) {
        let m = &self.values;
        for j in 0..nu {
            for i in 0..nu {
                let mut sum = 0.;
                for b2 in 0..np {
                    for b1 in 0..np {
                        sum += m[[i, b1]] * m[[j, b2]] * p[b1 + np * b2];
                    }
                }
                out[i + nu * j] = sum;
            }
        }
    }
}

/// Weak gradient, pressure space to velocity space
#[derive(Clone)]
pub struct GradientOperator {
    /// Velocity space
    pub space_u: DgSpace,
    /// Pressure space
    pub space_p: DgSpace,
    /// Velocity boundary conditions
    pub bc_u: BoundaryDescriptor,
    /// Pressure boundary conditions
    pub bc_p: BoundaryDescriptor,
    interp: PressureToVelocity,
}

impl GradientOperator {
    /// Gradient operator
    pub fn new(
        space_u: &DgSpace,
        space_p: &DgSpace,
        bc_u: BoundaryDescriptor,
        bc_p: BoundaryDescriptor,
    ) -> Self {
        Self {
            interp: PressureToVelocity::new(space_u, space_p),
            space_u: space_u.clone(),
            space_p: space_p.clone(),
            bc_u,
            bc_p,
        }
    }

    /// Add $ \langle v \cdot n, g \rangle $ on pressure Dirichlet boundaries,
    /// `value(g_p, point)` evaluates the boundary data
    pub fn boundary_add<F>(&self, dst: &mut DofVector, value: F)
    where
        F: Fn(&FunctionPtr, crate::types::Point) -> f64 + Sync,
    {
        let space = &self.space_u;
        let basis = &space.basis;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        super::cell_loop(space, dst, |cell, out| {
            for face in 0..FACES_PER_CELL {
                let g = match space.grid.neighbor(cell, face) {
                    FaceNeighbor::Boundary(id) => match self.bc_p.dirichlet.get(&id) {
                        Some(g) => g,
                        None => continue,
                    },
                    FaceNeighbor::Interior(_) => continue,
                };
                let (dir, side) = face_direction(face);
                let sign = face_normal_sign(face);
                for t in 0..n {
                    let w = space.face_jxw(face, t);
                    let gp = value(g, space.face_point(cell, face, t));
                    for i in 0..n {
                        out[dir * nn + face_node(n, dir, i, t)] +=
                            w * sign * gp * basis.face_values[side][i];
                    }
                }
            }
        });
    }
}

impl RhsAssembler for GradientOperator {
    /// Subtract the pressure Dirichlet contribution $ \langle v \cdot n, g_p \rangle $
    /// at time `time`, the full gradient is $ G p - rhs $
    fn rhs_add(&self, dst: &mut DofVector, time: f64) {
        self.boundary_add(dst, |f, p| -f.value(p, time, 0));
    }
}

impl CellKernel for GradientOperator {
    fn row_space(&self) -> &DgSpace {
        &self.space_u
    }

    fn column_space(&self) -> &DgSpace {
        &self.space_p
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        let space = &self.space_u;
        let basis = &space.basis;
        let d = &basis.derivative;
        let n = space.n_1d();
        let np = self.space_p.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let src = as_slice(src);
        let mut pm = vec![0.; nn];
        let mut pp = vec![0.; nn];
        let mut pm_face = vec![0.; n];
        let mut pp_face = vec![0.; n];
        self.interp
            .interpolate(component(&self.space_p, src, cell, 0), n, np, &mut pm);

        // -(div v, p)
        for j in 0..n {
            for i in 0..n {
                let mut sx = 0.;
                let mut sy = 0.;
                for m in 0..n {
                    sx += 2. / h[0] * d[[m, i]] * space.jxw(m + n * j) * pm[m + n * j];
                    sy += 2. / h[1] * d[[m, j]] * space.jxw(i + n * m) * pm[i + n * m];
                }
                dst[i + n * j] = -sx;
                dst[nn + i + n * j] = -sy;
            }
        }

        // <v.n, {p}>
        for face in 0..FACES_PER_CELL {
            let (dir, side) = face_direction(face);
            let sign = face_normal_sign(face);
            face_trace(basis, &pm, face, &mut pm_face);
            match space.grid.neighbor(cell, face) {
                FaceNeighbor::Interior(nb) => {
                    self.interp
                        .interpolate(component(&self.space_p, src, nb, 0), n, np, &mut pp);
                    face_trace(basis, &pp, opposite_face(face), &mut pp_face);
                }
                FaceNeighbor::Boundary(id) => {
                    if self.bc_p.is_dirichlet(id) {
                        // {p} = g_p, homogeneous part vanishes
                        pp_face.iter_mut().zip(&pm_face).for_each(|(x, y)| *x = -y);
                    } else {
                        pp_face.copy_from_slice(&pm_face);
                    }
                }
            }
            for t in 0..n {
                let avg = 0.5 * (pm_face[t] + pp_face[t]);
                let w = space.face_jxw(face, t);
                for i in 0..n {
                    dst[dir * nn + face_node(n, dir, i, t)] +=
                        w * sign * avg * basis.face_values[side][i];
                }
            }
        }
    }
}

/// Weak divergence, velocity space to pressure space
#[derive(Clone)]
pub struct DivergenceOperator {
    /// Velocity space
    pub space_u: DgSpace,
    /// Pressure space
    pub space_p: DgSpace,
    /// Velocity boundary conditions
    pub bc_u: BoundaryDescriptor,
    /// Pressure boundary conditions
    pub bc_p: BoundaryDescriptor,
    interp: PressureToVelocity,
}

impl DivergenceOperator {
    /// Divergence operator
    pub fn new(
        space_u: &DgSpace,
        space_p: &DgSpace,
        bc_u: BoundaryDescriptor,
        bc_p: BoundaryDescriptor,
    ) -> Self {
        Self {
            interp: PressureToVelocity::new(space_u, space_p),
            space_u: space_u.clone(),
            space_p: space_p.clone(),
            bc_u,
            bc_p,
        }
    }

    /// Test function $ q_b $ at the velocity face point `t`
    #[inline]
    fn face_test_value(&self, face: usize, b: usize, t: usize) -> f64 {
        let (dir, side) = face_direction(face);
        let np = self.space_p.n_1d();
        let (b_normal, b_tang) = if dir == 0 { (b % np, b / np) } else { (b / np, b % np) };
        self.space_p.basis.face_values[side][b_normal] * self.interp.values[[t, b_tang]]
    }

    /// Add $ \langle q, g \cdot n \rangle $ on velocity Dirichlet boundaries,
    /// `value(g_u, point, component)` evaluates the boundary data
    pub fn boundary_add<F>(&self, dst: &mut DofVector, value: F)
    where
        F: Fn(&FunctionPtr, crate::types::Point, usize) -> f64 + Sync,
    {
        let space = &self.space_u;
        let n = space.n_1d();
        let nnp = self.space_p.n_cell_nodes();
        super::cell_loop(&self.space_p, dst, |cell, out| {
            for face in 0..FACES_PER_CELL {
                let g = match space.grid.neighbor(cell, face) {
                    FaceNeighbor::Boundary(id) => match self.bc_u.dirichlet.get(&id) {
                        Some(g) => g,
                        None => continue,
                    },
                    FaceNeighbor::Interior(_) => continue,
                };
                let (dir, _) = face_direction(face);
                let sign = face_normal_sign(face);
                for t in 0..n {
                    let w = space.face_jxw(face, t);
                    let gn = sign * value(g, space.face_point(cell, face, t), dir);
                    for (b, o) in out.iter_mut().enumerate().take(nnp) {
                        *o += w * gn * self.face_test_value(face, b, t);
                    }
                }
            }
        });
    }
}

impl RhsAssembler for DivergenceOperator {
    /// Subtract the velocity Dirichlet contribution $ \langle q, g_u \cdot n \rangle $
    /// at time `time`, the full divergence is $ D u - rhs $
    fn rhs_add(&self, dst: &mut DofVector, time: f64) {
        self.boundary_add(dst, |g, p, c| -g.value(p, time, c));
    }
}

impl CellKernel for DivergenceOperator {
    fn row_space(&self) -> &DgSpace {
        &self.space_p
    }

    fn column_space(&self) -> &DgSpace {
        &self.space_u
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        let space = &self.space_u;
        let basis = &space.basis;
        let n = space.n_1d();
        let np = self.space_p.n_1d();
        let h = space.grid.h;
        let src = as_slice(src);
        let u = [component(space, src, cell, 0), component(space, src, cell, 1)];
        let iv = &self.interp.values;
        let id = &self.interp.derivatives;
        let mut um = [vec![0.; n], vec![0.; n]];
        let mut up = [vec![0.; n], vec![0.; n]];

        // -(grad q, u)
        for b2 in 0..np {
            for b1 in 0..np {
                let mut sum = 0.;
                for j in 0..n {
                    for i in 0..n {
                        let q = i + n * j;
                        let dqx = 2. / h[0] * id[[i, b1]] * iv[[j, b2]];
                        let dqy = 2. / h[1] * iv[[i, b1]] * id[[j, b2]];
                        sum += space.jxw(q) * (dqx * u[0][q] + dqy * u[1][q]);
                    }
                }
                dst[b1 + np * b2] = -sum;
            }
        }

        // <q, {u}.n>
        for face in 0..FACES_PER_CELL {
            let (dir, _) = face_direction(face);
            let sign = face_normal_sign(face);
            for c in 0..DIM {
                face_trace(basis, u[c], face, &mut um[c]);
            }
            match space.grid.neighbor(cell, face) {
                FaceNeighbor::Interior(nb) => {
                    for c in 0..DIM {
                        face_trace(basis, component(space, src, nb, c), opposite_face(face), &mut up[c]);
                    }
                }
                FaceNeighbor::Boundary(id) => {
                    for c in 0..DIM {
                        if self.bc_u.is_dirichlet(id) {
                            // {u} = g_u, homogeneous part vanishes
                            up[c].iter_mut().zip(&um[c]).for_each(|(x, y)| *x = -y);
                        } else {
                            up[c].copy_from_slice(&um[c]);
                        }
                    }
                }
            }
            for t in 0..n {
                let w = space.face_jxw(face, t);
                let flux = w * sign * 0.5 * (um[dir][t] + up[dir][t]);
                for (b, o) in dst.iter_mut().enumerate() {
                    *o += flux * self.face_test_value(face, b, t);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use crate::operators::{apply, assemble_dense};
    use std::sync::Arc;

    fn spaces() -> (DgSpace, DgSpace, BoundaryDescriptor, BoundaryDescriptor) {
        let grid = Arc::new(Grid::hyper_rectangle([3, 2], [0., 0.], [1.5, 1.]));
        let space_u = DgSpace::new(grid.clone(), 3, 2);
        let space_p = DgSpace::new(grid, 2, 1);
        let zero_u = from_fn(2, |_, _, _| 0.);
        let zero_p = from_fn(1, |_, _, _| 0.);
        // walls on 0, 2, 3 and outflow on 1
        let bc_u = BoundaryDescriptor::new()
            .with_dirichlet(0, zero_u.clone())
            .with_dirichlet(2, zero_u.clone())
            .with_dirichlet(3, zero_u.clone())
            .with_neumann(1, zero_u);
        let bc_p = BoundaryDescriptor::new()
            .with_neumann(0, zero_p.clone())
            .with_neumann(2, zero_p.clone())
            .with_neumann(3, zero_p.clone())
            .with_dirichlet(1, zero_p);
        (space_u, space_p, bc_u, bc_p)
    }

    #[test]
    fn test_gradient_divergence_adjoint() {
        let (space_u, space_p, bc_u, bc_p) = spaces();
        let grad = GradientOperator::new(&space_u, &space_p, bc_u.clone(), bc_p.clone());
        let div = DivergenceOperator::new(&space_u, &space_p, bc_u, bc_p);
        let g = assemble_dense(&grad);
        let d = assemble_dense(&div);
        let diff = (&g + d.transpose()).abs().max();
        assert!(diff < 1e-11, "G != -D^T: {}", diff);
    }

    #[test]
    fn test_gradient_of_linear_pressure() {
        // M^{-1} (G p - rhs) = grad p for p = 2x - y + 1
        let (space_u, space_p, bc_u, _) = spaces();
        let exact = from_fn(1, |p, _, _| 2. * p[0] - p[1] + 1.);
        let bc_p = BoundaryDescriptor::new()
            .with_neumann(0, exact.clone())
            .with_neumann(2, exact.clone())
            .with_neumann(3, exact.clone())
            .with_dirichlet(1, exact.clone());
        let grad = GradientOperator::new(&space_u, &space_p, bc_u, bc_p);
        let p = interpolate(&space_p, exact.as_ref(), 0.);
        let mut gp = space_u.zero_vector();
        apply(&grad, &p, &mut gp);
        let mut rhs = space_u.zero_vector();
        grad.rhs_add(&mut rhs, 0.);
        gp -= &rhs;
        let mut result = space_u.zero_vector();
        crate::operators::apply_inverse_mass(&space_u, &gp, &mut result);
        let nn = space_u.n_cell_nodes();
        for cell in 0..space_u.grid.n_active_cells() {
            for node in 0..nn {
                assert!((result[space_u.dof(cell, 0, node)] - 2.).abs() < 1e-10);
                assert!((result[space_u.dof(cell, 1, node)] + 1.).abs() < 1e-10);
            }
        }
    }
}
