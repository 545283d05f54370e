//! Symmetric interior penalty (SIPG) discretization of
//! $ -\nabla \cdot (\nu \nabla u) $, applied componentwise.
//!
//! $$
//! a(u, v) = (\nu \nabla u, \nabla v)_\Omega
//! - \langle \\{\nu \partial_n u\\}, [v] \rangle
//! - \langle \\{\nu \partial_n v\\}, [u] \rangle
//! + \langle \tau [u], [v] \rangle
//! $$
//! with $ \tau = IP (k+1)^2 \frac{2}{h} \nu_{max} $. Dirichlet data enters
//! through the jump $ [u] = u^- - g $, Neumann data $ h = \nu \partial_n u $
//! directly through the flux.
use super::{
    as_slice, cell_loop, component, penalty_parameter, BoundaryDescriptor, BoundaryType, CellKernel,
    FacePoint, RhsAssembler,
};
use crate::fe::{cell_gradient, face_node, face_normal_derivative, face_trace, DgSpace};
use crate::grid::{face_direction, face_normal_sign, opposite_face, FaceNeighbor, FACES_PER_CELL};
use crate::types::DofVector;

/// Coefficient $ \nu $ that varies in space, stored at the cell nodes
/// and, per side, at the face quadrature points
#[derive(Debug, Clone, PartialEq)]
pub struct VariableCoefficients {
    /// `cell[cell * n^2 + node]`
    pub cell: Vec<f64>,
    /// `face[(cell * 4 + face) * n + t]`
    pub face: Vec<f64>,
}

impl VariableCoefficients {
    /// Uniform coefficient `value`
    pub fn constant(space: &DgSpace, value: f64) -> Self {
        let n_cells = space.grid.n_active_cells();
        Self {
            cell: vec![value; n_cells * space.n_cell_nodes()],
            face: vec![value; n_cells * FACES_PER_CELL * space.n_1d()],
        }
    }

    /// Largest value
    pub fn max(&self) -> f64 {
        self.cell
            .iter()
            .chain(self.face.iter())
            .fold(f64::MIN, |a, b| a.max(*b))
    }
}

/// SIPG Laplace operator
#[derive(Clone)]
pub struct LaplaceOperator {
    /// Discrete space (any number of components)
    pub space: DgSpace,
    /// Boundary conditions
    pub bc: BoundaryDescriptor,
    /// Interior penalty factor
    pub ip_factor: f64,
    /// Constant diffusivity, used unless `coefficients` is set
    pub diffusivity: f64,
    /// Spatially varying diffusivity
    pub coefficients: Option<VariableCoefficients>,
}

impl LaplaceOperator {
    /// New operator with constant diffusivity
    pub fn new(space: &DgSpace, bc: BoundaryDescriptor, diffusivity: f64, ip_factor: f64) -> Self {
        Self {
            space: space.clone(),
            bc,
            ip_factor,
            diffusivity,
            coefficients: None,
        }
    }

    /// Pure Neumann (or periodic) problem, constants are in the kernel
    pub fn is_singular(&self) -> bool {
        self.bc.is_pure_neumann()
    }

    #[inline]
    fn nu_cell(&self, cell: usize, node: usize) -> f64 {
        match &self.coefficients {
            Some(c) => c.cell[cell * self.space.n_cell_nodes() + node],
            None => self.diffusivity,
        }
    }

    #[inline]
    fn nu_face(&self, cell: usize, face: usize, t: usize) -> f64 {
        match &self.coefficients {
            Some(c) => c.face[(cell * FACES_PER_CELL + face) * self.space.n_1d() + t],
            None => self.diffusivity,
        }
    }

    /// Add boundary data given by closures `(face_point, component)`
    pub fn rhs_add_boundary<D, N>(&self, dst: &mut DofVector, dirichlet: D, neumann: N)
    where
        D: Fn(&FacePoint, usize) -> f64 + Sync,
        N: Fn(&FacePoint, usize) -> f64 + Sync,
    {
        let space = &self.space;
        let basis = &space.basis;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        cell_loop(space, dst, |cell, out| {
            for face in 0..FACES_PER_CELL {
                let id = match space.grid.neighbor(cell, face) {
                    FaceNeighbor::Boundary(id) => id,
                    FaceNeighbor::Interior(_) => continue,
                };
                let (dir, side) = face_direction(face);
                let sign = face_normal_sign(face);
                let kind = match self.bc.get(id) {
                    Some((kind, _)) => kind,
                    None => continue,
                };
                let tau = penalty_parameter(space, self.ip_factor, dir);
                for comp in 0..space.n_components {
                    for t in 0..n {
                        let fp = FacePoint {
                            cell,
                            face,
                            q: t,
                            boundary_id: id,
                            point: space.face_point(cell, face, t),
                        };
                        let w = space.face_jxw(face, t);
                        let nu = self.nu_face(cell, face, t);
                        for i in 0..n {
                            let a = comp * nn + face_node(n, dir, i, t);
                            out[a] += match kind {
                                BoundaryType::Dirichlet => {
                                    let g = dirichlet(&fp, comp);
                                    w * g
                                        * (tau * nu * basis.face_values[side][i]
                                            - nu * sign * 2. / space.grid.h[dir]
                                                * basis.face_derivatives[side][i])
                                }
                                BoundaryType::Neumann => {
                                    w * neumann(&fp, comp) * basis.face_values[side][i]
                                }
                            };
                        }
                    }
                }
            }
        });
    }
}

impl RhsAssembler for LaplaceOperator {
    /// Add the boundary data of `bc` at time `t` to the right hand side
    fn rhs_add(&self, dst: &mut DofVector, time: f64) {
        self.rhs_add_boundary(
            dst,
            |fp, comp| {
                self.bc
                    .dirichlet
                    .get(&fp.boundary_id)
                    .map_or(0., |f| f.value(fp.point, time, comp))
            },
            |fp, comp| {
                self.bc
                    .neumann
                    .get(&fp.boundary_id)
                    .map_or(0., |f| f.value(fp.point, time, comp))
            },
        );
    }
}

impl CellKernel for LaplaceOperator {
    fn row_space(&self) -> &DgSpace {
        &self.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        let space = &self.space;
        let basis = &space.basis;
        let d = &basis.derivative;
        let n = space.n_1d();
        let nn = space.n_cell_nodes();
        let h = space.grid.h;
        let src = as_slice(src);
        let mut flux_x = vec![0.; nn];
        let mut flux_y = vec![0.; nn];
        let (mut um, mut dum, mut up, mut dup) = (vec![0.; n], vec![0.; n], vec![0.; n], vec![0.; n]);
        dst.iter_mut().for_each(|x| *x = 0.);

        for comp in 0..space.n_components {
            let u = component(space, src, cell, comp);
            let out = &mut dst[comp * nn..(comp + 1) * nn];

            // cell integral
            let grad = cell_gradient(basis, u, h);
            for q in 0..nn {
                let f = self.nu_cell(cell, q) * space.jxw(q);
                flux_x[q] = f * grad[0][q];
                flux_y[q] = f * grad[1][q];
            }
            for j in 0..n {
                for i in 0..n {
                    let mut sum = 0.;
                    for m in 0..n {
                        sum += 2. / h[0] * d[[m, i]] * flux_x[m + n * j];
                        sum += 2. / h[1] * d[[m, j]] * flux_y[i + n * m];
                    }
                    out[i + n * j] = sum;
                }
            }

            // face integrals
            for face in 0..FACES_PER_CELL {
                let (dir, side) = face_direction(face);
                let sign = face_normal_sign(face);
                let tau = penalty_parameter(space, self.ip_factor, dir);
                face_trace(basis, u, face, &mut um);
                face_normal_derivative(basis, u, face, h[dir], &mut dum);
                let neighbor = space.grid.neighbor(cell, face);
                let symmetry = match neighbor {
                    FaceNeighbor::Interior(nb) => {
                        let u_nb = component(space, src, nb, comp);
                        face_trace(basis, u_nb, opposite_face(face), &mut up);
                        face_normal_derivative(basis, u_nb, opposite_face(face), h[dir], &mut dup);
                        0.5
                    }
                    FaceNeighbor::Boundary(id) => match self.bc.get(id) {
                        Some((BoundaryType::Dirichlet, _)) => {
                            // homogeneous mirror: jump u^-, flux from inside
                            up.iter_mut().for_each(|x| *x = 0.);
                            dup.copy_from_slice(&dum);
                            1.
                        }
                        _ => continue,
                    },
                };
                for t in 0..n {
                    let w = space.face_jxw(face, t);
                    let nu_m = self.nu_face(cell, face, t);
                    let nu_p = match neighbor {
                        FaceNeighbor::Interior(nb) => self.nu_face(nb, opposite_face(face), t),
                        FaceNeighbor::Boundary(_) => nu_m,
                    };
                    let nu = 0.5 * (nu_m + nu_p);
                    let jump = um[t] - up[t];
                    let avg_flux = nu * 0.5 * (dum[t] + dup[t]) * sign;
                    let penalty = tau * nu_m.max(nu_p);
                    for i in 0..n {
                        let a = face_node(n, dir, i, t);
                        out[a] += w
                            * ((penalty * jump - avg_flux) * basis.face_values[side][i]
                                - symmetry * nu * jump * sign * 2. / h[dir]
                                    * basis.face_derivatives[side][i]);
                    }
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

    fn approx_eq(result: f64, expected: f64) {
        let dif = 1e-9;
        if (result - expected).abs() > dif {
            panic!(
                "Large difference of values, got {} expected {}.",
                result, expected
            )
        }
    }

    #[test]
    fn test_laplace_symmetric() {
        let grid = Arc::new(Grid::hyper_rectangle([3, 2], [0., 0.], [1.5, 1.]).with_periodicity(0));
        let space = DgSpace::new(grid, 2, 1);
        let bc = BoundaryDescriptor::new()
            .with_dirichlet(2, from_fn(1, |_, _, _| 0.))
            .with_neumann(3, from_fn(1, |_, _, _| 0.));
        let laplace = LaplaceOperator::new(&space, bc, 0.7, 1.);
        let a = assemble_dense(&laplace);
        let diff = (&a - a.transpose()).abs().max();
        assert!(diff < 1e-10, "laplace not symmetric: {}", diff);
    }

    #[test]
    fn test_laplace_consistent_on_linear_field() {
        // -div grad u = 0 for u = 2x + 3y + 1, Dirichlet everywhere
        let grid = Arc::new(Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 2, 1);
        let exact = from_fn(1, |p, _, _| 2. * p[0] + 3. * p[1] + 1.);
        let mut bc = BoundaryDescriptor::new();
        for id in 0..4 {
            bc = bc.with_dirichlet(id, exact.clone());
        }
        let laplace = LaplaceOperator::new(&space, bc, 1.0, 1.);
        let u = interpolate(&space, exact.as_ref(), 0.);
        let mut au = space.zero_vector();
        apply(&laplace, &u, &mut au);
        let mut rhs = space.zero_vector();
        laplace.rhs_add(&mut rhs, 0.);
        for (a, b) in au.iter().zip(rhs.iter()) {
            approx_eq(*a, *b);
        }
    }

    #[test]
    fn test_variable_coefficients_match_constant() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 3, 2);
        let bc = BoundaryDescriptor::new()
            .with_dirichlet(0, from_fn(2, |_, _, _| 0.))
            .with_dirichlet(1, from_fn(2, |_, _, _| 0.))
            .with_neumann(2, from_fn(2, |_, _, _| 0.))
            .with_neumann(3, from_fn(2, |_, _, _| 0.));
        let mut laplace = LaplaceOperator::new(&space, bc, 0.3, 1.);
        let x = DofVector::from_shape_fn(space.n_dofs(), |i| ((i * 7) as f64).cos());
        let mut y0 = space.zero_vector();
        apply(&laplace, &x, &mut y0);
        laplace.coefficients = Some(VariableCoefficients::constant(&space, 0.3));
        let mut y1 = space.zero_vector();
        apply(&laplace, &x, &mut y1);
        for (a, b) in y0.iter().zip(y1.iter()) {
            approx_eq(*a, *b);
        }
    }
}
