//! Operators of the high-order dual splitting scheme
//!
//! The pressure Neumann data on velocity Dirichlet boundaries follows
//! from the momentum equation with the viscous term in rotational form,
//! $$
//! \partial_n p = -n \cdot \left( \frac{\partial g_u}{\partial t}
//! + \sum_i \beta_i \left( \nu \nabla \times \nabla \times u_i
//! + (u_i \cdot \nabla) u_i \right) - f \right).
//! $$
//! Boundary quantities are stored per boundary face quadrature point,
//! `values[(bf * n + t) * 2 + c]` with `bf` the index into
//! [`Grid::boundary_faces`](crate::grid::Grid::boundary_faces).
use super::{MomentumPreconditioner, OperatorContext, ProjectionOperator, SpatialOperatorBase};
use crate::error::Result;
use crate::fe::{cell_gradient, face_trace};
use crate::grid::{face_direction, face_normal_sign, BoundaryId};
use crate::incompressible::parameters::EquationType;
use crate::operators::{apply, as_slice, cell_loop, component, FacePoint};
use crate::solvers::{LinearSolver, Precondition, PreconditionerSnapshot, Solve};
use crate::types::{DofVector, DIM};
use std::collections::BTreeMap;

/// Dual splitting operator: base operators plus viscous solver and the
/// boundary data of the pressure Poisson equation
pub struct DualSplittingOperator {
    /// Shared operators
    pub base: SpatialOperatorBase,
    /// Projection step
    pub projection: ProjectionOperator,
    viscous_solver: LinearSolver,
    viscous_preconditioner: MomentumPreconditioner,
    boundary_faces: Vec<(usize, usize, BoundaryId)>,
    face_index: BTreeMap<(usize, usize), usize>,
}

impl DualSplittingOperator {
    /// Operator configured by `base.param`
    pub fn new(base: SpatialOperatorBase) -> Self {
        let boundary_faces = base.space_u.grid.boundary_faces();
        let face_index = boundary_faces
            .iter()
            .enumerate()
            .map(|(bf, (cell, face, _))| ((*cell, *face), bf))
            .collect();
        let param = &base.param;
        Self {
            projection: ProjectionOperator::new(&base),
            viscous_solver: LinearSolver::new(param.solver_viscous, param.solver_data_viscous),
            viscous_preconditioner: MomentumPreconditioner::new(param.preconditioner_viscous),
            boundary_faces,
            face_index,
            base,
        }
    }

    /// Length of a boundary trace vector
    pub fn n_boundary_values(&self) -> usize {
        self.boundary_faces.len() * self.base.space_u.n_1d() * DIM
    }

    #[inline]
    fn trace_index(&self, bf: usize, t: usize, comp: usize) -> usize {
        (bf * self.base.space_u.n_1d() + t) * DIM + comp
    }

    /// Velocity Dirichlet data at `time` on all boundary face points,
    /// zero on other boundaries
    pub fn velocity_dirichlet_trace(&self, time: f64) -> DofVector {
        let space = &self.base.space_u;
        let mut trace = DofVector::zeros(self.n_boundary_values());
        for (bf, (cell, face, id)) in self.boundary_faces.iter().enumerate() {
            if let Some(g) = self.base.bc.velocity.dirichlet.get(id) {
                for t in 0..space.n_1d() {
                    let x = space.face_point(*cell, *face, t);
                    for comp in 0..DIM {
                        trace[self.trace_index(bf, t, comp)] = g.value(x, time, comp);
                    }
                }
            }
        }
        trace
    }

    /// Trace of the velocity space field `field` on all boundary face points
    pub fn boundary_trace(&self, field: &DofVector) -> DofVector {
        let space = &self.base.space_u;
        let src = as_slice(field);
        let n = space.n_1d();
        let mut trace = DofVector::zeros(self.n_boundary_values());
        let mut out = vec![0.; n];
        for (bf, (cell, face, _)) in self.boundary_faces.iter().enumerate() {
            for comp in 0..DIM {
                face_trace(&space.basis, component(space, src, *cell, comp), *face, &mut out);
                for (t, v) in out.iter().enumerate() {
                    trace[self.trace_index(bf, t, comp)] = *v;
                }
            }
        }
        trace
    }

    /// Nodal values of $ \nu \nabla \times \nabla \times u + (u \cdot \nabla) u $,
    /// the convective part only for the Navier-Stokes equations
    pub fn nbc_field(&self, velocity: &DofVector) -> DofVector {
        let base = &self.base;
        let space = &base.space_u;
        let h = space.grid.h;
        let nu = base.viscosity();
        let nn = space.n_cell_nodes();
        let vorticity = base.compute_vorticity(velocity);
        let omega = as_slice(&vorticity);
        let src = as_slice(velocity);
        let convective = base.param.equation_type == EquationType::NavierStokes;
        let mut field = space.zero_vector();
        cell_loop(space, &mut field, |cell, out| {
            let grad_omega = cell_gradient(&space.basis, component(&base.space_scalar, omega, cell, 0), h);
            for q in 0..nn {
                out[q] = nu * grad_omega[1][q];
                out[nn + q] = -nu * grad_omega[0][q];
            }
            if convective {
                let ux = component(space, src, cell, 0);
                let uy = component(space, src, cell, 1);
                for comp in 0..DIM {
                    let g = cell_gradient(&space.basis, component(space, src, cell, comp), h);
                    for q in 0..nn {
                        out[comp * nn + q] += ux[q] * g[0][q] + uy[q] * g[1][q];
                    }
                }
            }
        });
        field
    }

    /// $ dst = -\frac{\gamma_0}{\Delta t} (D \hat{u} - rhs_D(t)) $ plus the
    /// pressure Dirichlet data at `time` and the Neumann data
    /// $ h = -n \cdot (\dot{g}_u + nbc - f(t)) $, where `dgdt` and
    /// `nbc_trace` are boundary traces
    pub fn rhs_ppe(
        &self,
        dst: &mut DofVector,
        intermediate_velocity: &DofVector,
        gamma0_dt: f64,
        dgdt: &DofVector,
        nbc_trace: &DofVector,
        time: f64,
    ) {
        let base = &self.base;
        base.evaluate_velocity_divergence_term(dst, intermediate_velocity, time);
        *dst *= -gamma0_dt;
        let neumann = |fp: &FacePoint, _: usize| -> f64 {
            let bf = match self.face_index.get(&(fp.cell, fp.face)) {
                Some(bf) => *bf,
                None => return 0.,
            };
            let (dir, _) = face_direction(fp.face);
            let i = self.trace_index(bf, fp.q, dir);
            let force = match &base.body_force {
                Some(body_force) => body_force.f.value(fp.point, time, dir),
                None => 0.,
            };
            -face_normal_sign(fp.face) * (dgdt[i] + nbc_trace[i] - force)
        };
        base.laplace_p.rhs_add_boundary(
            dst,
            |fp, _| match base.bc.pressure.dirichlet.get(&fp.boundary_id) {
                Some(g) => g.value(fp.point, time, 0),
                None => 0.,
            },
            neumann,
        );
    }

    /// Cached viscous preconditioner, stored in restart archives
    pub fn preconditioner_snapshot(&self) -> Option<PreconditionerSnapshot> {
        self.viscous_preconditioner.snapshot()
    }

    /// Reinstall the viscous preconditioner of a restart archive
    ///
    /// # Errors
    /// Type or size of the snapshot do not match.
    pub fn restore_preconditioner(&mut self, snapshot: Option<PreconditionerSnapshot>) -> Result<()> {
        self.viscous_preconditioner.restore(snapshot, &self.base.space_u)
    }

    /// Solve $ (\sigma M + V) u = rhs + rhs_V(t) $ with `dst` as initial
    /// guess, returns the number of iterations
    ///
    /// # Errors
    /// The solver did not converge.
    pub fn solve_viscous(
        &mut self,
        dst: &mut DofVector,
        rhs: &DofVector,
        time: f64,
        scaling_factor: f64,
        update_preconditioner: bool,
    ) -> Result<usize> {
        let momentum = &self.base.momentum;
        let mut b = rhs.clone();
        momentum.rhs_add(&mut b, time);
        let ctx = OperatorContext::new(time, scaling_factor);
        let kernel = momentum.with_context(&ctx)?;
        let prec: &dyn Precondition = self.viscous_preconditioner.get(&kernel, update_preconditioner)?;
        let iterations = self.viscous_solver.solve(&kernel, prec, dst, &b)?;
        log::debug!("viscous step: {} iterations", iterations);
        Ok(iterations)
    }

    /// Projection $ M u = M \hat{u} - \frac{\Delta t}{\gamma_0} G p $ with the
    /// pressure data at `time`, with divergence penalty if configured
    ///
    /// # Errors
    /// The projection solver did not converge.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_projection_operator(
        &mut self,
        dst: &mut DofVector,
        intermediate_velocity: &DofVector,
        pressure: &DofVector,
        penalty_velocity: &DofVector,
        time: f64,
        dt_gamma0: f64,
        dt: f64,
    ) -> Result<usize> {
        let base = &self.base;
        let mut rhs = base.space_u.zero_vector();
        apply(&base.momentum.mass, intermediate_velocity, &mut rhs);
        let mut gp = base.space_u.zero_vector();
        base.evaluate_pressure_gradient_term(&mut gp, pressure, time);
        rhs.scaled_add(-dt_gamma0, &gp);
        self.projection.update(base, penalty_velocity, dt)?;
        self.projection.apply_projection_operator(base, dst, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate, zero_function};
    use crate::grid::Grid;
    use crate::incompressible::{FlowBoundaryDescriptor, InputParameters};
    use crate::operators::BoundaryDescriptor;
    use std::sync::Arc;

    fn approx_eq(result: f64, expected: f64) {
        let dif = (result - expected).abs();
        if dif > 1e-9 {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    #[test]
    fn test_nbc_field_of_quadratic_velocity() {
        let grid = Arc::new(
            Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.])
                .with_periodicity(0)
                .with_periodicity(1),
        );
        let mut param = InputParameters::default();
        param.equation_type = EquationType::NavierStokes;
        param.pure_dirichlet_bc = true;
        param.viscosity = 0.5;
        let base = SpatialOperatorBase::new(grid, &param, FlowBoundaryDescriptor::default(), None).unwrap();
        let op = DualSplittingOperator::new(base);

        // u = (y^2, x): curl curl u = (-2, 0), (u.grad) u = (2xy, y^2)
        let space = &op.base.space_u;
        let u = interpolate(space, from_fn(2, |p, _, c| if c == 0 { p[1] * p[1] } else { p[0] }).as_ref(), 0.);
        let field = op.nbc_field(&u);
        for cell in 0..space.grid.n_active_cells() {
            for q in 0..space.n_cell_nodes() {
                let [x, y] = space.node_point(cell, q);
                approx_eq(field[space.dof(cell, 0, q)], -2. * 0.5 + 2. * x * y);
                approx_eq(field[space.dof(cell, 1, q)], y * y);
            }
        }
    }

    #[test]
    fn test_boundary_trace_matches_dirichlet_data() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 3], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]));
        let g = from_fn(2, |p, t, c| if c == 0 { t * p[0] * p[1] } else { p[1] * p[1] - t });
        let mut bc = FlowBoundaryDescriptor::default();
        bc.velocity = BoundaryDescriptor::new()
            .with_dirichlet(0, g.clone())
            .with_neumann(1, zero_function(2));
        bc.pressure = BoundaryDescriptor::new()
            .with_neumann(0, zero_function(1))
            .with_dirichlet(1, zero_function(1));
        let param = InputParameters::default();
        let base = SpatialOperatorBase::new(grid, &param, bc, None).unwrap();
        let op = DualSplittingOperator::new(base);

        let t = 0.7;
        let u = interpolate(&op.base.space_u, g.as_ref(), t);
        let trace = op.boundary_trace(&u);
        let data = op.velocity_dirichlet_trace(t);
        let n = op.base.space_u.n_1d();
        for (bf, (_, _, id)) in op.boundary_faces.iter().enumerate() {
            for k in 0..n * DIM {
                let i = bf * n * DIM + k;
                if *id == 0 {
                    approx_eq(trace[i], data[i]);
                } else {
                    approx_eq(data[i], 0.);
                }
            }
        }
    }
}
