//! Operators of the incremental pressure correction scheme
use super::{
    MomentumNewtonProblem, MomentumPreconditioner, OperatorContext, ProjectionOperator,
    SpatialOperatorBase,
};
use crate::error::Result;
use crate::operators::apply;
use crate::solvers::{LinearSolver, NewtonSolver, Precondition, PreconditionerSnapshot, Solve};
use crate::types::DofVector;

/// Boundary data of the pressure increment on pressure Dirichlet
/// boundaries, $ g_p(t_{n+1}) - \sum_i \beta_i g_p(t_{n-i}) $
#[derive(Debug, Clone, PartialEq)]
pub struct PressureIncrementData {
    /// New time
    pub time: f64,
    /// Times of the extrapolated pressure levels
    pub previous_times: Vec<f64>,
    /// Extrapolation weights
    pub beta: Vec<f64>,
}

/// Pressure correction operator: base operators plus momentum solvers
/// and projection
pub struct PressureCorrectionOperator {
    /// Shared operators
    pub base: SpatialOperatorBase,
    /// Projection step
    pub projection: ProjectionOperator,
    momentum_solver: LinearSolver,
    momentum_preconditioner: MomentumPreconditioner,
    newton: NewtonSolver,
}

impl PressureCorrectionOperator {
    /// Operator configured by `base.param`
    pub fn new(base: SpatialOperatorBase) -> Self {
        let param = &base.param;
        let mut newton = NewtonSolver::new(param.newton_solver_data_momentum);
        newton.update_preconditioner = param.update_preconditioner_momentum;
        newton.update_preconditioner_every_newton_iter =
            param.update_preconditioner_momentum_every_newton_iter;
        Self {
            projection: ProjectionOperator::new(&base),
            momentum_solver: LinearSolver::new(param.solver_momentum, param.solver_data_momentum),
            momentum_preconditioner: MomentumPreconditioner::new(param.preconditioner_momentum),
            newton,
            base,
        }
    }

    /// Cached momentum preconditioner, stored in restart archives
    pub fn preconditioner_snapshot(&self) -> Option<PreconditionerSnapshot> {
        self.momentum_preconditioner.snapshot()
    }

    /// Reinstall the momentum preconditioner of a restart archive
    ///
    /// # Errors
    /// Type or size of the snapshot do not match.
    pub fn restore_preconditioner(&mut self, snapshot: Option<PreconditionerSnapshot>) -> Result<()> {
        self.momentum_preconditioner.restore(snapshot, &self.base.space_u)
    }

    /// Solve $ (\sigma M + V) u = rhs + rhs_V(t) $ with `dst` as initial
    /// guess, returns the number of iterations
    ///
    /// # Errors
    /// The convective term is implicit, or the solver did not converge.
    pub fn solve_linear_momentum_equation(
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
        let prec: &dyn Precondition = self.momentum_preconditioner.get(&kernel, update_preconditioner)?;
        let iterations = self.momentum_solver.solve(&kernel, prec, dst, &b)?;
        log::debug!("linear momentum equation: {} iterations", iterations);
        Ok(iterations)
    }

    /// Solve $ \sigma M u + C(u) + V u - rhs_V(t) = rhs $ with Newton,
    /// returns `(newton_iterations, linear_iterations)`
    ///
    /// # Errors
    /// Newton or the linear solver did not converge.
    pub fn solve_nonlinear_momentum_equation(
        &mut self,
        dst: &mut DofVector,
        rhs: &DofVector,
        time: f64,
        scaling_factor: f64,
    ) -> Result<(usize, usize)> {
        let mut problem = MomentumNewtonProblem {
            op: &self.base.momentum,
            rhs,
            time,
            scaling_factor,
            solver: &self.momentum_solver,
            preconditioner: &mut self.momentum_preconditioner,
        };
        let iterations = self.newton.solve(&mut problem, dst)?;
        log::debug!(
            "nonlinear momentum equation: {} Newton iterations, {} linear iterations",
            iterations.0,
            iterations.1
        );
        Ok(iterations)
    }

    /// $ dst = -\frac{\gamma_0}{\Delta t} (D \hat{u} - rhs_D(t)) + rhs_L(\phi) $,
    /// the right hand side of the pressure increment equation
    pub fn rhs_pressure_increment(
        &self,
        dst: &mut DofVector,
        intermediate_velocity: &DofVector,
        gamma0_dt: f64,
        data: &PressureIncrementData,
    ) {
        let base = &self.base;
        base.evaluate_velocity_divergence_term(dst, intermediate_velocity, data.time);
        *dst *= -gamma0_dt;
        base.laplace_p.rhs_add_boundary(
            dst,
            |fp, _| Self::increment_value(base, data, fp.boundary_id, fp.point),
            |_, _| 0.,
        );
    }

    fn increment_value(
        base: &SpatialOperatorBase,
        data: &PressureIncrementData,
        id: crate::grid::BoundaryId,
        point: crate::types::Point,
    ) -> f64 {
        match base.bc.pressure.dirichlet.get(&id) {
            Some(g) => {
                g.value(point, data.time, 0)
                    - data
                        .beta
                        .iter()
                        .zip(&data.previous_times)
                        .map(|(b, t)| b * g.value(point, *t, 0))
                        .sum::<f64>()
            }
            None => 0.,
        }
    }

    /// $ dst = G \phi $ including the increment data on pressure Dirichlet
    /// boundaries
    pub fn evaluate_increment_gradient(
        &self,
        dst: &mut DofVector,
        increment: &DofVector,
        data: &PressureIncrementData,
    ) {
        let base = &self.base;
        apply(&base.gradient, increment, dst);
        base.gradient.boundary_add(dst, |g, x| {
            g.value(x, data.time, 0)
                - data
                    .beta
                    .iter()
                    .zip(&data.previous_times)
                    .map(|(b, t)| b * g.value(x, *t, 0))
                    .sum::<f64>()
        });
    }

    /// Rotational correction $ -\nu M_p^{-1} (D \hat{u} - rhs_D(t)) $
    pub fn rotational_correction(&self, dst: &mut DofVector, intermediate_velocity: &DofVector, time: f64) {
        let base = &self.base;
        let mut div = base.space_p.zero_vector();
        base.evaluate_velocity_divergence_term(&mut div, intermediate_velocity, time);
        base.apply_inverse_pressure_mass_matrix(dst, &div);
        *dst *= -base.viscosity();
    }

    /// Projection $ u = \hat{u} - \frac{\Delta t}{\gamma_0} M^{-1} G \phi $,
    /// with divergence penalty if configured
    ///
    /// # Errors
    /// The projection solver did not converge.
    pub fn apply_projection_operator(
        &mut self,
        dst: &mut DofVector,
        intermediate_velocity: &DofVector,
        increment_gradient: &DofVector,
        penalty_velocity: &DofVector,
        dt_gamma0: f64,
        dt: f64,
    ) -> Result<usize> {
        let base = &self.base;
        let mut rhs = base.space_u.zero_vector();
        apply(&base.momentum.mass, intermediate_velocity, &mut rhs);
        rhs.scaled_add(-dt_gamma0, increment_gradient);
        self.projection.update(base, penalty_velocity, dt)?;
        self.projection.apply_projection_operator(base, dst, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, zero_function};
    use crate::grid::Grid;
    use crate::incompressible::{FlowBoundaryDescriptor, InputParameters};
    use crate::operators::BoundaryDescriptor;
    use std::sync::Arc;

    #[test]
    fn test_increment_data_vanishes_for_constant_pressure_data() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]));
        let mut bc = FlowBoundaryDescriptor::default();
        bc.velocity = BoundaryDescriptor::new()
            .with_dirichlet(0, zero_function(2))
            .with_neumann(1, zero_function(2));
        bc.pressure = BoundaryDescriptor::new()
            .with_neumann(0, zero_function(1))
            .with_dirichlet(1, from_fn(1, |p, _, _| 1. + p[1]));
        let param = InputParameters::default();
        let base = SpatialOperatorBase::new(grid, &param, bc, None).unwrap();
        let op = PressureCorrectionOperator::new(base);

        // extrapolation weights sum to one, time independent data cancels
        let data = PressureIncrementData {
            time: 0.3,
            previous_times: vec![0.2, 0.1],
            beta: vec![2., -1.],
        };
        let u = op.base.space_u.zero_vector();
        let mut rhs = op.base.space_p.zero_vector();
        op.rhs_pressure_increment(&mut rhs, &u, 15., &data);
        assert!(rhs.iter().all(|x| x.abs() < 1e-12));

        let phi = op.base.space_p.zero_vector();
        let mut g = op.base.space_u.zero_vector();
        op.evaluate_increment_gradient(&mut g, &phi, &data);
        assert!(g.iter().all(|x| x.abs() < 1e-12));
    }
}
