//! Projection of the intermediate velocity
//!
//! Plain $ L^2 $ projection, $ u = M^{-1} rhs $, or with divergence
//! penalty term, $ (M + A_D) u = rhs $ solved with CG.
use super::SpatialOperatorBase;
use crate::error::Result;
use crate::fe::DgSpace;
use crate::operators::{apply_inverse_mass, CellKernel, DivergencePenaltyOperator, MassOperator};
use crate::solvers::{LinearSolver, Preconditioner, PreconditionerType, SolverType, Solve};
use crate::types::DofVector;

/// $ M + A_D $
pub struct ProjectionSystem<'a> {
    mass: &'a MassOperator,
    penalty: &'a DivergencePenaltyOperator,
}

impl CellKernel for ProjectionSystem<'_> {
    fn row_space(&self) -> &DgSpace {
        &self.mass.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        self.mass.cell_apply(cell, src, dst);
        let mut tmp = vec![0.; dst.len()];
        self.penalty.cell_apply(cell, src, &mut tmp);
        dst.iter_mut().zip(&tmp).for_each(|(d, p)| *d += p);
    }
}

/// Projection step of the splitting schemes
pub struct ProjectionOperator {
    penalty: Option<DivergencePenaltyOperator>,
    solver: LinearSolver,
    kind: PreconditionerType,
    preconditioner: Option<Preconditioner>,
}

impl ProjectionOperator {
    /// Projection configured by `base.param`
    pub fn new(base: &SpatialOperatorBase) -> Self {
        let param = &base.param;
        Self {
            penalty: param
                .use_divergence_penalty
                .then(|| DivergencePenaltyOperator::new(&base.space_u, param.divergence_penalty_factor)),
            solver: LinearSolver::new(SolverType::CG, param.solver_data_projection),
            kind: param.preconditioner_projection,
            preconditioner: None,
        }
    }

    /// Divergence penalty term is used
    pub fn has_penalty(&self) -> bool {
        self.penalty.is_some()
    }

    /// Recompute the penalty parameter for `velocity` and the time step
    /// `dt`, and the preconditioner of $ M + A_D $
    ///
    /// # Errors
    /// Singular preconditioner blocks.
    pub fn update(&mut self, base: &SpatialOperatorBase, velocity: &DofVector, dt: f64) -> Result<()> {
        if let Some(penalty) = &mut self.penalty {
            penalty.update(velocity, dt);
            let system = ProjectionSystem {
                mass: &base.momentum.mass,
                penalty,
            };
            self.preconditioner = Some(Preconditioner::from_kernel(self.kind, &system)?);
        }
        Ok(())
    }

    /// Solve the projection with right hand side `rhs`, returns the
    /// number of iterations
    ///
    /// # Errors
    /// CG did not converge.
    pub fn apply_projection_operator(
        &self,
        base: &SpatialOperatorBase,
        dst: &mut DofVector,
        rhs: &DofVector,
    ) -> Result<usize> {
        apply_inverse_mass(&base.space_u, rhs, dst);
        match (&self.penalty, &self.preconditioner) {
            (Some(penalty), Some(prec)) => {
                let system = ProjectionSystem {
                    mass: &base.momentum.mass,
                    penalty,
                };
                let iterations = self.solver.solve(&system, prec, dst, rhs)?;
                log::debug!("projection: {} iterations", iterations);
                Ok(iterations)
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use crate::incompressible::{FlowBoundaryDescriptor, InputParameters};
    use crate::operators::apply;
    use std::f64::consts::PI;
    use std::sync::Arc;

    #[test]
    fn test_penalty_projection_damps_divergence() {
        let grid = Arc::new(
            Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.])
                .with_periodicity(0)
                .with_periodicity(1),
        );
        let mut param = InputParameters::default();
        param.pure_dirichlet_bc = true;
        param.use_divergence_penalty = true;
        param.divergence_penalty_factor = 10.;
        let base = SpatialOperatorBase::new(grid, &param, FlowBoundaryDescriptor::default(), None).unwrap();
        let mut projection = ProjectionOperator::new(&base);
        assert!(projection.has_penalty());

        let u = interpolate(
            &base.space_u,
            from_fn(2, |p, _, c| if c == 0 { (2. * PI * p[0]).sin() } else { 0. }).as_ref(),
            0.,
        );
        projection.update(&base, &u, 0.1).unwrap();
        let mut rhs = base.space_u.zero_vector();
        apply(&base.momentum.mass, &u, &mut rhs);
        let mut projected = base.space_u.zero_vector();
        let iterations = projection.apply_projection_operator(&base, &mut projected, &rhs).unwrap();
        assert!(iterations > 0);

        let div = |v: &DofVector| {
            let mut d = base.space_p.zero_vector();
            base.evaluate_velocity_divergence_term(&mut d, v, 0.);
            d.dot(&d).sqrt()
        };
        assert!(div(&projected) < div(&u));
    }
}
