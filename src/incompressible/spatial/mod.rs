//! # Spatial discretization of the incompressible Navier-Stokes equations
//!
//! [`SpatialOperatorBase`] owns all discrete operators shared by the
//! time integration schemes. The schemes add their capabilities on top:
//!
//! - [`ProjectionOperator`]: projection of the intermediate velocity,
//!   optionally with divergence penalty term
//! - [`PressureCorrectionOperator`]: linear and nonlinear momentum step
//! - [`DualSplittingOperator`]: convective, viscous step and high-order
//!   pressure Neumann data
//! - [`CoupledOperator`]: monolithic velocity-pressure system
pub mod coupled;
pub mod dual_splitting;
pub mod pressure_correction;
pub mod projection_methods;
pub mod turbulence_model;
pub mod velocity_conv_diff;
pub use coupled::{BlockPreconditioner, CoupledOperator, CoupledSystem};
pub use dual_splitting::DualSplittingOperator;
pub use pressure_correction::PressureCorrectionOperator;
pub use projection_methods::{ProjectionOperator, ProjectionSystem};
pub use turbulence_model::{TurbulenceEddyViscosityModel, TurbulenceModel, TurbulenceModelData};
pub use velocity_conv_diff::{
    MomentumNewtonProblem, MomentumOperator, MomentumPreconditioner, OperatorContext,
    VelocityConvDiffOperator,
};

use super::boundary::FlowBoundaryDescriptor;
use super::parameters::{EquationType, InputParameters};
use crate::error::{DgError, Result};
use crate::fe::{cell_gradient, DgSpace};
use crate::functions::{mean_value, FunctionPtr};
use crate::grid::Grid;
use crate::operators::{
    apply, apply_inverse_mass, as_slice, cell_loop, component, BodyForceOperator, ConvectiveOperator,
    DivergenceOperator, GradientOperator, LaplaceOperator, MassOperator, RhsAssembler,
    VariableCoefficients,
};
use crate::solvers::{project_out_constant, LinearSolver, Preconditioner, Solve};
use crate::types::DofVector;
use std::sync::Arc;

/// Operators shared by all incompressible flow schemes
pub struct SpatialOperatorBase {
    /// Parameters
    pub param: InputParameters,
    /// Velocity space, degree `degree_u`, two components
    pub space_u: DgSpace,
    /// Pressure space, degree `degree_u - 1`
    pub space_p: DgSpace,
    /// Scalar space of the velocity degree (vorticity)
    pub space_scalar: DgSpace,
    /// Boundary conditions
    pub bc: FlowBoundaryDescriptor,
    /// Pressure mass operator
    pub mass_p: MassOperator,
    /// Momentum operator (mass, viscous and convective term)
    pub momentum: VelocityConvDiffOperator,
    /// Pressure gradient
    pub gradient: GradientOperator,
    /// Velocity divergence
    pub divergence: DivergenceOperator,
    /// Body force, `None` without external forcing
    pub body_force: Option<BodyForceOperator>,
    /// Pressure Poisson operator
    pub laplace_p: LaplaceOperator,
    /// Eddy viscosity model
    pub turbulence: Option<TurbulenceModel>,
    /// The pressure is only defined up to a constant
    pub operator_is_singular: bool,
    ppe_solver: LinearSolver,
    ppe_preconditioner: Preconditioner,
}

impl SpatialOperatorBase {
    /// Set up spaces and operators on `grid`
    ///
    /// # Errors
    /// Invalid parameters, incomplete boundary conditions or an invalid
    /// turbulence model.
    pub fn new(
        grid: Arc<Grid>,
        param: &InputParameters,
        bc: FlowBoundaryDescriptor,
        body_force: Option<FunctionPtr>,
    ) -> Result<Self> {
        param.check()?;
        bc.verify(&grid)?;
        if let Some(f) = &body_force {
            if f.n_components() != 2 {
                return Err(DgError::Config(format!(
                    "body force has {} components, expected 2",
                    f.n_components()
                )));
            }
        }
        let space_u = DgSpace::new(grid.clone(), param.degree_u, 2);
        let space_p = DgSpace::new(grid.clone(), param.degree_p(), 1);
        let space_scalar = DgSpace::new(grid, param.degree_u, 1);

        let viscous = LaplaceOperator::new(
            &space_u,
            bc.velocity.clone(),
            param.viscosity,
            param.ip_factor_viscous,
        );
        let convective = (param.equation_type == EquationType::NavierStokes)
            .then(|| ConvectiveOperator::new(&space_u, bc.velocity.clone(), param.upwind_factor));
        let momentum = VelocityConvDiffOperator::new(
            &space_u,
            viscous,
            convective,
            param.convective_problem(),
        );
        let turbulence = match &param.turbulence_model {
            Some(data) => Some(TurbulenceModel::new(&space_u, *data, param.viscosity)?),
            None => None,
        };

        let laplace_p = LaplaceOperator::new(&space_p, bc.pressure.clone(), 1., param.ip_factor_pressure);
        let operator_is_singular = bc.operator_is_singular(param);
        let ppe_preconditioner =
            Preconditioner::from_kernel(param.preconditioner_pressure_poisson, &laplace_p)?;

        log::info!(
            "spatial operators: {} cells, velocity degree {} ({} dofs), pressure degree {} ({} dofs), singular pressure: {}",
            space_u.grid.n_active_cells(),
            space_u.degree(),
            space_u.n_dofs(),
            space_p.degree(),
            space_p.n_dofs(),
            operator_is_singular
        );

        Ok(Self {
            gradient: GradientOperator::new(&space_u, &space_p, bc.velocity.clone(), bc.pressure.clone()),
            divergence: DivergenceOperator::new(&space_u, &space_p, bc.velocity.clone(), bc.pressure.clone()),
            body_force: body_force.map(|f| BodyForceOperator::new(&space_u, f)),
            mass_p: MassOperator::new(&space_p),
            ppe_solver: LinearSolver::new(
                param.solver_pressure_poisson,
                param.solver_data_pressure_poisson,
            ),
            param: param.clone(),
            space_u,
            space_p,
            space_scalar,
            bc,
            momentum,
            laplace_p,
            turbulence,
            operator_is_singular,
            ppe_preconditioner,
        })
    }

    /// Viscosity
    pub fn viscosity(&self) -> f64 {
        self.param.viscosity
    }

    /// $ dst = C(u, t) $ including the boundary data, zero for Stokes flow
    pub fn evaluate_convective_term(&self, dst: &mut DofVector, velocity: &DofVector, time: f64) {
        match &self.momentum.convective {
            Some(convective) => convective.evaluate(dst, velocity, time),
            None => dst.fill(0.),
        }
    }

    /// $ dst \mathrel{+}= (f(t), v) $
    pub fn evaluate_add_body_force_term(&self, dst: &mut DofVector, time: f64) {
        if let Some(body_force) = &self.body_force {
            body_force.evaluate_add(dst, time);
        }
    }

    /// $ dst = G p - rhs_G(t) $, pressure Dirichlet data at `time`
    pub fn evaluate_pressure_gradient_term(&self, dst: &mut DofVector, pressure: &DofVector, time: f64) {
        apply(&self.gradient, pressure, dst);
        self.gradient.boundary_add(dst, |g, x| g.value(x, time, 0));
    }

    /// $ dst \mathrel{+}= rhs_G(t) $, the boundary part of $ -\nabla p $
    pub fn rhs_pressure_gradient_term(&self, dst: &mut DofVector, time: f64) {
        self.gradient.rhs_add(dst, time);
    }

    /// $ dst = D u - rhs_D(t) $, velocity Dirichlet data at `time`
    pub fn evaluate_velocity_divergence_term(&self, dst: &mut DofVector, velocity: &DofVector, time: f64) {
        apply(&self.divergence, velocity, dst);
        self.divergence.boundary_add(dst, |g, x, c| g.value(x, time, c));
    }

    /// $ dst = M_u^{-1} src $
    pub fn apply_inverse_mass_matrix(&self, dst: &mut DofVector, src: &DofVector) {
        apply_inverse_mass(&self.space_u, src, dst);
    }

    /// $ dst = M_p^{-1} src $
    pub fn apply_inverse_pressure_mass_matrix(&self, dst: &mut DofVector, src: &DofVector) {
        apply_inverse_mass(&self.space_p, src, dst);
    }

    /// Recompute the eddy viscosity of the viscous operator, no-op for
    /// laminar flow
    ///
    /// # Errors
    /// Degenerate model evaluation.
    pub fn update_turbulence_model(&mut self, velocity: &DofVector) -> Result<()> {
        if let Some(turbulence) = &self.turbulence {
            let viscous = &mut self.momentum.viscous;
            let coefficients = viscous
                .coefficients
                .get_or_insert_with(|| VariableCoefficients::constant(&self.space_u, self.param.viscosity));
            turbulence.calculate_turbulent_viscosity(velocity, coefficients)?;
            log::debug!("eddy viscosity updated, max viscosity {:.4e}", coefficients.max());
        }
        Ok(())
    }

    /// Nodal vorticity $ \omega = \partial_x u_y - \partial_y u_x $
    pub fn compute_vorticity(&self, velocity: &DofVector) -> DofVector {
        let space = &self.space_u;
        let h = space.grid.h;
        let src = as_slice(velocity);
        let mut vorticity = self.space_scalar.zero_vector();
        cell_loop(&self.space_scalar, &mut vorticity, |cell, out| {
            let gx = cell_gradient(&space.basis, component(space, src, cell, 0), h);
            let gy = cell_gradient(&space.basis, component(space, src, cell, 1), h);
            for (q, o) in out.iter_mut().enumerate() {
                *o = gy[0][q] - gx[1][q];
            }
        });
        vorticity
    }

    /// Preconditioner of the pressure Poisson operator, built once at setup
    pub fn pressure_poisson_preconditioner(&self) -> &Preconditioner {
        &self.ppe_preconditioner
    }

    /// Shift the pressure such that its mean value vanishes
    pub fn shift_pressure_mean_to_zero(&self, pressure: &mut DofVector) {
        let mean = mean_value(&self.space_p, pressure, 0);
        pressure.mapv_inplace(|p| p - mean);
    }

    /// Solve $ L p = rhs $. A singular operator is solved in the subspace of
    /// zero mean, the right hand side is made consistent first.
    ///
    /// # Errors
    /// The pressure Poisson solver did not converge.
    pub fn solve_pressure_poisson(&self, dst: &mut DofVector, rhs: &DofVector) -> Result<usize> {
        let iterations = if self.operator_is_singular {
            let mut consistent = rhs.clone();
            project_out_constant(&mut consistent);
            let iterations = self
                .ppe_solver
                .solve(&self.laplace_p, &self.ppe_preconditioner, dst, &consistent)?;
            self.shift_pressure_mean_to_zero(dst);
            iterations
        } else {
            self.ppe_solver
                .solve(&self.laplace_p, &self.ppe_preconditioner, dst, rhs)?
        };
        log::debug!("pressure Poisson equation: {} iterations", iterations);
        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate, zero_function};
    use crate::operators::BoundaryDescriptor;

    fn approx_eq(result: f64, expected: f64) {
        let dif = (result - expected).abs();
        if dif > 1e-10 {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    fn periodic_base() -> SpatialOperatorBase {
        let grid = Arc::new(
            Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.])
                .with_periodicity(0)
                .with_periodicity(1),
        );
        let mut param = InputParameters::default();
        param.pure_dirichlet_bc = true;
        param.degree_u = 3;
        SpatialOperatorBase::new(grid, &param, FlowBoundaryDescriptor::default(), None).unwrap()
    }

    #[test]
    fn test_singular_pressure_poisson_zero_mean() {
        let base = periodic_base();
        assert!(base.operator_is_singular);
        let space_p = &base.space_p;
        // rhs with nonzero mean, only its consistent part is solved for
        let rhs = DofVector::from_shape_fn(space_p.n_dofs(), |i| 1. + ((i * 11) as f64).sin());
        let mut p = space_p.zero_vector();
        base.solve_pressure_poisson(&mut p, &rhs).unwrap();
        approx_eq(mean_value(space_p, &p, 0), 0.);

        let mut consistent = rhs.clone();
        project_out_constant(&mut consistent);
        let mut lp = space_p.zero_vector();
        apply(&base.laplace_p, &p, &mut lp);
        let err = (&lp - &consistent).iter().fold(0f64, |a, b| a.max(b.abs()));
        assert!(err < 1e-7, "residual {}", err);
    }

    #[test]
    fn test_vorticity_of_solid_body_rotation() {
        let base = periodic_base();
        let u = interpolate(
            &base.space_u,
            from_fn(2, |p, _, c| if c == 0 { -p[1] } else { p[0] }).as_ref(),
            0.,
        );
        let omega = base.compute_vorticity(&u);
        for w in omega.iter() {
            approx_eq(*w, 2.);
        }
    }

    #[test]
    fn test_gradient_term_with_pressure_data() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]));
        let mut bc = FlowBoundaryDescriptor::default();
        bc.velocity = BoundaryDescriptor::new()
            .with_dirichlet(0, zero_function(2))
            .with_neumann(1, zero_function(2));
        let pressure = from_fn(1, |p, t, _| (1. + t) * p[0]);
        bc.pressure = BoundaryDescriptor::new()
            .with_neumann(0, zero_function(1))
            .with_dirichlet(1, pressure.clone());
        let mut param = InputParameters::default();
        param.degree_u = 2;
        let base = SpatialOperatorBase::new(grid, &param, bc, None).unwrap();
        assert!(!base.operator_is_singular);

        // weak gradient of a linear pressure with consistent data is M grad p
        let t = 0.5;
        let p = interpolate(&base.space_p, pressure.as_ref(), t);
        let mut gp = base.space_u.zero_vector();
        base.evaluate_pressure_gradient_term(&mut gp, &p, t);
        let mut grad = base.space_u.zero_vector();
        base.apply_inverse_mass_matrix(&mut grad, &gp);
        let nn = base.space_u.n_cell_nodes();
        for cell in 0..4 {
            for q in 0..nn {
                approx_eq(grad[base.space_u.dof(cell, 0, q)], 1. + t);
                approx_eq(grad[base.space_u.dof(cell, 1, q)], 0.);
            }
        }

        // full gradient is the homogeneous part minus the boundary part
        let mut full = base.space_u.zero_vector();
        apply(&base.gradient, &p, &mut full);
        let mut rhs = base.space_u.zero_vector();
        base.rhs_pressure_gradient_term(&mut rhs, t);
        full -= &rhs;
        for (a, b) in full.iter().zip(gp.iter()) {
            approx_eq(*a, *b);
        }
    }
}
