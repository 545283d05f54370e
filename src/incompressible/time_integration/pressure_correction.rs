//! Incremental pressure correction scheme
//!
//! 1. Momentum step with the extrapolated pressure $ p^* $,
//! $$
//! \frac{\gamma_0 \hat{u} - \sum_i \alpha_i u_{n-i}}{\Delta t}
//! + C + V \hat{u} = -\nabla p^* + f
//! $$
//! 2. Pressure increment $ -\Delta \phi = -\frac{\gamma_0}{\Delta t} \nabla \cdot \hat{u} $
//! 3. Pressure update $ p = p^* + \phi \\, [- \nu \nabla \cdot \hat{u}] $
//! 4. Projection $ u = \hat{u} - \frac{\Delta t}{\gamma_0} \nabla \phi $
use super::{
    initial_convective_history, initial_history, write_restart_if_due, IterationCounts,
};
use crate::error::Result;
use crate::functions::{l2_error, FunctionPtr};
use crate::incompressible::postprocessor::PostProcessor;
use crate::incompressible::spatial::pressure_correction::PressureIncrementData;
use crate::incompressible::spatial::{PressureCorrectionOperator, SpatialOperatorBase};
use crate::incompressible::IncompressibleSolver;
use crate::operators::apply;
use crate::restart::{Restart, RestartArchive, RestartHeader};
use crate::time_integration::{push_back, weighted_sum, ExtrapolationConstants, TimeIntBdfBase};
use crate::types::DofVector;
use crate::Integrate;
use std::path::Path;

const SCHEME: &str = "pressure correction";

/// BDF pressure correction integrator
pub struct TimeIntBdfPressureCorrection {
    /// Time, step sizes and constants
    pub base: TimeIntBdfBase,
    /// Spatial operator
    pub op: PressureCorrectionOperator,
    /// Velocity history
    pub velocity: Vec<DofVector>,
    /// Pressure history
    pub pressure: Vec<DofVector>,
    /// Convective term history, empty unless extrapolated
    pub convective: Vec<DofVector>,
    /// Velocity of the momentum step
    pub intermediate_velocity: DofVector,
    /// Iterations of the last step
    pub iterations: IterationCounts,
    analytical_velocity: FunctionPtr,
    analytical_pressure: FunctionPtr,
    postprocessor: Option<Box<dyn PostProcessor>>,
}

impl TimeIntBdfPressureCorrection {
    /// Integrator starting from the analytical solution
    ///
    /// # Errors
    /// Invalid time integration parameters.
    pub fn new(
        op: PressureCorrectionOperator,
        analytical_velocity: FunctionPtr,
        analytical_pressure: FunctionPtr,
    ) -> Result<Self> {
        let param = &op.base.param;
        let base = TimeIntBdfBase::new(
            param.order_time_integrator,
            param.start_with_low_order,
            param.start_time,
            param.end_time,
            param.time_step_size,
        )?;
        let velocity = initial_history(&op.base.space_u, &analytical_velocity, &base);
        let pressure = initial_history(&op.base.space_p, &analytical_pressure, &base);
        let convective = initial_convective_history(&op.base, &velocity, &base);
        log::info!(
            "pressure correction: BDF{}, pressure extrapolation order {}, rotational form: {}",
            base.order,
            param.order_pressure_extrapolation,
            param.rotational_formulation
        );
        Ok(Self {
            intermediate_velocity: velocity[0].clone(),
            base,
            velocity,
            pressure,
            convective,
            iterations: IterationCounts::default(),
            analytical_velocity,
            analytical_pressure,
            postprocessor: None,
            op,
        })
    }

    /// Advance by one time step
    ///
    /// # Errors
    /// One of the sub-step solvers failed.
    pub fn do_timestep(&mut self) -> Result<()> {
        let order = self.base.current_order();
        let dt = self.base.get_time_step_size();
        let t_next = self.base.get_next_time();
        let gamma0 = self.base.bdf.gamma0;
        let param = self.op.base.param.clone();
        let space_u = self.op.base.space_u.clone();
        let space_p = self.op.base.space_p.clone();

        let mut velocity_extrapolated = space_u.zero_vector();
        weighted_sum(&mut velocity_extrapolated, &self.base.extra.beta, &self.velocity[..order]);
        self.op.base.update_turbulence_model(&velocity_extrapolated)?;

        // momentum step
        let mut history = space_u.zero_vector();
        let alpha: Vec<f64> = self.base.bdf.alpha.iter().map(|a| a / dt).collect();
        weighted_sum(&mut history, &alpha, &self.velocity[..order]);
        let mut rhs = space_u.zero_vector();
        apply(&self.op.base.momentum.mass, &history, &mut rhs);
        for (beta, c) in self.base.extra.beta.iter().zip(&self.convective) {
            rhs.scaled_add(-beta, c);
        }
        let order_pressure = param.order_pressure_extrapolation.min(order);
        let extra_pressure = ExtrapolationConstants::new(order_pressure, &self.base.time_steps);
        let mut pressure_extrapolated = space_p.zero_vector();
        weighted_sum(&mut pressure_extrapolated, &extra_pressure.beta, &self.pressure);
        if order_pressure > 0 {
            let mut gp = space_u.zero_vector();
            apply(&self.op.base.gradient, &pressure_extrapolated, &mut gp);
            rhs -= &gp;
            self.op.base.rhs_pressure_gradient_term(&mut rhs, t_next);
        }
        self.op.base.evaluate_add_body_force_term(&mut rhs, t_next);

        let mut intermediate = velocity_extrapolated.clone();
        self.iterations = IterationCounts::default();
        if param.convective_problem() {
            let (newton, linear) =
                self.op
                    .solve_nonlinear_momentum_equation(&mut intermediate, &rhs, t_next, gamma0 / dt)?;
            self.iterations.newton = newton;
            self.iterations.momentum = linear;
        } else {
            self.iterations.momentum = self.op.solve_linear_momentum_equation(
                &mut intermediate,
                &rhs,
                t_next,
                gamma0 / dt,
                param.update_preconditioner_momentum,
            )?;
        }

        // pressure increment
        let data = PressureIncrementData {
            time: t_next,
            previous_times: (0..order_pressure).map(|i| self.base.get_previous_time(i)).collect(),
            beta: extra_pressure.beta.clone(),
        };
        let mut rhs_p = space_p.zero_vector();
        self.op
            .rhs_pressure_increment(&mut rhs_p, &intermediate, gamma0 / dt, &data);
        let mut increment = space_p.zero_vector();
        self.iterations.pressure = self.op.base.solve_pressure_poisson(&mut increment, &rhs_p)?;

        // pressure update
        let mut pressure = &pressure_extrapolated + &increment;
        if param.rotational_formulation {
            let mut correction = space_p.zero_vector();
            self.op
                .rotational_correction(&mut correction, &intermediate, t_next);
            pressure += &correction;
        }
        if self.op.base.operator_is_singular {
            self.op.base.shift_pressure_mean_to_zero(&mut pressure);
        }

        // projection
        let mut increment_gradient = space_u.zero_vector();
        self.op
            .evaluate_increment_gradient(&mut increment_gradient, &increment, &data);
        let mut velocity = space_u.zero_vector();
        self.iterations.projection = self.op.apply_projection_operator(
            &mut velocity,
            &intermediate,
            &increment_gradient,
            &velocity_extrapolated,
            dt / gamma0,
            dt,
        )?;

        log::debug!(
            "pressure correction step {} (t = {:.6e}): {:?}",
            self.base.time_step_number,
            t_next,
            self.iterations
        );

        push_back(&mut self.velocity, &velocity);
        push_back(&mut self.pressure, &pressure);
        if !self.convective.is_empty() {
            let mut c = space_u.zero_vector();
            self.op.base.evaluate_convective_term(&mut c, &velocity, t_next);
            push_back(&mut self.convective, &c);
        }
        self.intermediate_velocity = intermediate;
        if let Some(postprocessor) = &mut self.postprocessor {
            postprocessor.do_postprocessing(
                &self.velocity[0],
                &self.intermediate_velocity,
                &self.pressure[0],
                t_next,
                self.base.time_step_number,
            );
        }
        self.base.do_timestep_post();
        Ok(())
    }

    /// Relative L2 error of the velocity at the current time
    pub fn calculate_error_velocity(&self) -> f64 {
        let (err, norm) = l2_error(
            &self.op.base.space_u,
            &self.velocity[0],
            self.analytical_velocity.as_ref(),
            self.base.time,
        );
        if norm > 1e-12 {
            err / norm
        } else {
            err
        }
    }

    /// Analytical pressure, the initial condition
    pub fn analytical_pressure(&self) -> &FunctionPtr {
        &self.analytical_pressure
    }
}

impl Integrate for TimeIntBdfPressureCorrection {
    fn update(&mut self) -> Result<()> {
        self.do_timestep()?;
        write_restart_if_due(&*self, &self.op.base, &self.base)
    }

    fn get_time(&self) -> f64 {
        self.base.time
    }

    fn get_dt(&self) -> f64 {
        self.base.get_time_step_size()
    }

    fn callback(&mut self) {
        log::info!(
            "time = {:.4e}, velocity error = {:.4e}",
            self.base.time,
            self.calculate_error_velocity()
        );
    }

    fn exit(&mut self) -> bool {
        self.base.finished()
    }
}

impl Restart for TimeIntBdfPressureCorrection {
    fn write_restart(&self, path: &Path) -> Result<()> {
        let vectors = self
            .velocity
            .iter()
            .chain(self.pressure.iter())
            .chain(self.convective.iter())
            .cloned()
            .collect();
        RestartArchive::new(RestartHeader::from_base(SCHEME, &self.base), vectors)
            .with_preconditioners(vec![self.op.preconditioner_snapshot()])
            .write(path)
    }

    fn read_restart(&mut self, path: &Path) -> Result<()> {
        let mut archive = RestartArchive::read(path)?;
        let nu = self.op.base.space_u.n_dofs();
        let np = self.op.base.space_p.n_dofs();
        let (n_u, n_p, n_c) = (self.velocity.len(), self.pressure.len(), self.convective.len());
        let sizes: Vec<usize> = std::iter::repeat(nu)
            .take(n_u)
            .chain(std::iter::repeat(np).take(n_p))
            .chain(std::iter::repeat(nu).take(n_c))
            .collect();
        archive.validate(&sizes)?;
        let preconditioner = archive.take_preconditioners(1)?.into_iter().next().flatten();
        archive.header.restore_base(SCHEME, &mut self.base)?;
        self.op.restore_preconditioner(preconditioner)?;
        let vectors = archive.vectors;
        self.velocity = vectors[..n_u].to_vec();
        self.pressure = vectors[n_u..n_u + n_p].to_vec();
        self.convective = vectors[n_u + n_p..].to_vec();
        self.intermediate_velocity = self.velocity[0].clone();
        Ok(())
    }
}

impl IncompressibleSolver for TimeIntBdfPressureCorrection {
    fn get_velocity(&self) -> &DofVector {
        &self.velocity[0]
    }

    fn get_pressure(&self) -> &DofVector {
        &self.pressure[0]
    }

    fn time_integrator(&self) -> &TimeIntBdfBase {
        &self.base
    }

    fn spatial(&self) -> &SpatialOperatorBase {
        &self.op.base
    }

    fn set_postprocessor(&mut self, postprocessor: Box<dyn PostProcessor>) {
        self.postprocessor = Some(postprocessor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use crate::incompressible::{EquationType, FlowBoundaryDescriptor, InputParameters, TemporalDiscretization};
    use crate::operators::BoundaryDescriptor;
    use std::sync::Arc;

    /// Unsteady Stokes flow that is linear in space and time,
    /// u = (1 + t) (y, -x) / 10 with p = 0 is reproduced up to solver tolerance
    #[test]
    fn test_linear_stokes_flow_is_exact() {
        let velocity = from_fn(2, |p, t, c| if c == 0 { 0.1 * (1. + t) * p[1] } else { -0.1 * (1. + t) * p[0] });
        let pressure = from_fn(1, |_, _, _| 0.);
        // du/dt = (y, -x) / 10 balanced by the body force
        let force = from_fn(2, |p, _, c| if c == 0 { 0.1 * p[1] } else { -0.1 * p[0] });
        let grid = Arc::new(Grid::hyper_cube(1, 0., 1.));
        let mut bc = FlowBoundaryDescriptor::default();
        bc.velocity = BoundaryDescriptor::new().with_dirichlet(0, velocity.clone());
        bc.pressure = BoundaryDescriptor::new().with_neumann(0, from_fn(1, |_, _, _| 0.));

        let mut param = InputParameters::default();
        param.equation_type = EquationType::Stokes;
        param.temporal_discretization = TemporalDiscretization::BdfPressureCorrection;
        param.degree_u = 2;
        param.pure_dirichlet_bc = true;
        param.start_with_low_order = false;
        param.time_step_size = 0.1;
        param.end_time = 0.3;
        param.solver_data_momentum.rel_tol = 1e-12;

        let base = SpatialOperatorBase::new(grid, &param, bc, Some(force)).unwrap();
        let op = PressureCorrectionOperator::new(base);
        let mut solver = TimeIntBdfPressureCorrection::new(op, velocity.clone(), pressure).unwrap();
        crate::integrate(&mut solver, 0.3, None).unwrap();
        assert!((solver.get_time() - 0.3).abs() < 1e-12);
        let exact = interpolate(&solver.op.base.space_u, velocity.as_ref(), 0.3);
        let err = (&exact - solver.get_velocity()).iter().fold(0f64, |a, b| a.max(b.abs()));
        assert!(err < 1e-8, "velocity error {}", err);
        assert!(solver.iterations.momentum > 0);
    }
}
