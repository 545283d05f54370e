//! High-order dual splitting scheme
//!
//! 1. Convective step
//! $$
//! \frac{\gamma_0 \hat{u} - \sum_i \alpha_i u_{n-i}}{\Delta t}
//! = -\sum_i \beta_i C(u_{n-i}) + f
//! $$
//! 2. Pressure step $ -\Delta p = -\frac{\gamma_0}{\Delta t} \nabla \cdot \hat{u} $
//!    with consistent Neumann data
//! 3. Projection $ \hat{\hat{u}} = \hat{u} - \frac{\Delta t}{\gamma_0} \nabla p $
//! 4. Viscous step $ \frac{\gamma_0}{\Delta t} (u - \hat{\hat{u}}) + V u = 0 $
use super::{
    initial_convective_history, initial_history, initial_time, write_restart_if_due,
    IterationCounts,
};
use crate::error::Result;
use crate::functions::{l2_error, FunctionPtr};
use crate::incompressible::postprocessor::PostProcessor;
use crate::incompressible::spatial::{DualSplittingOperator, SpatialOperatorBase};
use crate::incompressible::IncompressibleSolver;
use crate::operators::apply;
use crate::restart::{Restart, RestartArchive, RestartHeader};
use crate::time_integration::{push_back, weighted_sum, ExtrapolationConstants, TimeIntBdfBase};
use crate::types::DofVector;
use crate::Integrate;
use std::path::Path;

const SCHEME: &str = "dual splitting";

/// BDF dual splitting integrator
pub struct TimeIntBdfDualSplitting {
    /// Time, step sizes and constants
    pub base: TimeIntBdfBase,
    /// Spatial operator
    pub op: DualSplittingOperator,
    /// Velocity history
    pub velocity: Vec<DofVector>,
    /// Pressure history
    pub pressure: Vec<DofVector>,
    /// Convective term history, empty for Stokes flow
    pub convective: Vec<DofVector>,
    /// History of the velocity Dirichlet data on the boundary
    pub velocity_dirichlet: Vec<DofVector>,
    /// History of the boundary trace of $ \nu \nabla \times \nabla \times u + (u \cdot \nabla) u $
    pub nbc: Vec<DofVector>,
    /// Velocity after the projection step
    pub intermediate_velocity: DofVector,
    /// Iterations of the last step
    pub iterations: IterationCounts,
    analytical_velocity: FunctionPtr,
    postprocessor: Option<Box<dyn PostProcessor>>,
}

impl TimeIntBdfDualSplitting {
    /// Integrator starting from the analytical solution
    ///
    /// # Errors
    /// Invalid time integration parameters.
    pub fn new(
        op: DualSplittingOperator,
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
        let velocity_dirichlet = (0..base.order)
            .map(|i| op.velocity_dirichlet_trace(initial_time(&base, i)))
            .collect();
        let nbc = velocity.iter().map(|u| op.boundary_trace(&op.nbc_field(u))).collect();
        log::info!(
            "dual splitting: BDF{}, extrapolation order of the pressure Neumann data {}",
            base.order,
            param.order_extrapolation_pressure_nbc
        );
        Ok(Self {
            intermediate_velocity: velocity[0].clone(),
            base,
            velocity,
            pressure,
            convective,
            velocity_dirichlet,
            nbc,
            iterations: IterationCounts::default(),
            analytical_velocity,
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
        self.iterations = IterationCounts::default();

        let mut velocity_extrapolated = space_u.zero_vector();
        weighted_sum(&mut velocity_extrapolated, &self.base.extra.beta, &self.velocity[..order]);

        // convective step
        let mut history = space_u.zero_vector();
        let alpha: Vec<f64> = self.base.bdf.alpha.iter().map(|a| a / dt).collect();
        weighted_sum(&mut history, &alpha, &self.velocity[..order]);
        let mut rhs = space_u.zero_vector();
        apply(&self.op.base.momentum.mass, &history, &mut rhs);
        for (beta, c) in self.base.extra.beta.iter().zip(&self.convective) {
            rhs.scaled_add(-beta, c);
        }
        self.op.base.evaluate_add_body_force_term(&mut rhs, t_next);
        let mut convected = space_u.zero_vector();
        self.op.base.apply_inverse_mass_matrix(&mut convected, &rhs);
        convected *= dt / gamma0;

        // pressure step
        let dirichlet_next = self.op.velocity_dirichlet_trace(t_next);
        let mut dgdt = dirichlet_next.mapv(|g| gamma0 * g);
        for (a, g) in self.base.bdf.alpha.iter().zip(&self.velocity_dirichlet[..order]) {
            dgdt.scaled_add(-a, g);
        }
        dgdt /= dt;
        let order_nbc = param.order_extrapolation_pressure_nbc.min(order);
        let extra_nbc = ExtrapolationConstants::new(order_nbc, &self.base.time_steps);
        let mut nbc = DofVector::zeros(self.op.n_boundary_values());
        weighted_sum(&mut nbc, &extra_nbc.beta, &self.nbc);
        let mut rhs_p = space_p.zero_vector();
        self.op
            .rhs_ppe(&mut rhs_p, &convected, gamma0 / dt, &dgdt, &nbc, t_next);
        let mut pressure = self.pressure[0].clone();
        self.iterations.pressure = self.op.base.solve_pressure_poisson(&mut pressure, &rhs_p)?;

        // projection step
        let mut projected = space_u.zero_vector();
        self.iterations.projection = self.op.apply_projection_operator(
            &mut projected,
            &convected,
            &pressure,
            &velocity_extrapolated,
            t_next,
            dt / gamma0,
            dt,
        )?;

        // viscous step
        self.op.base.update_turbulence_model(&velocity_extrapolated)?;
        let mut rhs_v = space_u.zero_vector();
        apply(&self.op.base.momentum.mass, &projected, &mut rhs_v);
        rhs_v *= gamma0 / dt;
        let mut velocity = projected.clone();
        self.iterations.viscous = self.op.solve_viscous(
            &mut velocity,
            &rhs_v,
            t_next,
            gamma0 / dt,
            param.update_preconditioner_momentum,
        )?;

        log::debug!(
            "dual splitting step {} (t = {:.6e}): {:?}",
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
        push_back(&mut self.velocity_dirichlet, &dirichlet_next);
        let nbc_new = self.op.boundary_trace(&self.op.nbc_field(&velocity));
        push_back(&mut self.nbc, &nbc_new);
        self.intermediate_velocity = projected;
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
}

impl Integrate for TimeIntBdfDualSplitting {
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

impl Restart for TimeIntBdfDualSplitting {
    fn write_restart(&self, path: &Path) -> Result<()> {
        let vectors = self
            .velocity
            .iter()
            .chain(self.pressure.iter())
            .chain(self.convective.iter())
            .chain(self.velocity_dirichlet.iter())
            .chain(self.nbc.iter())
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
        let nb = self.op.n_boundary_values();
        let groups = [
            (self.velocity.len(), nu),
            (self.pressure.len(), np),
            (self.convective.len(), nu),
            (self.velocity_dirichlet.len(), nb),
            (self.nbc.len(), nb),
        ];
        let sizes: Vec<usize> = groups
            .iter()
            .flat_map(|(count, size)| std::iter::repeat(*size).take(*count))
            .collect();
        archive.validate(&sizes)?;
        let preconditioner = archive.take_preconditioners(1)?.into_iter().next().flatten();
        archive.header.restore_base(SCHEME, &mut self.base)?;
        self.op.restore_preconditioner(preconditioner)?;
        let mut vectors = archive.vectors.into_iter();
        let mut take = |count: usize| -> Vec<DofVector> { vectors.by_ref().take(count).collect() };
        self.velocity = take(groups[0].0);
        self.pressure = take(groups[1].0);
        self.convective = take(groups[2].0);
        self.velocity_dirichlet = take(groups[3].0);
        self.nbc = take(groups[4].0);
        self.intermediate_velocity = self.velocity[0].clone();
        Ok(())
    }
}

impl IncompressibleSolver for TimeIntBdfDualSplitting {
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
