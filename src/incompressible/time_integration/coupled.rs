//! Coupled solution approach
//!
//! Velocity and pressure of the new time level are solved together,
//! $$
//! \frac{\gamma_0}{\Delta t} M u + V u [+ C(u)] + G p
//! = \frac{1}{\Delta t} M \sum_i \alpha_i u_{n-i} [- \sum_i \beta_i C(u_{n-i})] + F,
//! \quad -D u = 0
//! $$
use super::{initial_convective_history, initial_history, write_restart_if_due, IterationCounts};
use crate::error::Result;
use crate::functions::{l2_error, FunctionPtr};
use crate::incompressible::postprocessor::PostProcessor;
use crate::incompressible::spatial::coupled::{join_blocks, split_blocks};
use crate::incompressible::spatial::{CoupledOperator, SpatialOperatorBase};
use crate::incompressible::IncompressibleSolver;
use crate::operators::apply;
use crate::restart::{Restart, RestartArchive, RestartHeader};
use crate::time_integration::{push_back, weighted_sum, TimeIntBdfBase};
use crate::types::DofVector;
use crate::Integrate;
use std::path::Path;

const SCHEME: &str = "coupled";

/// BDF integrator of the monolithic system
pub struct TimeIntBdfCoupled {
    /// Time, step sizes and constants
    pub base: TimeIntBdfBase,
    /// Spatial operator
    pub op: CoupledOperator,
    /// Velocity history
    pub velocity: Vec<DofVector>,
    /// Pressure history
    pub pressure: Vec<DofVector>,
    /// Convective term history, empty unless extrapolated
    pub convective: Vec<DofVector>,
    /// Iterations of the last step
    pub iterations: IterationCounts,
    analytical_velocity: FunctionPtr,
    postprocessor: Option<Box<dyn PostProcessor>>,
}

impl TimeIntBdfCoupled {
    /// Integrator starting from the analytical solution
    ///
    /// # Errors
    /// Invalid time integration parameters.
    pub fn new(
        op: CoupledOperator,
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
            "coupled: BDF{}, {:?} convective term, {} unknowns",
            base.order,
            param.treatment_of_convective_term,
            op.base.space_u.n_dofs() + op.base.space_p.n_dofs()
        );
        Ok(Self {
            base,
            velocity,
            pressure,
            convective,
            iterations: IterationCounts::default(),
            analytical_velocity,
            postprocessor: None,
            op,
        })
    }

    /// Advance by one time step
    ///
    /// # Errors
    /// The block solver or Newton did not converge.
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
        let mut pressure_extrapolated = space_p.zero_vector();
        weighted_sum(&mut pressure_extrapolated, &self.base.extra.beta, &self.pressure[..order]);
        self.op.base.update_turbulence_model(&velocity_extrapolated)?;

        let mut history = space_u.zero_vector();
        let alpha: Vec<f64> = self.base.bdf.alpha.iter().map(|a| a / dt).collect();
        weighted_sum(&mut history, &alpha, &self.velocity[..order]);
        let mut rhs = space_u.zero_vector();
        apply(&self.op.base.momentum.mass, &history, &mut rhs);
        for (beta, c) in self.base.extra.beta.iter().zip(&self.convective) {
            rhs.scaled_add(-beta, c);
        }
        self.op.base.evaluate_add_body_force_term(&mut rhs, t_next);

        let mut x = join_blocks(&velocity_extrapolated, &pressure_extrapolated);
        if param.convective_problem() {
            let (newton, linear) = self
                .op
                .solve_nonlinear_problem(&mut x, &rhs, t_next, gamma0 / dt)?;
            self.iterations.newton = newton;
            self.iterations.momentum = linear;
        } else {
            self.iterations.momentum = self.op.solve_linear_stokes_problem(
                &mut x,
                &rhs,
                t_next,
                gamma0 / dt,
                param.update_preconditioner_momentum,
            )?;
        }
        let (velocity, pressure) = split_blocks(&x, self.op.n_velocity());

        log::debug!(
            "coupled step {} (t = {:.6e}): {:?}",
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
        if let Some(postprocessor) = &mut self.postprocessor {
            postprocessor.do_postprocessing(
                &self.velocity[0],
                &self.velocity[0],
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

impl Integrate for TimeIntBdfCoupled {
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

impl Restart for TimeIntBdfCoupled {
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
        Ok(())
    }
}

impl IncompressibleSolver for TimeIntBdfCoupled {
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
