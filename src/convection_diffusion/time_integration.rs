//! BDF time integration of the scalar convection-diffusion equation
//!
//! $$
//! \frac{\gamma_0 c_{n+1} - \sum_i \alpha_i c_{n-i}}{\Delta t}
//! + \sum_i \beta_i C(c_{n-i}) + K c_{n+1} = f(t_{n+1})
//! $$
//! for an explicit convective term, or with $ C(c_{n+1}) $ inside the
//! implicit system otherwise.
use super::{ConvDiffOperator, ConvDiffParameters};
use crate::error::{DgError, Result};
use crate::functions::{interpolate, l2_error, FunctionPtr};
use crate::operators::{apply, apply_inverse_mass};
use crate::restart::{Restart, RestartArchive, RestartHeader};
use crate::solvers::{LinearSolver, Preconditioner, PreconditionerSnapshot, Solve};
use crate::time_integration::{push_back, weighted_sum, TimeIntBdfBase, TreatmentOfConvectiveTerm};
use crate::types::DofVector;
use crate::Integrate;
use std::path::Path;

const SCHEME: &str = "convection-diffusion";

/// BDF integrator of one scalar
pub struct TimeIntBdfConvDiff {
    /// Time, step sizes and constants
    pub base: TimeIntBdfBase,
    /// Parameters
    pub param: ConvDiffParameters,
    /// Spatial operator
    pub op: ConvDiffOperator,
    /// Solution history, `[0]` at $ t_n $
    pub solution: Vec<DofVector>,
    /// Convective term history, empty for an implicit convective term
    pub convective: Vec<DofVector>,
    /// Analytical solution, also the initial condition
    pub analytical_solution: FunctionPtr,
    solver: LinearSolver,
    preconditioner: Option<Preconditioner>,
    /// Linear iterations of the last step
    pub iterations: usize,
}

impl TimeIntBdfConvDiff {
    /// Integrator starting from `analytical_solution` at `param.start_time`
    ///
    /// # Errors
    /// Invalid parameters.
    pub fn new(
        param: ConvDiffParameters,
        op: ConvDiffOperator,
        analytical_solution: FunctionPtr,
    ) -> Result<Self> {
        param.check()?;
        let base = TimeIntBdfBase::new(
            param.order_time_integrator,
            param.start_with_low_order,
            param.start_time,
            param.end_time,
            param.time_step_size,
        )?;
        let solver = LinearSolver::new(param.solver, param.solver_data);
        let mut integrator = Self {
            base,
            param,
            op,
            solution: Vec::new(),
            convective: Vec::new(),
            analytical_solution,
            solver,
            preconditioner: None,
            iterations: 0,
        };
        integrator.initialize_solution();
        log::info!(
            "convection-diffusion: {} dofs, BDF{}, {:?} convective term",
            integrator.op.space.n_dofs(),
            integrator.base.order,
            integrator.param.treatment_of_convective_term
        );
        Ok(integrator)
    }

    fn initialize_solution(&mut self) {
        let order = self.base.order;
        let space = &self.op.space;
        self.solution = (0..order)
            .map(|i| {
                let t = if self.base.start_with_low_order {
                    self.base.time
                } else {
                    self.base.get_previous_time(i)
                };
                interpolate(space, self.analytical_solution.as_ref(), t)
            })
            .collect();
        self.convective.clear();
        if self.param.treatment_of_convective_term == TreatmentOfConvectiveTerm::Explicit {
            for (i, c) in self.solution.iter().enumerate() {
                let t = if self.base.start_with_low_order {
                    self.base.time
                } else {
                    self.base.get_previous_time(i)
                };
                let mut conv = space.zero_vector();
                self.op.evaluate_convective_term(&mut conv, c, t);
                self.convective.push(conv);
            }
        }
    }

    /// Advance by one time step
    ///
    /// # Errors
    /// The linear solver did not converge.
    pub fn do_timestep(&mut self) -> Result<()> {
        let space = &self.op.space;
        let treatment = self.param.treatment_of_convective_term;
        let order = self.base.current_order();
        let dt = self.base.get_time_step_size();
        let t_next = self.base.get_next_time();
        let gamma0 = self.base.bdf.gamma0;

        let mut history = space.zero_vector();
        let alpha: Vec<f64> = self.base.bdf.alpha.iter().map(|a| a / dt).collect();
        weighted_sum(&mut history, &alpha, &self.solution[..order]);
        let mut rhs = space.zero_vector();
        apply(&self.op.mass, &history, &mut rhs);
        if treatment == TreatmentOfConvectiveTerm::Explicit {
            for (beta, conv) in self.base.extra.beta.iter().zip(&self.convective) {
                rhs.scaled_add(-beta, conv);
            }
        }
        self.op.rhs_add(&mut rhs, t_next, treatment);

        let mut new = space.zero_vector();
        if self.op.is_mass_only(treatment) {
            apply_inverse_mass(space, &rhs, &mut new);
            new *= dt / gamma0;
            self.iterations = 0;
        } else {
            weighted_sum(&mut new, &self.base.extra.beta, &self.solution[..order]);
            let system = self.op.system(gamma0 / dt, t_next, treatment);
            if self.param.update_preconditioner || self.preconditioner.is_none() {
                self.preconditioner = Some(Preconditioner::from_kernel(self.param.preconditioner, &system)?);
            }
            let prec = self.preconditioner.as_ref().ok_or_else(|| {
                DgError::config("preconditioner of the convection-diffusion system missing")
            })?;
            self.iterations = self.solver.solve(&system, prec, &mut new, &rhs)?;
        }
        log::debug!(
            "convection-diffusion step {} (t = {:.6e}): {} linear iterations",
            self.base.time_step_number,
            t_next,
            self.iterations
        );

        push_back(&mut self.solution, &new);
        if treatment == TreatmentOfConvectiveTerm::Explicit {
            let mut conv = space.zero_vector();
            self.op.evaluate_convective_term(&mut conv, &new, t_next);
            push_back(&mut self.convective, &conv);
        }
        self.base.do_timestep_post();
        Ok(())
    }

    /// Solution at the current time
    pub fn get_solution(&self) -> &DofVector {
        &self.solution[0]
    }

    /// Relative L2 error against the analytical solution at the current
    /// time (absolute if the exact solution vanishes)
    pub fn calculate_error(&self) -> f64 {
        let (err, norm) = l2_error(
            &self.op.space,
            self.get_solution(),
            self.analytical_solution.as_ref(),
            self.base.time,
        );
        if norm > 1e-12 {
            err / norm
        } else {
            err
        }
    }
}

impl Integrate for TimeIntBdfConvDiff {
    fn update(&mut self) -> Result<()> {
        self.do_timestep()
    }

    fn get_time(&self) -> f64 {
        self.base.time
    }

    fn get_dt(&self) -> f64 {
        self.base.get_time_step_size()
    }

    fn callback(&mut self) {
        log::info!(
            "time = {:.4e}, relative error = {:.4e}",
            self.base.time,
            self.calculate_error()
        );
    }

    fn exit(&mut self) -> bool {
        self.base.finished()
    }
}

impl Restart for TimeIntBdfConvDiff {
    fn write_restart(&self, path: &Path) -> Result<()> {
        let vectors = self
            .solution
            .iter()
            .chain(self.convective.iter())
            .cloned()
            .collect();
        RestartArchive::new(RestartHeader::from_base(SCHEME, &self.base), vectors)
            .with_preconditioners(vec![self.preconditioner.as_ref().map(Preconditioner::snapshot)])
            .write(path)
    }

    fn read_restart(&mut self, path: &Path) -> Result<()> {
        let mut archive = RestartArchive::read(path)?;
        let n = self.op.space.n_dofs();
        let sizes = vec![n; self.solution.len() + self.convective.len()];
        archive.validate(&sizes)?;
        let preconditioner = archive.take_preconditioners(1)?.into_iter().next().flatten();
        if let Some(stored) = preconditioner.as_ref().map(PreconditionerSnapshot::kind) {
            if stored != self.param.preconditioner {
                return Err(DgError::Config(format!(
                    "restart archive holds a {:?} preconditioner, configured is {:?}",
                    stored, self.param.preconditioner
                )));
            }
        }
        archive.header.restore_base(SCHEME, &mut self.base)?;
        self.preconditioner = preconditioner
            .map(|s| Preconditioner::from_snapshot(s, &self.op.space))
            .transpose()?;
        let (solution, convective) = archive.vectors.split_at(self.solution.len());
        self.solution = solution.to_vec();
        self.convective = convective.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fe::DgSpace;
    use crate::functions::from_fn;
    use crate::grid::Grid;
    use crate::operators::BoundaryDescriptor;
    use crate::solvers::{PreconditionerType, SolverType};
    use std::f64::consts::PI;
    use std::sync::Arc;

    #[test]
    fn test_heat_equation_decay() {
        // c = exp(-2 pi^2 k t) sin(pi x) sin(pi y), homogeneous Dirichlet data
        let kappa = 0.05;
        let exact = from_fn(1, move |p, t, _| {
            (-2. * PI * PI * kappa * t).exp() * (PI * p[0]).sin() * (PI * p[1]).sin()
        });
        let mut param = ConvDiffParameters::default();
        param.diffusivity = kappa;
        param.degree = 4;
        param.end_time = 0.1;
        param.time_step_size = 0.005;
        param.order_time_integrator = 2;
        param.start_with_low_order = false;
        param.treatment_of_convective_term = TreatmentOfConvectiveTerm::Implicit;
        param.solver = SolverType::GMRES;
        param.preconditioner = PreconditionerType::BlockJacobi;
        param.update_preconditioner = false;
        param.solver_data.rel_tol = 1e-12;

        let grid = Arc::new(Grid::hyper_cube(2, 0., 1.));
        let space = DgSpace::new(grid, param.degree, 1);
        let bc = BoundaryDescriptor::new().with_dirichlet(0, from_fn(1, |_, _, _| 0.));
        let op = ConvDiffOperator::new(&space, &param, bc, None, None).unwrap();
        let mut solver = TimeIntBdfConvDiff::new(param, op, exact).unwrap();
        crate::integrate(&mut solver, 0.1, None).unwrap();
        assert!((solver.get_time() - 0.1).abs() < 1e-12);
        let err = solver.calculate_error();
        assert!(err < 1e-3, "relative error {}", err);
        assert!(solver.iterations > 0);
    }

    #[test]
    fn test_explicit_pure_transport_uses_inverse_mass() {
        let mut param = ConvDiffParameters::default();
        param.degree = 2;
        param.time_step_size = 1e-3;
        let grid = Arc::new(Grid::hyper_cube(1, -1., 1.));
        let space = DgSpace::new(grid, param.degree, 1);
        let one = from_fn(1, |_, _, _| 1.);
        let bc = BoundaryDescriptor::new().with_dirichlet(0, one.clone());
        let velocity = from_fn(2, |p, _, c| if c == 0 { -p[1] } else { p[0] });
        let op = ConvDiffOperator::new(&space, &param, bc, Some(velocity), None).unwrap();
        let mut solver = TimeIntBdfConvDiff::new(param, op, one).unwrap();
        for _ in 0..3 {
            solver.do_timestep().unwrap();
        }
        assert_eq!(solver.iterations, 0);
        // constants are transported exactly by a divergence-free field
        assert!(solver.calculate_error() < 1e-12);
    }
}
