//! Monolithic velocity-pressure system
//!
//! $$
//! \begin{pmatrix} A & G \\\\ -D & 0 \end{pmatrix}
//! \begin{pmatrix} u \\\\ p \end{pmatrix}
//! = \begin{pmatrix} rhs_u \\\\ rhs_p \end{pmatrix},
//! \quad A = \sigma M + V [+ C'(u^*)]
//! $$
//!
//! solved with FGMRES and the block triangular preconditioner
//! $$
//! P^{-1} = \begin{pmatrix} A & G \\\\ 0 & S \end{pmatrix}^{-1},
//! \quad S^{-1} \approx -(\sigma L_p^{-1} + \nu M_p^{-1})
//! $$
//! where $ L_p^{-1} $ is approximated by a few CG iterations and
//! $ A^{-1} $ by an inner GMRES solve with loose tolerance.
use super::{MomentumOperator, MomentumPreconditioner, OperatorContext, SpatialOperatorBase};
use crate::error::Result;
use crate::operators::{apply, apply_inverse_mass, RhsAssembler};
use crate::solvers::{
    project_out_constant, LinearOperator, LinearSolver, NewtonSolver, NonlinearResidualProvider,
    Precondition, Preconditioner, PreconditionerSnapshot, SolverData, SolverType, Solve,
};
use crate::types::DofVector;
use ndarray::s;

/// Block vector $ [u; p] $ from its parts
pub fn join_blocks(velocity: &DofVector, pressure: &DofVector) -> DofVector {
    let nu = velocity.len();
    let mut x = DofVector::zeros(nu + pressure.len());
    x.slice_mut(s![..nu]).assign(velocity);
    x.slice_mut(s![nu..]).assign(pressure);
    x
}

/// Velocity and pressure part of a block vector
pub fn split_blocks(x: &DofVector, n_velocity: usize) -> (DofVector, DofVector) {
    (x.slice(s![..n_velocity]).to_owned(), x.slice(s![n_velocity..]).to_owned())
}

/// Block operator bound to one context
pub struct CoupledSystem<'a> {
    base: &'a SpatialOperatorBase,
    momentum: MomentumOperator<'a>,
}

impl<'a> CoupledSystem<'a> {
    /// Block operator with momentum block `momentum`
    pub fn new(base: &'a SpatialOperatorBase, momentum: MomentumOperator<'a>) -> Self {
        Self { base, momentum }
    }
}

impl LinearOperator for CoupledSystem<'_> {
    fn size(&self) -> usize {
        self.base.space_u.n_dofs() + self.base.space_p.n_dofs()
    }

    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        let nu = self.base.space_u.n_dofs();
        let (u, p) = split_blocks(src, nu);
        let mut du = self.base.space_u.zero_vector();
        let mut tmp = self.base.space_u.zero_vector();
        apply(&self.momentum, &u, &mut du);
        apply(&self.base.gradient, &p, &mut tmp);
        du += &tmp;
        let mut dp = self.base.space_p.zero_vector();
        apply(&self.base.divergence, &u, &mut dp);
        dp *= -1.;
        dst.slice_mut(s![..nu]).assign(&du);
        dst.slice_mut(s![nu..]).assign(&dp);
    }
}

/// Block triangular preconditioner of the coupled system
pub struct BlockPreconditioner<'a> {
    base: &'a SpatialOperatorBase,
    momentum: &'a MomentumOperator<'a>,
    velocity_preconditioner: &'a Preconditioner,
    scaling_factor: f64,
    velocity_solver: LinearSolver,
    laplace_solver: LinearSolver,
}

impl<'a> BlockPreconditioner<'a> {
    /// Preconditioner for the momentum block `momentum`
    pub fn new(
        base: &'a SpatialOperatorBase,
        momentum: &'a MomentumOperator<'a>,
        velocity_preconditioner: &'a Preconditioner,
        scaling_factor: f64,
    ) -> Self {
        let param = &base.param;
        let velocity_data = SolverData::new(
            param.solver_data_momentum.max_iter,
            param.solver_data_momentum.abs_tol,
            param.velocity_block_rel_tol,
        );
        let laplace_data = SolverData::new(param.schur_complement_cg_iterations, 1e-14, 1e-12);
        Self {
            base,
            momentum,
            velocity_preconditioner,
            scaling_factor,
            velocity_solver: LinearSolver::new(SolverType::GMRES, velocity_data),
            laplace_solver: LinearSolver::new(SolverType::CG, laplace_data),
        }
    }

    /// $ dst = S^{-1} src $
    fn schur_complement(&self, dst: &mut DofVector, src: &DofVector) {
        let base = self.base;
        let mut rhs = src.clone();
        if base.operator_is_singular {
            project_out_constant(&mut rhs);
        }
        let mut laplace_inv = base.space_p.zero_vector();
        // a fixed number of sweeps, hitting the cap is expected
        if let Err(err) = self.laplace_solver.solve(
            &base.laplace_p,
            base.pressure_poisson_preconditioner(),
            &mut laplace_inv,
            &rhs,
        ) {
            log::trace!("Schur complement: {}", err);
        }
        apply_inverse_mass(&base.space_p, src, dst);
        *dst *= base.viscosity();
        dst.scaled_add(self.scaling_factor, &laplace_inv);
        *dst *= -1.;
    }
}

impl Precondition for BlockPreconditioner<'_> {
    fn vmult(&self, dst: &mut DofVector, src: &DofVector) {
        let base = self.base;
        let nu = base.space_u.n_dofs();
        let (r_u, r_p) = split_blocks(src, nu);

        let mut p = base.space_p.zero_vector();
        self.schur_complement(&mut p, &r_p);

        let mut rhs_u = base.space_u.zero_vector();
        apply(&base.gradient, &p, &mut rhs_u);
        rhs_u *= -1.;
        rhs_u += &r_u;
        let mut u = base.space_u.zero_vector();
        self.velocity_preconditioner.vmult(&mut u, &rhs_u);
        if let Err(err) = self
            .velocity_solver
            .solve(self.momentum, self.velocity_preconditioner, &mut u, &rhs_u)
        {
            log::trace!("velocity block: {}", err);
        }
        dst.slice_mut(s![..nu]).assign(&u);
        dst.slice_mut(s![nu..]).assign(&p);
    }
}

/// Coupled operator: base operators plus block solvers
pub struct CoupledOperator {
    /// Shared operators
    pub base: SpatialOperatorBase,
    solver: LinearSolver,
    velocity_preconditioner: MomentumPreconditioner,
    newton: NewtonSolver,
}

impl CoupledOperator {
    /// Operator configured by `base.param`
    pub fn new(base: SpatialOperatorBase) -> Self {
        let param = &base.param;
        let mut newton = NewtonSolver::new(param.newton_solver_data_coupled);
        newton.update_preconditioner = param.update_preconditioner_momentum;
        newton.update_preconditioner_every_newton_iter =
            param.update_preconditioner_momentum_every_newton_iter;
        Self {
            solver: LinearSolver::new(param.solver_coupled, param.solver_data_coupled),
            velocity_preconditioner: MomentumPreconditioner::new(param.preconditioner_velocity_block),
            newton,
            base,
        }
    }

    /// Number of velocity dofs, the offset of the pressure block
    pub fn n_velocity(&self) -> usize {
        self.base.space_u.n_dofs()
    }

    /// Cached velocity block preconditioner, stored in restart archives
    pub fn preconditioner_snapshot(&self) -> Option<PreconditionerSnapshot> {
        self.velocity_preconditioner.snapshot()
    }

    /// Reinstall the velocity block preconditioner of a restart archive
    ///
    /// # Errors
    /// Type or size of the snapshot do not match.
    pub fn restore_preconditioner(&mut self, snapshot: Option<PreconditionerSnapshot>) -> Result<()> {
        self.velocity_preconditioner.restore(snapshot, &self.base.space_u)
    }

    /// Add the boundary data at `time` of viscous term, pressure gradient
    /// and divergence to the block right hand side
    pub fn rhs_add(&self, rhs: &mut DofVector, time: f64) {
        let base = &self.base;
        let nu = self.n_velocity();
        let mut rhs_u = base.space_u.zero_vector();
        base.momentum.rhs_add(&mut rhs_u, time);
        base.rhs_pressure_gradient_term(&mut rhs_u, time);
        let mut rhs_p = base.space_p.zero_vector();
        base.divergence.rhs_add(&mut rhs_p, time);
        rhs_p *= -1.;
        let mut head = rhs.slice_mut(s![..nu]);
        head += &rhs_u;
        let mut tail = rhs.slice_mut(s![nu..]);
        tail += &rhs_p;
    }

    /// Solve the linear block system with `x` as initial guess.
    /// `rhs_momentum` holds the momentum right hand side without boundary
    /// data. Returns the number of FGMRES iterations.
    ///
    /// # Errors
    /// FGMRES did not converge.
    pub fn solve_linear_stokes_problem(
        &mut self,
        x: &mut DofVector,
        rhs_momentum: &DofVector,
        time: f64,
        scaling_factor: f64,
        update_preconditioner: bool,
    ) -> Result<usize> {
        let base = &self.base;
        let mut rhs = join_blocks(rhs_momentum, &base.space_p.zero_vector());
        self.rhs_add(&mut rhs, time);
        let ctx = OperatorContext::new(time, scaling_factor);
        let momentum = base.momentum.with_context(&ctx)?;
        let velocity_preconditioner = self.velocity_preconditioner.get(&momentum, update_preconditioner)?;
        let system = CoupledSystem::new(base, base.momentum.with_context(&ctx)?);
        let preconditioner = BlockPreconditioner::new(base, &momentum, velocity_preconditioner, scaling_factor);
        let iterations = self.solver.solve(&system, &preconditioner, x, &rhs)?;
        self.finalize_pressure(x);
        log::debug!("coupled system: {} iterations", iterations);
        Ok(iterations)
    }

    /// Solve the nonlinear block system with Newton, returns
    /// `(newton_iterations, linear_iterations)`
    ///
    /// # Errors
    /// Newton or FGMRES did not converge.
    pub fn solve_nonlinear_problem(
        &mut self,
        x: &mut DofVector,
        rhs_momentum: &DofVector,
        time: f64,
        scaling_factor: f64,
    ) -> Result<(usize, usize)> {
        let mut rhs = join_blocks(rhs_momentum, &self.base.space_p.zero_vector());
        self.rhs_add(&mut rhs, time);
        let mut problem = CoupledNewtonProblem {
            base: &self.base,
            rhs: &rhs,
            time,
            scaling_factor,
            solver: &self.solver,
            velocity_preconditioner: &mut self.velocity_preconditioner,
        };
        let iterations = self.newton.solve(&mut problem, x)?;
        self.finalize_pressure(x);
        log::debug!(
            "nonlinear coupled system: {} Newton iterations, {} linear iterations",
            iterations.0,
            iterations.1
        );
        Ok(iterations)
    }

    fn finalize_pressure(&self, x: &mut DofVector) {
        if self.base.operator_is_singular {
            let nu = self.n_velocity();
            let (_, mut p) = split_blocks(x, nu);
            self.base.shift_pressure_mean_to_zero(&mut p);
            x.slice_mut(s![nu..]).assign(&p);
        }
    }
}

/// Coupled system with implicit convective term
struct CoupledNewtonProblem<'a> {
    base: &'a SpatialOperatorBase,
    rhs: &'a DofVector,
    time: f64,
    scaling_factor: f64,
    solver: &'a LinearSolver,
    velocity_preconditioner: &'a mut MomentumPreconditioner,
}

impl NonlinearResidualProvider for CoupledNewtonProblem<'_> {
    fn evaluate_residual(&mut self, dst: &mut DofVector, x: &DofVector) -> Result<()> {
        let base = self.base;
        let nu = base.space_u.n_dofs();
        let (u, p) = split_blocks(x, nu);
        let (rhs_u, rhs_p) = split_blocks(self.rhs, nu);
        // the viscous boundary data is part of the nonlinear residual already
        let mut viscous = base.space_u.zero_vector();
        base.momentum.rhs_add(&mut viscous, self.time);
        let rhs_u = &rhs_u - &viscous;
        let mut r_u = base.space_u.zero_vector();
        base.momentum
            .evaluate_nonlinear_residual(&mut r_u, &u, &rhs_u, self.time, self.scaling_factor);
        let mut gp = base.space_u.zero_vector();
        apply(&base.gradient, &p, &mut gp);
        r_u += &gp;

        let mut r_p = base.space_p.zero_vector();
        apply(&base.divergence, &u, &mut r_p);
        r_p *= -1.;
        r_p -= &rhs_p;
        dst.slice_mut(s![..nu]).assign(&r_u);
        dst.slice_mut(s![nu..]).assign(&r_p);
        Ok(())
    }

    fn solve_linearized(
        &mut self,
        dx: &mut DofVector,
        residual: &DofVector,
        x: &DofVector,
        update_preconditioner: bool,
    ) -> Result<usize> {
        let base = self.base;
        let (u, _) = split_blocks(x, base.space_u.n_dofs());
        let mut ctx = OperatorContext::new(self.time, self.scaling_factor);
        ctx.set_solution_linearization(&u);
        let momentum = base.momentum.with_context(&ctx)?;
        let velocity_preconditioner = self.velocity_preconditioner.get(&momentum, update_preconditioner)?;
        let system = CoupledSystem::new(base, base.momentum.with_context(&ctx)?);
        let preconditioner =
            BlockPreconditioner::new(base, &momentum, velocity_preconditioner, self.scaling_factor);
        self.solver.solve(&system, &preconditioner, dx, residual)
    }
}
