//! Momentum operator $ \sigma M + V [+ C'(u^*)] $
//!
//! Evaluation time, scaling factor of the mass term and linearization
//! point are not stored in the operator. They travel with every call in
//! an [`OperatorContext`] owned by the caller.
//!
//! # Example
//! ```
//! use rustdg::fe::DgSpace;
//! use rustdg::grid::Grid;
//! use rustdg::functions::zero_function;
//! use rustdg::incompressible::spatial::{OperatorContext, VelocityConvDiffOperator};
//! use rustdg::operators::{BoundaryDescriptor, ConvectiveOperator, LaplaceOperator};
//! use std::sync::Arc;
//!
//! let grid = Arc::new(Grid::hyper_cube(1, 0., 1.));
//! let space = DgSpace::new(grid, 2, 2);
//! let bc = BoundaryDescriptor::new().with_dirichlet(0, zero_function(2));
//! let viscous = LaplaceOperator::new(&space, bc.clone(), 0.01, 1.);
//! let convective = ConvectiveOperator::new(&space, bc, 1.);
//! let op = VelocityConvDiffOperator::new(&space, viscous, Some(convective), true);
//!
//! let u = space.zero_vector();
//! let mut dst = space.zero_vector();
//! let mut ctx = OperatorContext::new(0., 1.5);
//! // the linearized convective term needs a linearization point
//! assert!(op.vmult(&ctx, &mut dst, &u).is_err());
//! ctx.set_solution_linearization(&u);
//! assert!(op.vmult(&ctx, &mut dst, &u).is_ok());
//! ```
use crate::error::{DgError, Result};
use crate::fe::DgSpace;
use crate::operators::{
    apply, CellKernel, ConvectiveOperator, LaplaceOperator, LinearizedConvective, MassOperator,
    RhsAssembler,
};
use crate::solvers::{
    LinearSolver, NonlinearResidualProvider, Precondition, Preconditioner, PreconditionerSnapshot,
    PreconditionerType, Solve,
};
use crate::types::DofVector;

/// Evaluation time, mass scaling and linearization point of one
/// operator application
#[derive(Debug, Clone, Copy)]
pub struct OperatorContext<'a> {
    /// Time of the boundary data
    pub time: f64,
    /// Factor $ \sigma $ of the mass term
    pub scaling_factor: f64,
    /// Velocity at which the convective term is linearized
    pub linearization: Option<&'a DofVector>,
}

impl<'a> OperatorContext<'a> {
    /// Context without linearization point
    pub fn new(time: f64, scaling_factor: f64) -> Self {
        Self {
            time,
            scaling_factor,
            linearization: None,
        }
    }

    /// Set $ \sigma $
    pub fn set_scaling_factor_time_derivative_term(&mut self, scaling_factor: f64) {
        self.scaling_factor = scaling_factor;
    }

    /// Set the evaluation time
    pub fn set_evaluation_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Set the linearization point of the convective term
    pub fn set_solution_linearization(&mut self, velocity: &'a DofVector) {
        self.linearization = Some(velocity);
    }
}

/// Mass, viscous and (optionally) convective term of the momentum equation
#[derive(Clone)]
pub struct VelocityConvDiffOperator {
    /// Velocity mass operator
    pub mass: MassOperator,
    /// Viscous term, variable coefficients for eddy viscosity models
    pub viscous: LaplaceOperator,
    /// Convective term, `None` for the Stokes equations
    pub convective: Option<ConvectiveOperator>,
    /// Convective term is part of the implicit operator
    pub convective_problem: bool,
}

impl VelocityConvDiffOperator {
    /// Momentum operator on the velocity space `space`
    pub fn new(
        space: &DgSpace,
        viscous: LaplaceOperator,
        convective: Option<ConvectiveOperator>,
        convective_problem: bool,
    ) -> Self {
        Self {
            mass: MassOperator::new(space),
            viscous,
            convective_problem: convective_problem && convective.is_some(),
            convective,
        }
    }

    /// Velocity space
    pub fn space(&self) -> &DgSpace {
        &self.mass.space
    }

    /// Homogeneous operator for the context `ctx`
    ///
    /// # Errors
    /// The convective term is implicit but `ctx` has no linearization point.
    pub fn with_context<'a>(&'a self, ctx: &OperatorContext<'a>) -> Result<MomentumOperator<'a>> {
        let convective = match (&self.convective, self.convective_problem) {
            (Some(convective), true) => {
                let linearization = ctx.linearization.ok_or_else(|| {
                    DgError::config(
                        "linearized convective term evaluated without solution linearization",
                    )
                })?;
                Some(convective.linearized(linearization, ctx.time))
            }
            _ => None,
        };
        Ok(MomentumOperator {
            op: self,
            scaling_factor: ctx.scaling_factor,
            convective,
        })
    }

    /// $ dst = (\sigma M + V + C'(u^*)) src $
    ///
    /// # Errors
    /// See [`Self::with_context`].
    pub fn vmult(&self, ctx: &OperatorContext, dst: &mut DofVector, src: &DofVector) -> Result<()> {
        let kernel = self.with_context(ctx)?;
        apply(&kernel, src, dst);
        Ok(())
    }

    /// Add the viscous boundary data at `time`
    pub fn rhs_add(&self, dst: &mut DofVector, time: f64) {
        self.viscous.rhs_add(dst, time);
    }

    /// $ dst = \sigma M u + C(u, t) + V u - rhs_V(t) - rhs $
    pub fn evaluate_nonlinear_residual(
        &self,
        dst: &mut DofVector,
        u: &DofVector,
        rhs: &DofVector,
        time: f64,
        scaling_factor: f64,
    ) {
        let kernel = MomentumOperator {
            op: self,
            scaling_factor,
            convective: None,
        };
        apply(&kernel, u, dst);
        if let Some(convective) = &self.convective {
            convective.evaluate_add(dst, u, time);
        }
        let mut boundary = self.space().zero_vector();
        self.rhs_add(&mut boundary, time);
        *dst -= &boundary;
        *dst -= rhs;
    }
}

/// [`VelocityConvDiffOperator`] bound to one context
pub struct MomentumOperator<'a> {
    op: &'a VelocityConvDiffOperator,
    scaling_factor: f64,
    convective: Option<LinearizedConvective<'a>>,
}

impl CellKernel for MomentumOperator<'_> {
    fn row_space(&self) -> &DgSpace {
        self.op.space()
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        self.op.viscous.cell_apply(cell, src, dst);
        let mut tmp = vec![0.; dst.len()];
        self.op.mass.cell_apply(cell, src, &mut tmp);
        dst.iter_mut()
            .zip(&tmp)
            .for_each(|(d, m)| *d += self.scaling_factor * m);
        if let Some(convective) = &self.convective {
            convective.cell_apply(cell, src, &mut tmp);
            dst.iter_mut().zip(&tmp).for_each(|(d, c)| *d += c);
        }
    }
}

/// Cached momentum preconditioner, rebuilt on request only
#[derive(Debug, Clone)]
pub struct MomentumPreconditioner {
    /// Preconditioner type
    pub kind: PreconditionerType,
    cache: Option<Preconditioner>,
}

impl MomentumPreconditioner {
    /// Empty cache
    pub fn new(kind: PreconditionerType) -> Self {
        Self { kind, cache: None }
    }

    /// Preconditioner for `kernel`, rebuilt if `update` is set or nothing
    /// is cached yet
    ///
    /// # Errors
    /// Singular diagonal or cell blocks.
    pub fn get<K: CellKernel + ?Sized>(&mut self, kernel: &K, update: bool) -> Result<&Preconditioner> {
        if update || self.cache.is_none() {
            self.cache = Some(Preconditioner::from_kernel(self.kind, kernel)?);
        }
        self.cache
            .as_ref()
            .ok_or_else(|| DgError::config("momentum preconditioner missing"))
    }

    /// Cached preconditioner, `None` before the first solve
    pub fn snapshot(&self) -> Option<PreconditionerSnapshot> {
        self.cache.as_ref().map(Preconditioner::snapshot)
    }

    /// Replace the cache by a stored snapshot on the velocity space `space`
    ///
    /// # Errors
    /// The snapshot holds another preconditioner type or does not fit `space`.
    pub fn restore(&mut self, snapshot: Option<PreconditionerSnapshot>, space: &DgSpace) -> Result<()> {
        if let Some(stored) = snapshot.as_ref().map(PreconditionerSnapshot::kind) {
            if stored != self.kind {
                return Err(DgError::Config(format!(
                    "restart archive holds a {:?} preconditioner, configured is {:?}",
                    stored, self.kind
                )));
            }
        }
        self.cache = snapshot
            .map(|s| Preconditioner::from_snapshot(s, space))
            .transpose()?;
        Ok(())
    }
}

/// Nonlinear momentum equation of one time step, solved by Newton
pub struct MomentumNewtonProblem<'a> {
    /// Momentum operator
    pub op: &'a VelocityConvDiffOperator,
    /// Right hand side without viscous boundary data
    pub rhs: &'a DofVector,
    /// Evaluation time
    pub time: f64,
    /// Factor of the mass term
    pub scaling_factor: f64,
    /// Linear solver of the linearized problem
    pub solver: &'a LinearSolver,
    /// Preconditioner cache
    pub preconditioner: &'a mut MomentumPreconditioner,
}

impl NonlinearResidualProvider for MomentumNewtonProblem<'_> {
    fn evaluate_residual(&mut self, dst: &mut DofVector, u: &DofVector) -> Result<()> {
        self.op
            .evaluate_nonlinear_residual(dst, u, self.rhs, self.time, self.scaling_factor);
        Ok(())
    }

    fn solve_linearized(
        &mut self,
        du: &mut DofVector,
        residual: &DofVector,
        u: &DofVector,
        update_preconditioner: bool,
    ) -> Result<usize> {
        let mut ctx = OperatorContext::new(self.time, self.scaling_factor);
        ctx.set_solution_linearization(u);
        let kernel = self.op.with_context(&ctx)?;
        let prec: &dyn Precondition = self.preconditioner.get(&kernel, update_preconditioner)?;
        self.solver.solve(&kernel, prec, du, residual)
    }
}
