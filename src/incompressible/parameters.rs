//! Input parameters of the incompressible flow solvers
use super::spatial::turbulence_model::{TurbulenceEddyViscosityModel, TurbulenceModelData};
use crate::error::{DgError, Result};
use crate::restart::RestartData;
use crate::solvers::{NewtonSolverData, PreconditionerType, SolverData, SolverType};
use crate::time_integration::{TreatmentOfConvectiveTerm, MAX_ORDER};
use serde::{Deserialize, Serialize};

/// Equations to solve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquationType {
    /// Unsteady Stokes equations
    Stokes,
    /// Incompressible Navier-Stokes equations
    NavierStokes,
}

/// Time integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalDiscretization {
    /// High-order dual splitting (velocity correction)
    BdfDualSplitting,
    /// Incremental pressure correction
    BdfPressureCorrection,
    /// Monolithic velocity-pressure system
    BdfCoupled,
}

/// All parameters of an incompressible flow simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputParameters {
    /// Stokes or Navier-Stokes
    pub equation_type: EquationType,
    /// Start time
    pub start_time: f64,
    /// End time
    pub end_time: f64,
    /// Kinematic viscosity
    pub viscosity: f64,
    /// Polynomial degree of the velocity, the pressure uses `degree_u - 1`
    pub degree_u: usize,

    /// Time integration scheme
    pub temporal_discretization: TemporalDiscretization,
    /// Treatment of the convective term
    pub treatment_of_convective_term: TreatmentOfConvectiveTerm,
    /// BDF order
    pub order_time_integrator: usize,
    /// Ramp up the order during the first steps
    pub start_with_low_order: bool,
    /// Time step size
    pub time_step_size: f64,

    /// Scales the Lax-Friedrichs penalty of the convective term
    pub upwind_factor: f64,
    /// Interior penalty factor of the viscous term
    pub ip_factor_viscous: f64,
    /// Interior penalty factor of the pressure Poisson operator
    pub ip_factor_pressure: f64,

    /// Pressure correction: order of the pressure extrapolation in the
    /// momentum step, zero drops the pressure gradient
    pub order_pressure_extrapolation: usize,
    /// Pressure correction: rotational pressure update
    pub rotational_formulation: bool,
    /// Dual splitting: extrapolation order of the pressure Neumann data
    pub order_extrapolation_pressure_nbc: usize,

    /// Linear solver of the momentum step
    pub solver_momentum: SolverType,
    /// Tolerances of the momentum solver
    pub solver_data_momentum: SolverData,
    /// Preconditioner of the momentum step
    pub preconditioner_momentum: PreconditionerType,
    /// Rebuild the momentum preconditioner every time step (every Newton
    /// iteration for a nonlinear momentum step)
    pub update_preconditioner_momentum: bool,
    /// Rebuild only every n-th Newton iteration
    pub update_preconditioner_momentum_every_newton_iter: usize,
    /// Newton tolerances of the nonlinear momentum step
    pub newton_solver_data_momentum: NewtonSolverData,

    /// Linear solver of the pressure Poisson equation
    pub solver_pressure_poisson: SolverType,
    /// Tolerances of the pressure Poisson solver
    pub solver_data_pressure_poisson: SolverData,
    /// Preconditioner of the pressure Poisson equation
    pub preconditioner_pressure_poisson: PreconditionerType,

    /// Projection with divergence penalty term instead of the plain
    /// inverse mass matrix
    pub use_divergence_penalty: bool,
    /// Divergence penalty factor
    pub divergence_penalty_factor: f64,
    /// Tolerances of the projection solver
    pub solver_data_projection: SolverData,
    /// Preconditioner of the projection step
    pub preconditioner_projection: PreconditionerType,

    /// Dual splitting: linear solver of the viscous step
    pub solver_viscous: SolverType,
    /// Dual splitting: tolerances of the viscous solver
    pub solver_data_viscous: SolverData,
    /// Dual splitting: preconditioner of the viscous step
    pub preconditioner_viscous: PreconditionerType,

    /// Coupled: outer solver of the block system
    pub solver_coupled: SolverType,
    /// Coupled: tolerances of the outer solver
    pub solver_data_coupled: SolverData,
    /// Coupled: preconditioner of the velocity block
    pub preconditioner_velocity_block: PreconditionerType,
    /// Coupled: relative tolerance of the inner velocity block solve
    pub velocity_block_rel_tol: f64,
    /// Coupled: CG iterations on the pressure Laplace operator in the
    /// Schur complement preconditioner
    pub schur_complement_cg_iterations: usize,
    /// Coupled: Newton tolerances for an implicit convective term
    pub newton_solver_data_coupled: NewtonSolverData,

    /// Eddy viscosity model, `None` for laminar flow
    pub turbulence_model: Option<TurbulenceModelData>,
    /// Velocity Dirichlet data on the whole boundary, the pressure level
    /// is undefined
    pub pure_dirichlet_bc: bool,
    /// Restart files
    pub restart_data: RestartData,
}

impl Default for InputParameters {
    fn default() -> Self {
        Self {
            equation_type: EquationType::NavierStokes,
            start_time: 0.,
            end_time: 1.,
            viscosity: 1e-2,
            degree_u: 3,
            temporal_discretization: TemporalDiscretization::BdfDualSplitting,
            treatment_of_convective_term: TreatmentOfConvectiveTerm::Explicit,
            order_time_integrator: 2,
            start_with_low_order: true,
            time_step_size: 1e-2,
            upwind_factor: 1.,
            ip_factor_viscous: 1.,
            ip_factor_pressure: 1.,
            order_pressure_extrapolation: 1,
            rotational_formulation: false,
            order_extrapolation_pressure_nbc: 2,
            solver_momentum: SolverType::GMRES,
            solver_data_momentum: SolverData::new(1000, 1e-12, 1e-8),
            preconditioner_momentum: PreconditionerType::InverseMassMatrix,
            update_preconditioner_momentum: false,
            update_preconditioner_momentum_every_newton_iter: 1,
            newton_solver_data_momentum: NewtonSolverData {
                max_iter: 100,
                abs_tol: 1e-12,
                rel_tol: 1e-8,
            },
            solver_pressure_poisson: SolverType::CG,
            solver_data_pressure_poisson: SolverData::new(5000, 1e-14, 1e-10),
            preconditioner_pressure_poisson: PreconditionerType::PointJacobi,
            use_divergence_penalty: false,
            divergence_penalty_factor: 1.,
            solver_data_projection: SolverData::new(1000, 1e-14, 1e-10),
            preconditioner_projection: PreconditionerType::BlockJacobi,
            solver_viscous: SolverType::CG,
            solver_data_viscous: SolverData::new(1000, 1e-14, 1e-10),
            preconditioner_viscous: PreconditionerType::InverseMassMatrix,
            solver_coupled: SolverType::FGMRES,
            solver_data_coupled: SolverData::new(1000, 1e-12, 1e-8),
            preconditioner_velocity_block: PreconditionerType::InverseMassMatrix,
            velocity_block_rel_tol: 1e-2,
            schur_complement_cg_iterations: 10,
            newton_solver_data_coupled: NewtonSolverData {
                max_iter: 100,
                abs_tol: 1e-12,
                rel_tol: 1e-8,
            },
            turbulence_model: None,
            pure_dirichlet_bc: false,
            restart_data: RestartData::default(),
        }
    }
}

impl InputParameters {
    /// Polynomial degree of the pressure
    pub fn degree_p(&self) -> usize {
        self.degree_u.saturating_sub(1)
    }

    /// Convective term present and part of the implicit system
    pub fn convective_problem(&self) -> bool {
        self.equation_type == EquationType::NavierStokes
            && self.treatment_of_convective_term == TreatmentOfConvectiveTerm::Implicit
    }

    /// Convective term present and extrapolated in time
    pub fn explicit_convection(&self) -> bool {
        self.equation_type == EquationType::NavierStokes
            && self.treatment_of_convective_term == TreatmentOfConvectiveTerm::Explicit
    }

    /// Reject malformed parameter combinations
    ///
    /// # Errors
    /// The first inconsistency found.
    pub fn check(&self) -> Result<()> {
        if !(1..=MAX_ORDER).contains(&self.order_time_integrator) {
            return Err(DgError::Config(format!(
                "order_time_integrator = {} not in 1..={}",
                self.order_time_integrator, MAX_ORDER
            )));
        }
        if self.end_time <= self.start_time {
            return Err(DgError::config("end_time must be larger than start_time"));
        }
        if self.time_step_size <= 0. {
            return Err(DgError::config("time_step_size must be positive"));
        }
        if self.viscosity < 0. {
            return Err(DgError::config("viscosity must be non-negative"));
        }
        if self.degree_u < 2 {
            return Err(DgError::config(
                "degree_u must be at least 2, the pressure uses degree_u - 1",
            ));
        }
        if self.order_pressure_extrapolation > self.order_time_integrator {
            return Err(DgError::config(
                "order_pressure_extrapolation must not exceed order_time_integrator",
            ));
        }
        if self.order_extrapolation_pressure_nbc > self.order_time_integrator {
            return Err(DgError::config(
                "order_extrapolation_pressure_nbc must not exceed order_time_integrator",
            ));
        }
        match self.temporal_discretization {
            TemporalDiscretization::BdfDualSplitting => {
                if self.convective_problem() {
                    return Err(DgError::config(
                        "the dual splitting scheme requires an explicit convective term",
                    ));
                }
            }
            TemporalDiscretization::BdfPressureCorrection => {
                if self.convective_problem() && self.solver_momentum == SolverType::CG {
                    return Err(DgError::config(
                        "CG cannot solve the nonsymmetric linearized momentum equation, use GMRES",
                    ));
                }
            }
            TemporalDiscretization::BdfCoupled => {
                if self.solver_coupled != SolverType::FGMRES {
                    return Err(DgError::Config(format!(
                        "the block preconditioner of the coupled system contains inner iterative \
                         solvers and requires FGMRES, got {:?}",
                        self.solver_coupled
                    )));
                }
                if self.schur_complement_cg_iterations == 0 {
                    return Err(DgError::config("schur_complement_cg_iterations must be positive"));
                }
            }
        }
        if self.use_divergence_penalty && self.divergence_penalty_factor <= 0. {
            return Err(DgError::config("divergence_penalty_factor must be positive"));
        }
        if self.preconditioner_pressure_poisson == PreconditionerType::InverseMassMatrix {
            return Err(DgError::config(
                "the inverse mass matrix is no preconditioner for the pressure Poisson equation",
            ));
        }
        if let Some(turbulence) = &self.turbulence_model {
            if turbulence.turbulence_model == TurbulenceEddyViscosityModel::Undefined {
                return Err(DgError::config("turbulence model must be defined"));
            }
        }
        if self.restart_data.write_restart && self.restart_data.interval_time <= 0. {
            return Err(DgError::config("restart interval_time must be positive"));
        }
        if self.equation_type == EquationType::Stokes
            && self.treatment_of_convective_term == TreatmentOfConvectiveTerm::Implicit
        {
            log::warn!("treatment_of_convective_term is ignored for the Stokes equations");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_parameters() {
        let mut param = InputParameters::default();
        assert!(param.check().is_ok());

        param.treatment_of_convective_term = TreatmentOfConvectiveTerm::Implicit;
        assert!(param.check().is_err());
        param.temporal_discretization = TemporalDiscretization::BdfPressureCorrection;
        assert!(param.check().is_ok());
        param.solver_momentum = SolverType::CG;
        assert!(param.check().is_err());

        let mut param = InputParameters::default();
        param.temporal_discretization = TemporalDiscretization::BdfCoupled;
        param.solver_coupled = SolverType::GMRES;
        assert!(param.check().is_err());

        let mut param = InputParameters::default();
        param.order_pressure_extrapolation = 3;
        assert!(param.check().is_err());

        let mut param = InputParameters::default();
        param.turbulence_model = Some(TurbulenceModelData::default());
        assert!(param.check().is_err());
    }

    #[test]
    fn test_parameters_serialize() {
        let param = InputParameters::default();
        let bytes = bincode::serialize(&param).unwrap();
        let restored: InputParameters = bincode::deserialize(&bytes).unwrap();
        assert_eq!(param, restored);
    }
}
