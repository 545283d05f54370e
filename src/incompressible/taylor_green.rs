//! Taylor-Green vortex on the doubly periodic box $ [0, 2\pi]^2 $
//!
//! $$
//! u = (\sin x \cos y, -\cos x \sin y) e^{-2 \nu t},
//! \quad p = \frac{1}{4} (\cos 2x + \cos 2y) e^{-4 \nu t}
//! $$
//! is an exact solution of the Navier-Stokes equations without forcing.
use super::{
    create_time_integrator, FlowBoundaryDescriptor, FlowProblem, IncompressibleSolver,
    InputParameters, LoggingPostProcessor,
};
use crate::error::Result;
use crate::functions::{from_fn, FunctionPtr};
use crate::grid::Grid;
use std::f64::consts::PI;
use std::sync::Arc;

/// Analytical velocity
pub fn velocity(viscosity: f64) -> FunctionPtr {
    from_fn(2, move |p, t, c| {
        let decay = (-2. * viscosity * t).exp();
        if c == 0 {
            p[0].sin() * p[1].cos() * decay
        } else {
            -p[0].cos() * p[1].sin() * decay
        }
    })
}

/// Analytical pressure
pub fn pressure(viscosity: f64) -> FunctionPtr {
    from_fn(1, move |p, t, _| {
        0.25 * ((2. * p[0]).cos() + (2. * p[1]).cos()) * (-4. * viscosity * t).exp()
    })
}

/// Grid with `2^n_refine` cells per direction and the analytical solution
pub fn problem(n_refine: usize, viscosity: f64) -> FlowProblem {
    let grid = Grid::hyper_cube(n_refine, 0., 2. * PI)
        .with_periodicity(0)
        .with_periodicity(1);
    FlowProblem {
        grid: Arc::new(grid),
        bc: FlowBoundaryDescriptor::default(),
        analytical_velocity: velocity(viscosity),
        analytical_pressure: pressure(viscosity),
        body_force: None,
    }
}

/// Time integrator of `param.temporal_discretization` for the vortex,
/// logging the errors every ten steps. The pressure level is fixed by
/// its mean value.
///
/// # Errors
/// Invalid parameters.
pub fn setup(param: &InputParameters, n_refine: usize) -> Result<Box<dyn IncompressibleSolver>> {
    let mut param = param.clone();
    param.pure_dirichlet_bc = true;
    let problem = problem(n_refine, param.viscosity);
    let velocity = problem.analytical_velocity.clone();
    let pressure = problem.analytical_pressure.clone();
    let mut solver = create_time_integrator(&param, problem)?;
    let spatial = solver.spatial();
    let mut postprocessor =
        LoggingPostProcessor::new(&spatial.space_u, &spatial.space_p).with_analytical_solution(velocity, pressure);
    postprocessor.interval = 10;
    solver.set_postprocessor(Box::new(postprocessor));
    Ok(solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::interpolate;
    use crate::incompressible::TemporalDiscretization;

    #[test]
    fn test_taylor_green_is_divergence_free() {
        let mut param = InputParameters::default();
        param.degree_u = 4;
        let solver = setup(&param, 3).unwrap();
        let spatial = solver.spatial();
        assert!(spatial.operator_is_singular);
        let divergence_norm = |u: FunctionPtr| {
            let u = interpolate(&spatial.space_u, u.as_ref(), 0.3);
            let mut div = spatial.space_p.zero_vector();
            spatial.evaluate_velocity_divergence_term(&mut div, &u, 0.3);
            div.dot(&div).sqrt()
        };
        // same field with flipped sign of the second component, div = 2 cos x cos y
        let compressible = from_fn(2, |p, _, c| {
            if c == 0 {
                p[0].sin() * p[1].cos()
            } else {
                p[0].cos() * p[1].sin()
            }
        });
        let ratio = divergence_norm(velocity(0.)) / divergence_norm(compressible);
        assert!(ratio < 1e-2, "divergence ratio {}", ratio);
    }

    #[test]
    fn test_taylor_green_decay() {
        for scheme in [
            TemporalDiscretization::BdfDualSplitting,
            TemporalDiscretization::BdfPressureCorrection,
            TemporalDiscretization::BdfCoupled,
        ] {
            let mut param = InputParameters::default();
            param.temporal_discretization = scheme;
            param.viscosity = 0.1;
            param.degree_u = 4;
            param.time_step_size = 1e-2;
            param.end_time = 0.1;
            let mut solver = setup(&param, 2).unwrap();
            crate::integrate(solver.as_mut(), 0.1, None).unwrap();
            let space_u = &solver.spatial().space_u;
            let (err, norm) = crate::functions::l2_error(space_u, solver.get_velocity(), velocity(0.1).as_ref(), 0.1);
            assert!(err / norm < 1e-2, "{:?}: relative velocity error {}", scheme, err / norm);
        }
    }
}
