//! Run example:
//!
//! cargo run --release
//!
//! Decay of a Taylor-Green vortex with all three incompressible solvers.
//! Set `RUST_LOG=info` (or `debug`) for the solver output.
use rustdg::functions::l2_error;
use rustdg::incompressible::{
    taylor_green, IncompressibleSolver, InputParameters, TemporalDiscretization,
};
use rustdg::{integrate, Result};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parameters
    let (n_refine, degree) = (3, 4);
    let viscosity = 0.025;
    let dt = 2e-2;
    let max_time = 1.;
    let save_intervall = Some(0.2);

    for scheme in [
        TemporalDiscretization::BdfDualSplitting,
        TemporalDiscretization::BdfPressureCorrection,
        TemporalDiscretization::BdfCoupled,
    ] {
        let mut param = InputParameters::default();
        param.temporal_discretization = scheme;
        param.viscosity = viscosity;
        param.degree_u = degree;
        param.time_step_size = dt;
        param.end_time = max_time;
        let mut navier = taylor_green::setup(&param, n_refine)?;
        integrate(navier.as_mut(), max_time, save_intervall)?;
        let (err, norm) = l2_error(
            &navier.spatial().space_u,
            navier.get_velocity(),
            taylor_green::velocity(viscosity).as_ref(),
            max_time,
        );
        println!("{:?}: relative velocity error {:.4e}", scheme, err / norm);
    }
    Ok(())
}
