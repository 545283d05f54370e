//! Rotating hill: a Gaussian bump carried once around a circle of
//! radius 0.5 by the solid body rotation $ b = 2 \pi (-y, x) $ on
//! $ [-1, 1]^2 $, zero diffusivity.
use crate::functions::{from_fn, FunctionPtr};
use crate::operators::BoundaryDescriptor;
use std::f64::consts::PI;

const RADIUS: f64 = 0.5;
const OMEGA: f64 = 2. * PI;

/// Exact solution, also initial and inflow data
pub fn solution() -> FunctionPtr {
    from_fn(1, |p, t, _| {
        let cx = -RADIUS * (OMEGA * t).sin();
        let cy = RADIUS * (OMEGA * t).cos();
        (-50. * (p[0] - cx).powi(2) - 50. * (p[1] - cy).powi(2)).exp()
    })
}

/// Solid body rotation
pub fn velocity() -> FunctionPtr {
    from_fn(2, |p, _, c| if c == 0 { -p[1] * OMEGA } else { p[0] * OMEGA })
}

/// Inflow data from the exact solution on boundary id 0
pub fn boundary_descriptor() -> BoundaryDescriptor {
    BoundaryDescriptor::new().with_dirichlet(0, solution())
}
