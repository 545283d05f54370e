use ndarray::{array, Array1};
use rustdg::fe::DgSpace;
use rustdg::functions::{from_fn, interpolate};
use rustdg::fsi::{FixedPointData, FixedPointSolver, PartitionedProblem};
use rustdg::grid::Grid;
use rustdg::interface_coupling::{
    ContainerInterfaceData, InterfaceCoupling, SharedInterfaceData,
};
use rustdg::types::DofVector;
use rustdg::{DgError, Result};
use std::sync::Arc;

/// Structure displacement `a + b y` on one grid, transferred to the
/// interface x = 1 of a non-matching fluid grid. The fluid response is
/// `(1 + a / 2, 2 + b / 2)`, fitted from the transferred values.
struct ToyProblem {
    structure: DgSpace,
    coupling: InterfaceCoupling,
    interface: SharedInterfaceData,
}

impl ToyProblem {
    fn new() -> Self {
        let structure = DgSpace::new(
            Arc::new(Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.])),
            1,
            1,
        );
        let fluid_grid = Grid::hyper_rectangle([2, 5], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]);
        let fluid = DgSpace::new(Arc::new(fluid_grid), 2, 1);
        let interface = ContainerInterfaceData::setup(&fluid, &[1].into_iter().collect(), 1).shared();
        let coupling = InterfaceCoupling::setup(interface.clone(), &structure, &[], 1e-10).unwrap();
        Self {
            structure,
            coupling,
            interface,
        }
    }

    /// Least squares line through the interface values
    fn fit(&self) -> [f64; 2] {
        let data = self.interface.read().unwrap();
        let (mut n, mut sy, mut syy, mut sv, mut syv) = (0., 0., 0., 0., 0.);
        for (i, p) in data.q_points().iter().enumerate() {
            let v = data.solution(i)[0];
            n += 1.;
            sy += p[1];
            syy += p[1] * p[1];
            sv += v;
            syv += p[1] * v;
        }
        let det = n * syy - sy * sy;
        [(syy * sv - sy * syv) / det, (n * syv - sy * sv) / det]
    }
}

impl PartitionedProblem for ToyProblem {
    fn apply(&mut self, d: &DofVector) -> Result<DofVector> {
        let (a, b) = (d[0], d[1]);
        let displacement = interpolate(&self.structure, from_fn(1, move |p, _, _| a + b * p[1]).as_ref(), 0.);
        self.coupling.update_data(&displacement)?;
        let [a_fit, b_fit] = self.fit();
        Ok(array![1. + 0.5 * a_fit, 2. + 0.5 * b_fit])
    }
}

#[test]
fn test_fixed_point_through_interface_coupling() {
    let data = FixedPointData {
        rel_tol: 1e-12,
        ..FixedPointData::default()
    };
    let mut problem = ToyProblem::new();
    let mut d = Array1::zeros(2);
    let iterations = FixedPointSolver::new(data).solve(&mut problem, &mut d).unwrap();
    assert!((d[0] - 2.).abs() < 1e-10, "a = {}", d[0]);
    assert!((d[1] - 4.).abs() < 1e-10, "b = {}", d[1]);
    assert!(iterations < 10, "{} iterations", iterations);
}

#[test]
fn test_fixed_point_iteration_cap() {
    let data = FixedPointData {
        rel_tol: 1e-12,
        abs_tol: 1e-14,
        partitioned_iter_max: 1,
        ..FixedPointData::default()
    };
    let mut d = Array1::zeros(2);
    let result = FixedPointSolver::new(data).solve(&mut ToyProblem::new(), &mut d);
    assert!(matches!(result, Err(DgError::NotConverged { .. })));
}
