//! Analytic space-time functions, interpolation and error norms
use crate::fe::{gauss_legendre, DgSpace};
use crate::types::{DofVector, Point};
use rayon::prelude::*;
use std::sync::Arc;

/// Function $ f(x, t) $ with one or more components
pub trait Function: Send + Sync {
    /// Number of components
    fn n_components(&self) -> usize;
    /// Value of component `comp` at point `p` and time `t`
    fn value(&self, p: Point, t: f64, comp: usize) -> f64;
}

/// Shared, type erased function
pub type FunctionPtr = Arc<dyn Function>;

/// Function defined by a closure
pub struct FunctionFn<F> {
    n_components: usize,
    f: F,
}

impl<F> Function for FunctionFn<F>
where
    F: Fn(Point, f64, usize) -> f64 + Send + Sync,
{
    fn n_components(&self) -> usize {
        self.n_components
    }

    fn value(&self, p: Point, t: f64, comp: usize) -> f64 {
        (self.f)(p, t, comp)
    }
}

/// Wrap a closure `|p, t, comp| -> f64` as [`FunctionPtr`]
///
/// # Example
/// ```
/// use rustdg::functions::from_fn;
/// let f = from_fn(1, |p, t, _| p[0] + t);
/// assert_eq!(f.value([1., 0.], 2., 0), 3.);
/// ```
pub fn from_fn<F>(n_components: usize, f: F) -> FunctionPtr
where
    F: Fn(Point, f64, usize) -> f64 + Send + Sync + 'static,
{
    Arc::new(FunctionFn { n_components, f })
}

/// Constant function, one value per component
#[derive(Debug, Clone)]
pub struct ConstantFunction {
    /// Values per component
    pub values: Vec<f64>,
}

impl Function for ConstantFunction {
    fn n_components(&self) -> usize {
        self.values.len()
    }

    fn value(&self, _p: Point, _t: f64, comp: usize) -> f64 {
        self.values[comp]
    }
}

/// Zero function with `n` components
pub fn zero_function(n: usize) -> FunctionPtr {
    Arc::new(ConstantFunction { values: vec![0.; n] })
}

/// Constant function
pub fn constant_function(values: &[f64]) -> FunctionPtr {
    Arc::new(ConstantFunction {
        values: values.to_vec(),
    })
}

/// Nodal interpolation of `f` at time `t` into `dst`
pub fn interpolate_into(space: &DgSpace, f: &dyn Function, t: f64, dst: &mut DofVector) {
    let chunk = space.dofs_per_cell();
    let nn = space.n_cell_nodes();
    if let Some(values) = dst.as_slice_mut() {
        values
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(cell, out)| {
                for (k, o) in out.iter_mut().enumerate() {
                    let p = space.node_point(cell, k % nn);
                    *o = f.value(p, t, k / nn);
                }
            });
    }
}

/// Nodal interpolation of `f` at time `t`
pub fn interpolate(space: &DgSpace, f: &dyn Function, t: f64) -> DofVector {
    let mut v = space.zero_vector();
    interpolate_into(space, f, t, &mut v);
    v
}

/// Over-integrated L2 error $ \| v - f(t) \| $ and norm $ \| f(t) \| $,
/// summed over all components
pub fn l2_error(space: &DgSpace, v: &DofVector, f: &dyn Function, t: f64) -> (f64, f64) {
    let n = space.n_1d();
    let (xq, wq) = gauss_legendre(n + 2);
    let interp = space.basis.interpolation_matrix(&xq);
    let h = space.grid.h;
    let nq = xq.len();
    let (err, norm) = (0..space.grid.n_active_cells())
        .into_par_iter()
        .map(|cell| {
            let chunk = space.cell_values(v, cell);
            let c = space.grid.cell_center(cell);
            let mut err = 0.;
            let mut norm = 0.;
            for comp in 0..space.n_components {
                for qy in 0..nq {
                    for qx in 0..nq {
                        let mut uh = 0.;
                        for j in 0..n {
                            for i in 0..n {
                                uh += interp[[qx, i]] * interp[[qy, j]]
                                    * chunk[comp * n * n + i + n * j];
                            }
                        }
                        let p = [c[0] + 0.5 * h[0] * xq[qx], c[1] + 0.5 * h[1] * xq[qy]];
                        let exact = f.value(p, t, comp);
                        let jxw = wq[qx] * wq[qy] * 0.25 * h[0] * h[1];
                        err += jxw * (uh - exact).powi(2);
                        norm += jxw * exact.powi(2);
                    }
                }
            }
            (err, norm)
        })
        .reduce(|| (0., 0.), |a, b| (a.0 + b.0, a.1 + b.1));
    (err.sqrt(), norm.sqrt())
}

/// L2 norm of a discrete field
pub fn l2_norm(space: &DgSpace, v: &DofVector) -> f64 {
    space
        .mass_diagonal()
        .iter()
        .zip(v.iter())
        .map(|(m, x)| m * x * x)
        .sum::<f64>()
        .sqrt()
}

/// Mean value of component `comp`, $ \int v \, dx / |\Omega| $
pub fn mean_value(space: &DgSpace, v: &DofVector, comp: usize) -> f64 {
    let nn = space.n_cell_nodes();
    let mut integral = 0.;
    let mut volume = 0.;
    for cell in 0..space.grid.n_active_cells() {
        for node in 0..nn {
            let jxw = space.jxw(node);
            integral += jxw * v[space.dof(cell, comp, node)];
            volume += jxw;
        }
    }
    integral / volume
}
