//! # Nodal discontinuous Galerkin element
//!
//! Tensor product Lagrange polynomials of degree `k` on the `k+1`
//! Gauss-Legendre points. Quadrature is collocated with the nodes,
//! hence the mass matrix is diagonal:
//! $$
//! M_{aa} = w_{a_1} w_{a_2} \frac{h_x h_y}{4}.
//! $$
//!
//! Degrees of freedom are stored cell-major,
//! `dof = (cell * n_components + comp) * n^2 + node`, `node = i + n * j`,
//! such that every cell owns one contiguous chunk of a [`DofVector`].
use crate::grid::{face_direction, Grid};
use crate::types::{DofVector, Point};
use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use std::sync::Arc;

/// Legendre polynomial $ P_n(x) $ and its derivative
fn legendre(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1., 0.);
    }
    let (mut p_prev, mut p) = (1., x);
    for k in 2..=n {
        let kf = k as f64;
        let p_next = ((2. * kf - 1.) * x * p - (kf - 1.) * p_prev) / kf;
        p_prev = p;
        p = p_next;
    }
    let dp = n as f64 * (x * p - p_prev) / (x * x - 1.);
    (p, dp)
}

/// Gauss-Legendre points and weights on $[-1, 1]$, points ascending
///
/// # Example
/// ```
/// use rustdg::fe::gauss_legendre;
/// let (x, w) = gauss_legendre(2);
/// assert!((x[1] - 1. / 3f64.sqrt()).abs() < 1e-14);
/// assert!((w[0] + w[1] - 2.).abs() < 1e-14);
/// ```
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.; n];
    let mut w = vec![0.; n];
    for i in 0..(n + 1) / 2 {
        // Chebyshev guess, then Newton
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre(n, z);
            let dz = p / dp;
            z -= dz;
            if dz.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(n, z);
        x[i] = -z;
        x[n - 1 - i] = z;
        w[i] = 2. / ((1. - z * z) * dp * dp);
        w[n - 1 - i] = w[i];
    }
    (x, w)
}

/// One-dimensional Lagrange basis on Gauss-Legendre nodes
#[derive(Debug, Clone)]
pub struct LagrangeBasis1D {
    /// Polynomial degree
    pub degree: usize,
    /// Nodes on $[-1, 1]$
    pub nodes: Vec<f64>,
    /// Quadrature weights belonging to the nodes
    pub weights: Vec<f64>,
    /// `derivative[[q, j]]` $= l_j'(\xi_q)$
    pub derivative: Array2<f64>,
    /// Basis values at $\xi = -1$ (`[0]`) and $\xi = 1$ (`[1]`)
    pub face_values: [Vec<f64>; 2],
    /// Basis derivatives at $\xi = -1$ (`[0]`) and $\xi = 1$ (`[1]`)
    pub face_derivatives: [Vec<f64>; 2],
}

impl LagrangeBasis1D {
    /// Basis of degree `degree`
    pub fn new(degree: usize) -> Self {
        let n = degree + 1;
        let (nodes, weights) = gauss_legendre(n);
        let mut basis = Self {
            degree,
            nodes,
            weights,
            derivative: Array2::zeros((n, n)),
            face_values: [vec![0.; n], vec![0.; n]],
            face_derivatives: [vec![0.; n], vec![0.; n]],
        };
        basis.derivative = basis.derivative_matrix_at(&basis.nodes);
        for (side, x) in [-1., 1.].iter().enumerate() {
            basis.face_values[side] = basis.values_at(*x);
            basis.face_derivatives[side] = (0..n).map(|j| basis.derivative_value(j, *x)).collect();
        }
        basis
    }

    /// Number of nodes
    pub fn n(&self) -> usize {
        self.nodes.len()
    }

    /// $ l_j(x) $
    pub fn value(&self, j: usize, x: f64) -> f64 {
        let xj = self.nodes[j];
        self.nodes
            .iter()
            .enumerate()
            .filter(|(m, _)| *m != j)
            .fold(1., |acc, (_, xm)| acc * (x - xm) / (xj - xm))
    }

    /// $ l_j'(x) $
    pub fn derivative_value(&self, j: usize, x: f64) -> f64 {
        let xj = self.nodes[j];
        let mut sum = 0.;
        for (k, xk) in self.nodes.iter().enumerate() {
            if k == j {
                continue;
            }
            let mut prod = 1. / (xj - xk);
            for (m, xm) in self.nodes.iter().enumerate() {
                if m != j && m != k {
                    prod *= (x - xm) / (xj - xm);
                }
            }
            sum += prod;
        }
        sum
    }

    /// All basis values at `x`
    pub fn values_at(&self, x: f64) -> Vec<f64> {
        (0..self.n()).map(|j| self.value(j, x)).collect()
    }

    /// `m[[q, j]]` $= l_j(x_q)$
    pub fn interpolation_matrix(&self, points: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((points.len(), self.n()), |(q, j)| {
            self.value(j, points[q])
        })
    }

    /// `m[[q, j]]` $= l_j'(x_q)$
    pub fn derivative_matrix_at(&self, points: &[f64]) -> Array2<f64> {
        Array2::from_shape_fn((points.len(), self.n()), |(q, j)| {
            self.derivative_value(j, points[q])
        })
    }
}

/// Index of the cell node with normal index `i_normal` and tangential
/// index `t` with respect to a face of direction `dir`
#[inline]
pub fn face_node(n: usize, dir: usize, i_normal: usize, t: usize) -> usize {
    if dir == 0 {
        i_normal + n * t
    } else {
        t + n * i_normal
    }
}

/// Discontinuous Lagrange space on a [`Grid`]
#[derive(Debug, Clone)]
pub struct DgSpace {
    /// Underlying grid
    pub grid: Arc<Grid>,
    /// One-dimensional basis
    pub basis: Arc<LagrangeBasis1D>,
    /// Number of vector components
    pub n_components: usize,
}

impl DgSpace {
    /// Space of degree `degree` with `n_components` components
    pub fn new(grid: Arc<Grid>, degree: usize, n_components: usize) -> Self {
        Self {
            grid,
            basis: Arc::new(LagrangeBasis1D::new(degree)),
            n_components,
        }
    }

    /// Polynomial degree
    pub fn degree(&self) -> usize {
        self.basis.degree
    }

    /// Nodes per direction
    pub fn n_1d(&self) -> usize {
        self.basis.n()
    }

    /// Nodes per cell and component
    pub fn n_cell_nodes(&self) -> usize {
        self.n_1d() * self.n_1d()
    }

    /// Length of the chunk of one cell
    pub fn dofs_per_cell(&self) -> usize {
        self.n_components * self.n_cell_nodes()
    }

    /// Total number of degrees of freedom
    pub fn n_dofs(&self) -> usize {
        self.grid.n_active_cells() * self.dofs_per_cell()
    }

    /// Global dof index
    #[inline]
    pub fn dof(&self, cell: usize, comp: usize, node: usize) -> usize {
        (cell * self.n_components + comp) * self.n_cell_nodes() + node
    }

    /// Zero initialized vector
    pub fn zero_vector(&self) -> DofVector {
        Array1::zeros(self.n_dofs())
    }

    /// Physical position of a cell node
    pub fn node_point(&self, cell: usize, node: usize) -> Point {
        let n = self.n_1d();
        let c = self.grid.cell_center(cell);
        let h = self.grid.h;
        [
            c[0] + 0.5 * h[0] * self.basis.nodes[node % n],
            c[1] + 0.5 * h[1] * self.basis.nodes[node / n],
        ]
    }

    /// Quadrature weight times Jacobian of a cell node
    #[inline]
    pub fn jxw(&self, node: usize) -> f64 {
        let n = self.n_1d();
        let h = self.grid.h;
        self.basis.weights[node % n] * self.basis.weights[node / n] * 0.25 * h[0] * h[1]
    }

    /// Physical position of the `t`-th quadrature point on face `face`
    pub fn face_point(&self, cell: usize, face: usize, t: usize) -> Point {
        let (dir, side) = face_direction(face);
        let c = self.grid.cell_center(cell);
        let h = self.grid.h;
        let tdir = 1 - dir;
        let mut p = [0.; 2];
        p[dir] = c[dir] + if side == 0 { -0.5 } else { 0.5 } * h[dir];
        p[tdir] = c[tdir] + 0.5 * h[tdir] * self.basis.nodes[t];
        p
    }

    /// Face quadrature weight times surface Jacobian
    #[inline]
    pub fn face_jxw(&self, face: usize, t: usize) -> f64 {
        let (dir, _) = face_direction(face);
        self.basis.weights[t] * 0.5 * self.grid.h[1 - dir]
    }

    /// Chunk of one cell
    pub fn cell_values<'a>(&self, v: &'a DofVector, cell: usize) -> ndarray::ArrayView1<'a, f64> {
        let len = self.dofs_per_cell();
        v.slice(ndarray::s![cell * len..(cell + 1) * len])
    }

    /// Evaluate all components of `v` in `cell` at reference point `xi`
    pub fn evaluate(&self, v: &DofVector, cell: usize, xi: [f64; 2]) -> Vec<f64> {
        let n = self.n_1d();
        let lx = self.basis.values_at(xi[0]);
        let ly = self.basis.values_at(xi[1]);
        let chunk = self.cell_values(v, cell);
        (0..self.n_components)
            .map(|comp| {
                let mut sum = 0.;
                for j in 0..n {
                    for i in 0..n {
                        sum += lx[i] * ly[j] * chunk[comp * n * n + i + n * j];
                    }
                }
                sum
            })
            .collect()
    }

    /// Diagonal of the mass matrix
    pub fn mass_diagonal(&self) -> DofVector {
        let nn = self.n_cell_nodes();
        Array1::from_shape_fn(self.n_dofs(), |d| self.jxw(d % nn))
    }
}

/// Trace of one component chunk `u` (length `n^2`) on a face
pub fn face_trace(basis: &LagrangeBasis1D, u: &[f64], face: usize, out: &mut [f64]) {
    let (dir, side) = face_direction(face);
    let n = basis.n();
    let fv = &basis.face_values[side];
    for (t, o) in out.iter_mut().enumerate().take(n) {
        *o = (0..n).map(|i| fv[i] * u[face_node(n, dir, i, t)]).sum();
    }
}

/// Derivative along the face direction of one component chunk on a face,
/// in physical units
pub fn face_normal_derivative(
    basis: &LagrangeBasis1D,
    u: &[f64],
    face: usize,
    h_dir: f64,
    out: &mut [f64],
) {
    let (dir, side) = face_direction(face);
    let n = basis.n();
    let fd = &basis.face_derivatives[side];
    for (t, o) in out.iter_mut().enumerate().take(n) {
        *o = 2. / h_dir * (0..n).map(|i| fd[i] * u[face_node(n, dir, i, t)]).sum::<f64>();
    }
}

/// Physical gradient of one component chunk at all cell nodes,
/// `grad[d][node]`
pub fn cell_gradient(basis: &LagrangeBasis1D, u: &[f64], h: [f64; 2]) -> [Vec<f64>; 2] {
    let n = basis.n();
    let d = &basis.derivative;
    let mut gx = vec![0.; n * n];
    let mut gy = vec![0.; n * n];
    for j in 0..n {
        for i in 0..n {
            let mut sx = 0.;
            let mut sy = 0.;
            for m in 0..n {
                sx += d[[i, m]] * u[m + n * j];
                sy += d[[j, m]] * u[i + n * m];
            }
            gx[i + n * j] = 2. / h[0] * sx;
            gy[i + n * j] = 2. / h[1] * sy;
        }
    }
    [gx, gy]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(result: f64, expected: f64) {
        let dif = 1e-10;
        if (result - expected).abs() > dif {
            panic!(
                "Large difference of values, got {} expected {}.",
                result, expected
            )
        }
    }

    #[test]
    fn test_gauss_legendre_exactness() {
        for n in 1..8 {
            let (x, w) = gauss_legendre(n);
            // exact up to degree 2n-1
            for p in 0..2 * n {
                let integral: f64 = x.iter().zip(&w).map(|(x, w)| w * x.powi(p as i32)).sum();
                let exact = if p % 2 == 0 { 2. / (p as f64 + 1.) } else { 0. };
                approx_eq(integral, exact);
            }
        }
    }

    #[test]
    fn test_lagrange_derivative() {
        let basis = LagrangeBasis1D::new(3);
        // derivative of x^3 interpolant
        let u: Vec<f64> = basis.nodes.iter().map(|x| x.powi(3)).collect();
        for q in 0..basis.n() {
            let du: f64 = (0..basis.n()).map(|j| basis.derivative[[q, j]] * u[j]).sum();
            approx_eq(du, 3. * basis.nodes[q].powi(2));
        }
        let right: f64 = (0..basis.n()).map(|j| basis.face_values[1][j] * u[j]).sum();
        approx_eq(right, 1.);
        let dleft: f64 = (0..basis.n())
            .map(|j| basis.face_derivatives[0][j] * u[j])
            .sum();
        approx_eq(dleft, 3.);
    }

    #[test]
    fn test_space_evaluate_and_gradient() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 3], [0., 0.], [1., 1.5]));
        let space = DgSpace::new(grid, 2, 1);
        let mut v = space.zero_vector();
        for cell in 0..space.grid.n_active_cells() {
            for node in 0..space.n_cell_nodes() {
                let p = space.node_point(cell, node);
                v[space.dof(cell, 0, node)] = p[0] * p[1] + 2. * p[0];
            }
        }
        let cell = 3;
        let val = space.evaluate(&v, cell, [1., -1.]);
        // upper x, lower y corner of cell (1, 1): (1.0, 0.5)
        approx_eq(val[0], 0.5 + 2.);
        let chunk = space.cell_values(&v, cell).to_vec();
        let grad = cell_gradient(&space.basis, &chunk, space.grid.h);
        for node in 0..space.n_cell_nodes() {
            let p = space.node_point(cell, node);
            approx_eq(grad[0][node], p[1] + 2.);
            approx_eq(grad[1][node], p[0]);
        }
        let total: f64 = space.mass_diagonal().sum();
        approx_eq(total, 1.5);
    }
}
