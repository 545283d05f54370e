//! BDF and extrapolation coefficients for variable time step sizes
//!
//! With the time step sizes $ \Delta t_0 = t_{n+1} - t_n $,
//! $ \Delta t_1 = t_n - t_{n-1} $, ... the BDF scheme of order $ J $ reads
//! $$
//! \frac{\gamma_0 u_{n+1} - \sum_{i=0}^{J-1} \alpha_i u_{n-i}}{\Delta t_0}
//! $$
//! and the extrapolation of order $ J $
//! $$
//! u^{\star}\_{n+1} = \sum_{i=0}^{J-1} \beta_i u_{n-i}.
//! $$
//! Both follow from Lagrange interpolation on the time grid and reduce
//! to the textbook constants for constant time steps.
use serde::{Deserialize, Serialize};

/// Highest implemented order
pub const MAX_ORDER: usize = 4;

/// Time grid relative to $ t_{n+1} $: $ \tau_0 = 0, \tau_1 = -\Delta t_0, ... $
fn relative_times(n_points: usize, time_steps: &[f64]) -> Vec<f64> {
    let mut tau = vec![0.; n_points];
    for i in 1..n_points {
        tau[i] = tau[i - 1] - time_steps[i - 1];
    }
    tau
}

/// Derivative at `x` of the Lagrange polynomial of node `j`
fn lagrange_derivative(nodes: &[f64], j: usize, x: f64) -> f64 {
    let mut sum = 0.;
    for k in 0..nodes.len() {
        if k == j {
            continue;
        }
        let mut prod = 1. / (nodes[j] - nodes[k]);
        for m in 0..nodes.len() {
            if m != j && m != k {
                prod *= (x - nodes[m]) / (nodes[j] - nodes[m]);
            }
        }
        sum += prod;
    }
    sum
}

/// Value at `x` of the Lagrange polynomial of node `j`
fn lagrange_value(nodes: &[f64], j: usize, x: f64) -> f64 {
    let mut prod = 1.;
    for m in 0..nodes.len() {
        if m != j {
            prod *= (x - nodes[m]) / (nodes[j] - nodes[m]);
        }
    }
    prod
}

/// Coefficients of the BDF time derivative
///
/// # Example
/// ```
/// use rustdg::time_integration::BdfConstants;
/// let bdf = BdfConstants::new(2, &[0.1, 0.1]);
/// assert!((bdf.gamma0 - 1.5).abs() < 1e-12);
/// assert!((bdf.alpha[0] - 2.).abs() < 1e-12);
/// assert!((bdf.alpha[1] + 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BdfConstants {
    /// Active order
    pub order: usize,
    /// $ \gamma_0 $
    pub gamma0: f64,
    /// $ \alpha_i $, one per previous time level
    pub alpha: Vec<f64>,
}

impl BdfConstants {
    /// Constants of order `order` for the time steps `time_steps`
    /// (at least `order` entries, `[0]` is the current step)
    pub fn new(order: usize, time_steps: &[f64]) -> Self {
        let mut bdf = Self {
            order,
            gamma0: 1.,
            alpha: vec![1.],
        };
        bdf.update(order, time_steps);
        bdf
    }

    /// Recompute for `order` and `time_steps`
    pub fn update(&mut self, order: usize, time_steps: &[f64]) {
        assert!(
            (1..=MAX_ORDER).contains(&order),
            "BDF order {} not in 1..={}",
            order,
            MAX_ORDER
        );
        let tau = relative_times(order + 1, time_steps);
        let dt = time_steps[0];
        self.order = order;
        self.gamma0 = dt * lagrange_derivative(&tau, 0, 0.);
        self.alpha = (1..=order)
            .map(|j| -dt * lagrange_derivative(&tau, j, 0.))
            .collect();
    }

    /// Sum of the history weights, equals $ \gamma_0 $ (consistency)
    pub fn alpha_sum(&self) -> f64 {
        self.alpha.iter().sum()
    }
}

/// Coefficients of the extrapolation to $ t_{n+1} $
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrapolationConstants {
    /// Active order, zero disables the extrapolation
    pub order: usize,
    /// $ \beta_i $, one per previous time level
    pub beta: Vec<f64>,
}

impl ExtrapolationConstants {
    /// Constants of order `order` for the time steps `time_steps`
    pub fn new(order: usize, time_steps: &[f64]) -> Self {
        let mut extra = Self {
            order,
            beta: Vec::new(),
        };
        extra.update(order, time_steps);
        extra
    }

    /// Recompute for `order` and `time_steps`
    pub fn update(&mut self, order: usize, time_steps: &[f64]) {
        assert!(order <= MAX_ORDER, "extrapolation order {} too high", order);
        self.order = order;
        if order == 0 {
            self.beta.clear();
            return;
        }
        let tau = relative_times(order + 1, time_steps);
        let nodes = &tau[1..];
        self.beta = (0..order).map(|j| lagrange_value(nodes, j, 0.)).collect();
    }
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
    fn test_constant_step_constants() {
        let dt = [0.3; 4];
        let expected_gamma = [1., 1.5, 11. / 6., 25. / 12.];
        let expected_alpha: [&[f64]; 4] = [
            &[1.],
            &[2., -0.5],
            &[3., -1.5, 1. / 3.],
            &[4., -3., 4. / 3., -0.25],
        ];
        let expected_beta: [&[f64]; 4] = [&[1.], &[2., -1.], &[3., -3., 1.], &[4., -6., 4., -1.]];
        for order in 1..=4 {
            let bdf = BdfConstants::new(order, &dt);
            approx_eq(bdf.gamma0, expected_gamma[order - 1]);
            approx_eq(bdf.alpha_sum(), bdf.gamma0);
            for (a, b) in bdf.alpha.iter().zip(expected_alpha[order - 1]) {
                approx_eq(*a, *b);
            }
            let extra = ExtrapolationConstants::new(order, &dt);
            for (a, b) in extra.beta.iter().zip(expected_beta[order - 1]) {
                approx_eq(*a, *b);
            }
        }
    }

    #[test]
    fn test_variable_step_bdf2() {
        // u(t) = t^2 is differentiated exactly on an uneven grid
        let dt = [0.1, 0.25];
        let bdf = BdfConstants::new(2, &dt);
        let t1 = 1.0;
        let t0 = t1 - dt[0];
        let tm = t0 - dt[1];
        let du = (bdf.gamma0 * t1 * t1 - bdf.alpha[0] * t0 * t0 - bdf.alpha[1] * tm * tm) / dt[0];
        approx_eq(du, 2. * t1);
        let extra = ExtrapolationConstants::new(2, &dt);
        approx_eq(extra.beta[0] * t0 + extra.beta[1] * tm, t1);
    }
}
