//! # Algebraic subgrid-scale models
//!
//! Eddy viscosity $ \nu_{SGS} = (C h)^2 D(\nabla u) $ added to the
//! molecular viscosity, with the filter width $ h = V^{1/d} / (k+1) $.
//!
//! Differential operators $ D $:
//! - Smagorinsky: $ \sqrt{2 S:S} $
//! - Vreman: $ \sqrt{B_\gamma / \nabla u : \nabla u} $, $ \gamma = g g^T $
//! - WALE: $ (S^d:S^d)^{3/2} / ((S:S)^{5/2} + (S^d:S^d)^{5/4}) $
//! - Sigma: $ \sigma_3 (\sigma_1 - \sigma_2)(\sigma_2 - \sigma_3) / \sigma_1^2 $
//!
//! Vreman and Sigma are only defined in three dimensions.
//!
//! # Example
//! ```
//! use rustdg::incompressible::spatial::turbulence_model::smagorinsky;
//! // simple shear, S:S = 1/2
//! let g = [[0., 1.], [0., 0.]];
//! assert!((smagorinsky(1., &g, 0.5) - 0.25).abs() < 1e-14);
//! ```
use crate::error::{DgError, Result};
use crate::fe::{cell_gradient, face_trace, DgSpace};
use crate::grid::{opposite_face, FaceNeighbor, FACES_PER_CELL};
use crate::operators::{as_slice, component, VariableCoefficients};
use crate::types::{double_contract, matmul, symmetric_part, trace, transpose, DofVector, Tensor, DIM};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const TOLERANCE: f64 = 1e-12;

/// Available eddy viscosity models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurbulenceEddyViscosityModel {
    /// Not set
    Undefined,
    /// Smagorinsky (1963)
    Smagorinsky,
    /// Vreman (2004), isotropic variant
    Vreman,
    /// Wall-adapting local eddy viscosity (Nicoud & Ducros 1999)
    WALE,
    /// Sigma model (Nicoud et al. 2011)
    Sigma,
}

/// Model selection and model constant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurbulenceModelData {
    /// Model
    pub turbulence_model: TurbulenceEddyViscosityModel,
    /// Model constant $ C $
    pub constant: f64,
}

impl Default for TurbulenceModelData {
    fn default() -> Self {
        Self {
            turbulence_model: TurbulenceEddyViscosityModel::Undefined,
            constant: 1.0,
        }
    }
}

/// Smagorinsky eddy viscosity
pub fn smagorinsky<const N: usize>(filter_width: f64, grad: &Tensor<f64, N>, c: f64) -> f64 {
    let s = symmetric_part(grad);
    let rate_of_strain = (2. * double_contract(&s, &s)).sqrt();
    let factor = c * filter_width;
    factor * factor * rate_of_strain
}

/// Vreman eddy viscosity, zero for a vanishing gradient
pub fn vreman(filter_width: f64, grad: &Tensor<f64, 3>, c: f64) -> f64 {
    let norm_square = double_contract(grad, grad);
    let g = matmul(grad, &transpose(grad));
    let b_gamma = g[0][0] * g[1][1] - g[0][1] * g[0][1] + g[0][0] * g[2][2] - g[0][2] * g[0][2]
        + g[1][1] * g[2][2]
        - g[1][2] * g[1][2];
    if norm_square > TOLERANCE && b_gamma > TOLERANCE {
        let factor = c * filter_width;
        factor * factor * (b_gamma / norm_square).sqrt()
    } else {
        0.
    }
}

/// WALE eddy viscosity, zero in pure shear
pub fn wale<const N: usize>(filter_width: f64, grad: &Tensor<f64, N>, c: f64) -> f64 {
    let s = symmetric_part(grad);
    let s_norm_square = double_contract(&s, &s);
    let square_gradient = matmul(grad, grad);
    let mut s_d = symmetric_part(&square_gradient);
    let isotropic = trace(&square_gradient) / 3.;
    for (i, row) in s_d.iter_mut().enumerate() {
        row[i] -= isotropic;
    }
    let s_d_norm_square = double_contract(&s_d, &s_d);
    if s_d_norm_square > TOLERANCE {
        let d = s_d_norm_square.powf(1.5) / (s_norm_square.powf(2.5) + s_d_norm_square.powf(1.25));
        let factor = c * filter_width;
        factor * factor * d
    } else {
        0.
    }
}

fn determinant3(a: &Tensor<f64, 3>) -> f64 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1]) - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

/// Sigma eddy viscosity. The singular values of $ g $ follow from the
/// invariants of $ G = g^T g $ in closed form.
///
/// # Errors
/// Degenerate invariants, i.e. $ \alpha_1 $ not positive or the arccos
/// argument outside of $ [-1, 1] $.
pub fn sigma(filter_width: f64, grad: &Tensor<f64, 3>, c: f64) -> Result<f64> {
    let g = matmul(&transpose(grad), grad);
    let invariant1 = trace(&g);
    let invariant2 = 0.5 * (invariant1 * invariant1 - trace(&matmul(&g, &g)));
    let invariant3 = determinant3(&g);
    // trace(G) = 0 means G = 0
    if invariant1 <= TOLERANCE {
        return Ok(0.);
    }
    let alpha1 = invariant1 * invariant1 / 9. - invariant2 / 3.;
    let alpha2 = invariant1.powi(3) / 27. - invariant1 * invariant2 / 6. + invariant3 / 2.;
    // smallest positive subnormal
    if alpha1 < f64::from_bits(1) {
        return Err(DgError::Numerical(format!(
            "sigma model: alpha1 = {:.3e} has to be larger than zero",
            alpha1
        )));
    }
    let factor = alpha2 / alpha1.powf(1.5);
    if factor.abs() > 1. + 1e-12 {
        return Err(DgError::Numerical(format!(
            "sigma model: cannot compute arccos({:.16e})",
            factor
        )));
    }
    let alpha3 = factor.clamp(-1., 1.).acos() / 3.;
    let root = 2. * alpha1.sqrt();
    let sv = [
        invariant1 / 3. + root * alpha3.cos(),
        invariant1 / 3. - root * (PI / 3. + alpha3).cos(),
        invariant1 / 3. - root * (PI / 3. - alpha3).cos(),
    ]
    .map(|s| if s > 0. { s.sqrt() } else { 0. });
    let d = if sv[0] > TOLERANCE {
        sv[2] * (sv[0] - sv[1]) * (sv[1] - sv[2]) / (sv[0] * sv[0])
    } else {
        0.
    };
    let factor = c * filter_width;
    Ok(factor * factor * d)
}

/// The gradient as a three dimensional tensor, `None` for `N != 3`
fn as_three_dimensional<const N: usize>(grad: &Tensor<f64, N>) -> Option<Tensor<f64, 3>> {
    if N != 3 {
        return None;
    }
    let mut g = [[0.; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            g[i][j] = grad[i][j];
        }
    }
    Some(g)
}

/// Eddy viscosity of the model in `data`
///
/// # Errors
/// Undefined model, a three dimensional model for `N != 3`, or a
/// degenerate Sigma model evaluation.
pub fn eddy_viscosity<const N: usize>(
    data: &TurbulenceModelData,
    filter_width: f64,
    grad: &Tensor<f64, N>,
) -> Result<f64> {
    let c = data.constant;
    match data.turbulence_model {
        TurbulenceEddyViscosityModel::Undefined => {
            Err(DgError::config("turbulence model must be defined"))
        }
        TurbulenceEddyViscosityModel::Smagorinsky => Ok(smagorinsky(filter_width, grad, c)),
        TurbulenceEddyViscosityModel::WALE => Ok(wale(filter_width, grad, c)),
        model @ (TurbulenceEddyViscosityModel::Vreman | TurbulenceEddyViscosityModel::Sigma) => {
            let g = as_three_dimensional(grad).ok_or_else(|| {
                DgError::Config(format!("{:?} model requires dim == 3, got dim == {}", model, N))
            })?;
            if model == TurbulenceEddyViscosityModel::Vreman {
                Ok(vreman(filter_width, &g, c))
            } else {
                sigma(filter_width, &g, c)
            }
        }
    }
}

/// Velocity gradient `g[i][j][node]` $ = \partial u_i / \partial x_j $
type NodalGradient = [[Vec<f64>; DIM]; DIM];

/// Eddy viscosity model acting on the viscous operator coefficients
#[derive(Debug, Clone)]
pub struct TurbulenceModel {
    space: DgSpace,
    /// Model data
    pub data: TurbulenceModelData,
    /// Molecular viscosity
    pub viscosity: f64,
    /// Filter width per cell
    pub filter_width: Vec<f64>,
}

impl TurbulenceModel {
    /// Model on the velocity space, filter widths are computed once
    ///
    /// # Errors
    /// Undefined model, a non-positive constant, or Vreman and Sigma
    /// outside of three dimensions.
    pub fn new(space: &DgSpace, data: TurbulenceModelData, viscosity: f64) -> Result<Self> {
        match data.turbulence_model {
            TurbulenceEddyViscosityModel::Undefined => {
                return Err(DgError::config("turbulence model must be defined"))
            }
            TurbulenceEddyViscosityModel::Vreman | TurbulenceEddyViscosityModel::Sigma
                if DIM != 3 =>
            {
                return Err(DgError::Config(format!(
                    "number of dimensions has to be dim == 3 to evaluate the {:?} model, got dim == {}",
                    data.turbulence_model, DIM
                )))
            }
            _ => (),
        }
        if data.constant <= 0. {
            return Err(DgError::config("turbulence model constant must be positive"));
        }
        Ok(Self {
            space: space.clone(),
            data,
            viscosity,
            filter_width: Self::calculate_filter_width(space),
        })
    }

    /// $ h = V^{1/d} / (k + 1) $ per cell
    pub fn calculate_filter_width(space: &DgSpace) -> Vec<f64> {
        let nn = space.n_cell_nodes();
        let volume: f64 = (0..nn).map(|q| space.jxw(q)).sum();
        let h = volume.powf(1. / DIM as f64) / (space.degree() + 1) as f64;
        vec![h; space.grid.n_active_cells()]
    }

    fn nodal_gradient(&self, src: &[f64], cell: usize) -> NodalGradient {
        let [gx, gy] = cell_gradient(&self.space.basis, component(&self.space, src, cell, 0), self.space.grid.h);
        let [hx, hy] = cell_gradient(&self.space.basis, component(&self.space, src, cell, 1), self.space.grid.h);
        [[gx, gy], [hx, hy]]
    }

    /// Molecular plus eddy viscosity at the face points of `face`
    fn face_viscosity(&self, grad: &NodalGradient, cell: usize, face: usize) -> Result<Vec<f64>> {
        let n = self.space.n_1d();
        let mut traces = [[vec![0.; n], vec![0.; n]], [vec![0.; n], vec![0.; n]]];
        for i in 0..DIM {
            for j in 0..DIM {
                face_trace(&self.space.basis, &grad[i][j], face, &mut traces[i][j]);
            }
        }
        (0..n)
            .map(|t| {
                let g = [
                    [traces[0][0][t], traces[0][1][t]],
                    [traces[1][0][t], traces[1][1][t]],
                ];
                Ok(self.viscosity + eddy_viscosity(&self.data, self.filter_width[cell], &g)?)
            })
            .collect()
    }

    /// Recompute the total viscosity for `velocity` and write it into
    /// `coefficients`: cell pass, interior face pass (both sides of each
    /// face) and boundary face pass.
    ///
    /// # Errors
    /// Degenerate model evaluation.
    pub fn calculate_turbulent_viscosity(
        &self,
        velocity: &DofVector,
        coefficients: &mut VariableCoefficients,
    ) -> Result<()> {
        let space = &self.space;
        let nn = space.n_cell_nodes();
        let n = space.n_1d();
        let src = as_slice(velocity);

        // cells
        coefficients
            .cell
            .par_chunks_mut(nn)
            .enumerate()
            .try_for_each(|(cell, out)| -> Result<()> {
                let grad = self.nodal_gradient(src, cell);
                for (q, o) in out.iter_mut().enumerate() {
                    let g = [[grad[0][0][q], grad[0][1][q]], [grad[1][0][q], grad[1][1][q]]];
                    *o = self.viscosity + eddy_viscosity(&self.data, self.filter_width[cell], &g)?;
                }
                Ok(())
            })?;

        // interior faces, visited from the cell on the lower side
        let interior: Vec<(usize, usize, Vec<f64>)> = (0..space.grid.n_active_cells())
            .into_par_iter()
            .map(|cell| -> Result<Vec<(usize, usize, Vec<f64>)>> {
                let mut values = Vec::new();
                let mut grad = None;
                for face in [1, 3] {
                    if let FaceNeighbor::Interior(nb) = space.grid.neighbor(cell, face) {
                        let g = grad.get_or_insert_with(|| self.nodal_gradient(src, cell));
                        values.push((cell, face, self.face_viscosity(g, cell, face)?));
                        let g_nb = self.nodal_gradient(src, nb);
                        let nb_face = opposite_face(face);
                        values.push((nb, nb_face, self.face_viscosity(&g_nb, nb, nb_face)?));
                    }
                }
                Ok(values)
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        // boundary faces
        let boundary: Vec<(usize, usize, Vec<f64>)> = space
            .grid
            .boundary_faces()
            .into_par_iter()
            .map(|(cell, face, _)| -> Result<(usize, usize, Vec<f64>)> {
                let grad = self.nodal_gradient(src, cell);
                Ok((cell, face, self.face_viscosity(&grad, cell, face)?))
            })
            .collect::<Result<Vec<_>>>()?;

        for (cell, face, values) in interior.into_iter().chain(boundary) {
            let offset = (cell * FACES_PER_CELL + face) * n;
            coefficients.face[offset..offset + n].copy_from_slice(&values);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate};
    use crate::grid::Grid;
    use std::sync::Arc;

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
    fn test_models_on_known_gradients() {
        let g = [[3., 0., 0.], [0., 2., 0.], [0., 0., 1.]];
        // B_gamma = 36 + 9 + 4, |g|^2 = 14
        approx_eq(vreman(1., &g, 1.), (49. / 14_f64).sqrt());
        // singular values 3, 2, 1
        approx_eq(sigma(1., &g, 1.).unwrap(), 1. / 9.);
        approx_eq(sigma(2., &g, 0.5).unwrap(), 1. / 9.);
        // WALE vanishes in pure shear
        let shear = [[0., 1.], [0., 0.]];
        approx_eq(wale(1., &shear, 1.), 0.);
        approx_eq(smagorinsky(1., &shear, 1.), 1.);
    }

    #[test]
    fn test_zero_gradient_gives_zero_viscosity() {
        let zero3 = [[0.; 3]; 3];
        let zero2 = [[0.; 2]; 2];
        assert_eq!(smagorinsky(0.3, &zero2, 0.17), 0.);
        assert_eq!(vreman(0.3, &zero3, 0.17), 0.);
        assert_eq!(wale(0.3, &zero3, 0.17), 0.);
        assert_eq!(sigma(0.3, &zero3, 0.17).unwrap(), 0.);
    }

    #[test]
    fn test_sigma_isotropic_gradient_is_degenerate() {
        let g = [[1., 0., 0.], [0., 1., 0.], [0., 0., 1.]];
        assert!(sigma(1., &g, 1.).is_err());
    }

    #[test]
    fn test_three_dimensional_models_rejected() {
        let grid = Arc::new(Grid::hyper_cube(1, 0., 1.));
        let space = DgSpace::new(grid, 2, 2);
        for model in [
            TurbulenceEddyViscosityModel::Vreman,
            TurbulenceEddyViscosityModel::Sigma,
            TurbulenceEddyViscosityModel::Undefined,
        ] {
            let data = TurbulenceModelData {
                turbulence_model: model,
                constant: 0.5,
            };
            assert!(TurbulenceModel::new(&space, data, 1e-3).is_err());
        }
        let data = TurbulenceModelData {
            turbulence_model: TurbulenceEddyViscosityModel::Vreman,
            constant: 0.5,
        };
        assert!(eddy_viscosity(&data, 1., &[[1., 0.], [0., 1.]]).is_err());
    }

    #[test]
    fn test_uniform_flow_keeps_molecular_viscosity() {
        let grid = Arc::new(Grid::hyper_rectangle([3, 2], [0., 0.], [3., 2.]));
        let space = DgSpace::new(grid, 3, 2);
        let u = interpolate(&space, from_fn(2, |_, _, c| [2., -1.][c]).as_ref(), 0.);
        let nu = 1e-3;
        for model in [TurbulenceEddyViscosityModel::Smagorinsky, TurbulenceEddyViscosityModel::WALE] {
            let data = TurbulenceModelData {
                turbulence_model: model,
                constant: 0.165,
            };
            let turbulence = TurbulenceModel::new(&space, data, nu).unwrap();
            let mut coefficients = VariableCoefficients::constant(&space, -1.);
            turbulence
                .calculate_turbulent_viscosity(&u, &mut coefficients)
                .unwrap();
            for v in coefficients.cell.iter().chain(coefficients.face.iter()) {
                assert!((v - nu).abs() < 1e-14, "got {} expected {}", v, nu);
            }
        }
    }

    #[test]
    fn test_shear_flow_smagorinsky() {
        // u = (y, 0): sqrt(2 S:S) = 1 everywhere
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 2, 2);
        let u = interpolate(&space, from_fn(2, |p, _, c| if c == 0 { p[1] } else { 0. }).as_ref(), 0.);
        let data = TurbulenceModelData {
            turbulence_model: TurbulenceEddyViscosityModel::Smagorinsky,
            constant: 0.2,
        };
        let turbulence = TurbulenceModel::new(&space, data, 0.).unwrap();
        // h = V^(1/2) / (k + 1) = 0.5 / 3
        approx_eq(turbulence.filter_width[0], 0.5 / 3.);
        let mut coefficients = VariableCoefficients::constant(&space, 0.);
        turbulence
            .calculate_turbulent_viscosity(&u, &mut coefficients)
            .unwrap();
        let expected = (0.2 * 0.5 / 3.) * (0.2 * 0.5 / 3.);
        for v in coefficients.cell.iter().chain(coefficients.face.iter()) {
            approx_eq(*v, expected);
        }
    }
}
