//! Spatial discretization of the scalar convection-diffusion equation
use super::ConvDiffParameters;
use crate::error::{DgError, Result};
use crate::fe::DgSpace;
use crate::functions::FunctionPtr;
use crate::operators::{
    apply_add, BodyForceOperator, BoundaryDescriptor, CellKernel, LaplaceOperator, MassOperator,
    RhsAssembler, TransportAt, TransportOperator,
};
use crate::time_integration::TreatmentOfConvectiveTerm;
use crate::types::DofVector;

/// Mass, transport, diffusion and source term of one scalar
#[derive(Clone)]
pub struct ConvDiffOperator {
    /// Scalar space
    pub space: DgSpace,
    /// Mass operator
    pub mass: MassOperator,
    /// Transport term, `None` without velocity field
    pub transport: Option<TransportOperator>,
    /// Diffusive term, `None` for zero diffusivity
    pub diffusion: Option<LaplaceOperator>,
    /// Source term
    pub source: Option<BodyForceOperator>,
}

impl ConvDiffOperator {
    /// Operator on the scalar space `space`
    ///
    /// # Errors
    /// Missing or ill-shaped boundary data, or a velocity field without
    /// two components.
    pub fn new(
        space: &DgSpace,
        param: &ConvDiffParameters,
        bc: BoundaryDescriptor,
        velocity: Option<FunctionPtr>,
        source: Option<FunctionPtr>,
    ) -> Result<Self> {
        param.check()?;
        bc.verify(&space.grid, 1, "scalar")?;
        if let Some(b) = &velocity {
            if b.n_components() != 2 {
                return Err(DgError::Config(format!(
                    "transport velocity has {} components, expected 2",
                    b.n_components()
                )));
            }
        }
        let diffusion = (param.diffusivity > 0.)
            .then(|| LaplaceOperator::new(space, bc.clone(), param.diffusivity, param.ip_factor));
        Ok(Self {
            space: space.clone(),
            mass: MassOperator::new(space),
            transport: velocity.map(|b| TransportOperator::new(space, b, bc)),
            diffusion,
            source: source.map(|f| BodyForceOperator::new(space, f)),
        })
    }

    /// $ dst = C(src, t) $ including the inflow data, zero without velocity
    pub fn evaluate_convective_term(&self, dst: &mut DofVector, src: &DofVector, time: f64) {
        match &self.transport {
            Some(transport) => transport.evaluate(dst, src, time),
            None => dst.fill(0.),
        }
    }

    /// Add source term and boundary data at `time`. The inflow data of
    /// the transport term is added only if it is part of the implicit
    /// system.
    pub fn rhs_add(&self, dst: &mut DofVector, time: f64, treatment: TreatmentOfConvectiveTerm) {
        if let Some(source) = &self.source {
            source.evaluate_add(dst, time);
        }
        if let Some(diffusion) = &self.diffusion {
            diffusion.rhs_add(dst, time);
        }
        if treatment == TreatmentOfConvectiveTerm::Implicit {
            if let Some(transport) = &self.transport {
                transport.rhs_add(dst, time);
            }
        }
    }

    /// Homogeneous system $ \sigma M + K + C_0(t) $ of an implicit step
    pub fn system(
        &self,
        scaling_factor: f64,
        time: f64,
        treatment: TreatmentOfConvectiveTerm,
    ) -> ConvDiffSystem<'_> {
        let transport = match treatment {
            TreatmentOfConvectiveTerm::Implicit => self.transport.as_ref().map(|t| t.at(time)),
            TreatmentOfConvectiveTerm::Explicit => None,
        };
        ConvDiffSystem {
            op: self,
            scaling_factor,
            transport,
        }
    }

    /// True if the implicit system is only the scaled mass matrix
    pub fn is_mass_only(&self, treatment: TreatmentOfConvectiveTerm) -> bool {
        self.diffusion.is_none()
            && (treatment == TreatmentOfConvectiveTerm::Explicit || self.transport.is_none())
    }

    /// $ dst \mathrel{+}= K src $, nothing without diffusion
    pub fn diffusion_apply_add(&self, dst: &mut DofVector, src: &DofVector) {
        if let Some(diffusion) = &self.diffusion {
            apply_add(diffusion, src, dst);
        }
    }
}

/// Linear system of one implicit time step
pub struct ConvDiffSystem<'a> {
    op: &'a ConvDiffOperator,
    scaling_factor: f64,
    transport: Option<TransportAt<'a>>,
}

impl CellKernel for ConvDiffSystem<'_> {
    fn row_space(&self) -> &DgSpace {
        &self.op.space
    }

    fn cell_apply(&self, cell: usize, src: &DofVector, dst: &mut [f64]) {
        self.op.mass.cell_apply(cell, src, dst);
        dst.iter_mut().for_each(|x| *x *= self.scaling_factor);
        let mut tmp = vec![0.; dst.len()];
        if let Some(diffusion) = &self.op.diffusion {
            diffusion.cell_apply(cell, src, &mut tmp);
            dst.iter_mut().zip(&tmp).for_each(|(d, t)| *d += t);
        }
        if let Some(transport) = &self.transport {
            transport.cell_apply(cell, src, &mut tmp);
            dst.iter_mut().zip(&tmp).for_each(|(d, t)| *d += t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{constant_function, from_fn};
    use crate::grid::Grid;
    use crate::operators::apply;
    use std::sync::Arc;

    #[test]
    fn test_system_matches_parts() {
        let grid = Arc::new(Grid::hyper_cube(1, 0., 1.));
        let space = DgSpace::new(grid, 2, 1);
        let mut param = ConvDiffParameters::default();
        param.diffusivity = 0.2;
        param.treatment_of_convective_term = TreatmentOfConvectiveTerm::Implicit;
        let bc = BoundaryDescriptor::new().with_dirichlet(0, from_fn(1, |p, _, _| p[0]));
        let op = ConvDiffOperator::new(
            &space,
            &param,
            bc,
            Some(constant_function(&[1., -0.5])),
            None,
        )
        .unwrap();
        let u = DofVector::from_shape_fn(space.n_dofs(), |i| ((i * 5) as f64).sin());
        let sigma = 3.;
        let mut full = space.zero_vector();
        apply(
            &op.system(sigma, 0.1, TreatmentOfConvectiveTerm::Implicit),
            &u,
            &mut full,
        );

        let mut parts = space.zero_vector();
        apply(&op.mass, &u, &mut parts);
        parts *= sigma;
        op.diffusion_apply_add(&mut parts, &u);
        let transport = op.transport.as_ref().unwrap();
        apply_add(&transport.at(0.1), &u, &mut parts);
        for (a, b) in full.iter().zip(parts.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(!op.is_mass_only(TreatmentOfConvectiveTerm::Explicit));
    }

    #[test]
    fn test_missing_boundary_data() {
        let grid = Arc::new(Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]));
        let space = DgSpace::new(grid, 1, 1);
        let param = ConvDiffParameters::default();
        let bc = BoundaryDescriptor::new().with_dirichlet(0, constant_function(&[0.]));
        assert!(ConvDiffOperator::new(&space, &param, bc, None, None).is_err());
    }
}
