//! Boundary conditions of velocity and pressure
use super::parameters::InputParameters;
use crate::error::{DgError, Result};
use crate::grid::Grid;
use crate::operators::BoundaryDescriptor;

/// Velocity and pressure boundary descriptors.
///
/// Every boundary id carries either velocity Dirichlet data (and pressure
/// Neumann data, unused by the splitting schemes) or pressure Dirichlet
/// data (and velocity Neumann data, the viscous traction).
#[derive(Clone, Default)]
pub struct FlowBoundaryDescriptor {
    /// Velocity boundary data, two components
    pub velocity: BoundaryDescriptor,
    /// Pressure boundary data, one component
    pub pressure: BoundaryDescriptor,
}

impl FlowBoundaryDescriptor {
    /// Check completeness and complementarity on `grid`
    ///
    /// # Errors
    /// A boundary id without data, or velocity and pressure both Dirichlet
    /// or both Neumann on the same id.
    pub fn verify(&self, grid: &Grid) -> Result<()> {
        self.velocity.verify(grid, 2, "velocity")?;
        self.pressure.verify(grid, 1, "pressure")?;
        for id in grid.boundary_ids_used() {
            if self.velocity.is_dirichlet(id) == self.pressure.is_dirichlet(id) {
                return Err(DgError::Config(format!(
                    "boundary id {}: velocity Dirichlet requires pressure Neumann and vice versa",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Pressure operators are singular if requested through
    /// `pure_dirichlet_bc`, for every scheme.
    pub fn operator_is_singular(&self, param: &InputParameters) -> bool {
        let from_bc = self.pressure.is_pure_neumann();
        if from_bc != param.pure_dirichlet_bc {
            log::warn!(
                "pure_dirichlet_bc = {} but the pressure boundary conditions are {}pure Neumann",
                param.pure_dirichlet_bc,
                if from_bc { "" } else { "not " }
            );
        }
        param.pure_dirichlet_bc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{constant_function, zero_function};

    #[test]
    fn test_verify_complementary_conditions() {
        let grid = Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]);
        let mut bc = FlowBoundaryDescriptor::default();
        bc.velocity = BoundaryDescriptor::new()
            .with_dirichlet(0, zero_function(2))
            .with_neumann(1, zero_function(2));
        bc.pressure = BoundaryDescriptor::new()
            .with_neumann(0, zero_function(1))
            .with_dirichlet(1, constant_function(&[1.]));
        assert!(bc.verify(&grid).is_ok());
        assert!(!bc.operator_is_singular(&InputParameters::default()));

        bc.pressure = BoundaryDescriptor::new()
            .with_neumann(0, zero_function(1))
            .with_neumann(1, zero_function(1));
        assert!(bc.verify(&grid).is_err());
    }
}
