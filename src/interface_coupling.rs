//! # Data transfer between non-matching grids
//!
//! A destination discretization exposes the quadrature points of its
//! coupling boundaries in a [`ContainerInterfaceData`]. [`InterfaceCoupling`]
//! locates these points once in a source grid and afterwards evaluates
//! source fields there on every [`InterfaceCoupling::update_data`].
//! The destination reads the values back as boundary data through
//! [`InterfaceFunction`].
//!
//! # Example
//! ```
//! use rustdg::fe::DgSpace;
//! use rustdg::functions::{from_fn, interpolate};
//! use rustdg::grid::Grid;
//! use rustdg::interface_coupling::{ContainerInterfaceData, InterfaceCoupling};
//! use std::sync::Arc;
//!
//! let dst = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 1.)), 2, 1);
//! let src = DgSpace::new(Arc::new(Grid::hyper_cube(2, 0., 1.)), 1, 1);
//! let container = ContainerInterfaceData::setup(&dst, &[0].into_iter().collect(), 1).shared();
//! let coupling = InterfaceCoupling::setup(container.clone(), &src, &[], 1e-10).unwrap();
//! let field = interpolate(&src, from_fn(1, |p, _, _| p[0] + p[1]).as_ref(), 0.);
//! coupling.update_data(&field).unwrap();
//! let data = container.read().unwrap();
//! let [x, y] = data.q_points()[0];
//! assert!((data.solution(0)[0] - (x + y)).abs() < 1e-12);
//! ```
use crate::error::{DgError, Result};
use crate::fe::DgSpace;
use crate::functions::Function;
use crate::grid::{BoundaryId, FaceNeighbor, FACES_PER_CELL};
use crate::types::{DofVector, Point};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Container shared between the coupling and the destination side
pub type SharedInterfaceData = Arc<RwLock<ContainerInterfaceData>>;

/// Quadrature points of the coupling boundaries of a destination space
/// and the solution values transferred to them
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInterfaceData {
    n_components: usize,
    boundary_ids: BTreeSet<BoundaryId>,
    /// `(cell, face, q)` of every point
    faces: Vec<(usize, usize, usize)>,
    points: Vec<Point>,
    /// `solution[point * n_components + comp]`
    solution: Vec<f64>,
    lookup: BTreeMap<[u64; 2], usize>,
}

impl ContainerInterfaceData {
    /// Collect the face quadrature points of `space` on `boundary_ids`.
    /// Values have `n_components` components and are zero until updated.
    pub fn setup(space: &DgSpace, boundary_ids: &BTreeSet<BoundaryId>, n_components: usize) -> Self {
        let mut faces = Vec::new();
        let mut points = Vec::new();
        for cell in 0..space.grid.n_active_cells() {
            for face in 0..FACES_PER_CELL {
                match space.grid.neighbor(cell, face) {
                    FaceNeighbor::Boundary(id) if boundary_ids.contains(&id) => {
                        for q in 0..space.n_1d() {
                            faces.push((cell, face, q));
                            points.push(space.face_point(cell, face, q));
                        }
                    }
                    _ => {}
                }
            }
        }
        let lookup = points
            .iter()
            .enumerate()
            .map(|(i, p)| ([p[0].to_bits(), p[1].to_bits()], i))
            .collect();
        log::debug!(
            "interface data: {} points on boundaries {:?}",
            points.len(),
            boundary_ids
        );
        Self {
            n_components,
            boundary_ids: boundary_ids.clone(),
            solution: vec![0.; points.len() * n_components],
            faces,
            points,
            lookup,
        }
    }

    /// Wrap for sharing between coupling and boundary functions
    pub fn shared(self) -> SharedInterfaceData {
        Arc::new(RwLock::new(self))
    }

    /// Number of components of the transferred field
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Coupling boundary ids
    pub fn boundary_ids(&self) -> &BTreeSet<BoundaryId> {
        &self.boundary_ids
    }

    /// All destination points
    pub fn q_points(&self) -> &[Point] {
        &self.points
    }

    /// `(cell, face, q)` of all destination points
    pub fn faces(&self) -> &[(usize, usize, usize)] {
        &self.faces
    }

    /// Values at point `i`
    pub fn solution(&self, i: usize) -> &[f64] {
        &self.solution[i * self.n_components..(i + 1) * self.n_components]
    }

    /// Mutable values of all points
    pub fn solution_mut(&mut self) -> &mut [f64] {
        &mut self.solution
    }

    /// Index of the point with exactly the coordinates `p`
    pub fn find_point(&self, p: Point) -> Option<usize> {
        self.lookup.get(&[p[0].to_bits(), p[1].to_bits()]).copied()
    }
}

fn read(data: &SharedInterfaceData) -> RwLockReadGuard<'_, ContainerInterfaceData> {
    data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(data: &SharedInterfaceData) -> RwLockWriteGuard<'_, ContainerInterfaceData> {
    data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Boundary data read from an interface container. Points that are not
/// destination points evaluate to zero.
pub struct InterfaceFunction {
    data: SharedInterfaceData,
    n_components: usize,
}

impl InterfaceFunction {
    /// Function view on `data`
    pub fn new(data: SharedInterfaceData) -> Self {
        let n_components = read(&data).n_components;
        Self { data, n_components }
    }
}

impl Function for InterfaceFunction {
    fn n_components(&self) -> usize {
        self.n_components
    }

    fn value(&self, p: Point, _t: f64, comp: usize) -> f64 {
        let data = read(&self.data);
        match data.find_point(p) {
            Some(i) => data.solution(i)[comp],
            None => 0.,
        }
    }
}

/// Evaluates a source field at the points of a destination container
pub struct InterfaceCoupling {
    dst: SharedInterfaceData,
    src_space: DgSpace,
    /// Source cell and reference coordinates of every destination point
    locations: Vec<(usize, [f64; 2])>,
}

impl InterfaceCoupling {
    /// Locate all destination points in the grid of `src_space`.
    ///
    /// `marked_vertices` restricts the search to cells touching a marked
    /// source vertex, an empty slice searches the whole grid. `tolerance`
    /// is the geometric tolerance relative to the cell size.
    ///
    /// # Errors
    /// Component mismatch, or a destination point outside the candidate
    /// source cells.
    pub fn setup(
        dst: SharedInterfaceData,
        src_space: &DgSpace,
        marked_vertices: &[bool],
        tolerance: f64,
    ) -> Result<Self> {
        let candidates = if marked_vertices.is_empty() {
            None
        } else {
            Some(src_space.grid.cells_at_vertices(marked_vertices))
        };
        let locations = {
            let data = read(&dst);
            if data.n_components != src_space.n_components {
                return Err(DgError::Config(format!(
                    "interface data has {} components, source field {}",
                    data.n_components, src_space.n_components
                )));
            }
            data.points
                .iter()
                .map(|p| src_space.grid.find_cell(*p, candidates.as_ref(), tolerance))
                .collect::<Result<Vec<_>>>()?
        };
        log::info!(
            "interface coupling: {} points located in {} candidate cells",
            locations.len(),
            candidates
                .as_ref()
                .map_or(src_space.grid.n_active_cells(), BTreeSet::len)
        );
        Ok(Self {
            dst,
            src_space: src_space.clone(),
            locations,
        })
    }

    /// Evaluate `src` at all destination points and store the values in
    /// the container
    ///
    /// # Errors
    /// `src` does not belong to the source space.
    pub fn update_data(&self, src: &DofVector) -> Result<()> {
        if src.len() != self.src_space.n_dofs() {
            return Err(DgError::Config(format!(
                "source vector has length {}, expected {}",
                src.len(),
                self.src_space.n_dofs()
            )));
        }
        let values: Vec<Vec<f64>> = self
            .locations
            .par_iter()
            .map(|(cell, xi)| self.src_space.evaluate(src, *cell, *xi))
            .collect();
        let mut data = write(&self.dst);
        for (out, v) in data.solution_mut().chunks_mut(self.src_space.n_components).zip(values) {
            out.copy_from_slice(&v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{from_fn, interpolate, FunctionPtr};
    use crate::grid::Grid;

    fn approx_eq(result: f64, expected: f64) {
        let dif = (result - expected).abs();
        if dif > 1e-12 {
            panic!("Large difference of values, got {} expected {}.", result, expected)
        }
    }

    fn linear_field() -> FunctionPtr {
        from_fn(2, |p, _, c| if c == 0 { 1. + 2. * p[0] - p[1] } else { 0.5 * p[1] })
    }

    #[test]
    fn test_linear_field_is_transferred_exactly() {
        let dst_grid = Arc::new(Grid::hyper_rectangle([2, 5], [0., 0.], [1., 1.]).with_boundary_ids([0, 1, 0, 0]));
        let dst = DgSpace::new(dst_grid, 2, 2);
        let src = DgSpace::new(Arc::new(Grid::hyper_rectangle([3, 3], [0., 0.], [1., 1.])), 1, 2);
        let container = ContainerInterfaceData::setup(&dst, &[1].into_iter().collect(), 2).shared();
        assert_eq!(read(&container).q_points().len(), 5 * 3);

        // only the cells at x = 1 are searched
        let marked: Vec<bool> = (0..src.grid.n_vertices())
            .map(|v| (src.grid.vertex(v)[0] - 1.).abs() < 1e-12)
            .collect();
        let coupling = InterfaceCoupling::setup(container.clone(), &src, &marked, 1e-8).unwrap();
        let field = interpolate(&src, linear_field().as_ref(), 0.);
        coupling.update_data(&field).unwrap();

        let data = read(&container);
        for (i, p) in data.q_points().iter().enumerate() {
            approx_eq(data.solution(i)[0], 1. + 2. * p[0] - p[1]);
            approx_eq(data.solution(i)[1], 0.5 * p[1]);
        }

        let f = InterfaceFunction::new(container.clone());
        let p = data.q_points()[4];
        approx_eq(f.value(p, 0., 1), 0.5 * p[1]);
        approx_eq(f.value([0.3, 0.3], 0., 0), 0.);
    }

    #[test]
    fn test_unmatched_point_is_an_error() {
        let dst = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 2.)), 1, 1);
        let src = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 1.)), 1, 1);
        let container = ContainerInterfaceData::setup(&dst, &[0].into_iter().collect(), 1).shared();
        let result = InterfaceCoupling::setup(container, &src, &[], 1e-8);
        assert!(matches!(result, Err(DgError::Geometry(_))));
    }

    #[test]
    fn test_component_mismatch() {
        let dst = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 1.)), 1, 1);
        let src = DgSpace::new(Arc::new(Grid::hyper_cube(1, 0., 1.)), 1, 2);
        let container = ContainerInterfaceData::setup(&dst, &[0].into_iter().collect(), 1).shared();
        assert!(InterfaceCoupling::setup(container, &src, &[], 1e-8).is_err());
    }
}
