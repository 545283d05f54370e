//! Structured Cartesian grid in two dimensions
//!
//! Cells are numbered lexicographically, `cell = ix + nx * iy`.
//! The four faces of a cell are numbered
//! `0: -x`, `1: +x`, `2: -y`, `3: +y`, which also indexes the
//! boundary ids of the domain sides.
//!
//! # Example
//! ```
//! use rustdg::grid::{FaceNeighbor, Grid};
//! let grid = Grid::hyper_rectangle([4, 2], [0., 0.], [2., 1.]).with_periodicity(0);
//! assert_eq!(grid.n_active_cells(), 8);
//! // periodic in x: left neighbor of cell 0 is the last cell in the row
//! assert_eq!(grid.neighbor(0, 0), FaceNeighbor::Interior(3));
//! assert_eq!(grid.neighbor(0, 2), FaceNeighbor::Boundary(2));
//! ```
use crate::error::{DgError, Result};
use crate::types::Point;
use std::collections::BTreeSet;

/// Boundary identifier
pub type BoundaryId = u32;

/// Number of faces per cell
pub const FACES_PER_CELL: usize = 4;

/// Outer side of a cell face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceNeighbor {
    /// Face shared with another cell
    Interior(usize),
    /// Face on the domain boundary
    Boundary(BoundaryId),
}

/// Direction of the face normal and which side of the cell the face is on
///
/// Returns `(direction, side)`, `side == 0` for the lower face.
pub const fn face_direction(face: usize) -> (usize, usize) {
    (face / 2, face % 2)
}

/// Sign of the outer normal of `face` along its direction
pub fn face_normal_sign(face: usize) -> f64 {
    if face % 2 == 0 {
        -1.
    } else {
        1.
    }
}

/// Face of the neighbor that coincides with `face`
pub const fn opposite_face(face: usize) -> usize {
    face ^ 1
}

/// Axis aligned rectangle, divided into `n_cells[0] x n_cells[1]` cells
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Number of cells per direction
    pub n_cells: [usize; 2],
    /// Lower left corner
    pub lower: Point,
    /// Upper right corner
    pub upper: Point,
    /// Cell size per direction
    pub h: [f64; 2],
    /// Periodicity per direction
    pub periodic: [bool; 2],
    /// Boundary ids of the sides \[left, right, bottom, top\]
    pub boundary_ids: [BoundaryId; 4],
}

impl Grid {
    /// Rectangle with boundary ids `0, 1, 2, 3` on the left, right,
    /// bottom and top side.
    ///
    /// # Panics
    /// Zero cells or an empty extent.
    pub fn hyper_rectangle(n_cells: [usize; 2], lower: Point, upper: Point) -> Self {
        assert!(n_cells[0] > 0 && n_cells[1] > 0, "grid needs cells");
        assert!(
            upper[0] > lower[0] && upper[1] > lower[1],
            "grid extent must be positive"
        );
        let h = [
            (upper[0] - lower[0]) / n_cells[0] as f64,
            (upper[1] - lower[1]) / n_cells[1] as f64,
        ];
        Self {
            n_cells,
            lower,
            upper,
            h,
            periodic: [false; 2],
            boundary_ids: [0, 1, 2, 3],
        }
    }

    /// Square `[left, right]^2` with `2^n_refine` cells per direction,
    /// all sides carry boundary id 0
    pub fn hyper_cube(n_refine: usize, left: f64, right: f64) -> Self {
        let n = 1 << n_refine;
        Self::hyper_rectangle([n, n], [left, left], [right, right]).with_boundary_ids([0; 4])
    }

    /// Reassign the boundary ids of the four sides
    pub fn with_boundary_ids(mut self, ids: [BoundaryId; 4]) -> Self {
        self.boundary_ids = ids;
        self
    }

    /// Make direction `dir` periodic
    pub fn with_periodicity(mut self, dir: usize) -> Self {
        self.periodic[dir] = true;
        self
    }

    /// Total number of cells
    pub fn n_active_cells(&self) -> usize {
        self.n_cells[0] * self.n_cells[1]
    }

    /// Lexicographic cell index
    pub fn cell_index(&self, ix: usize, iy: usize) -> usize {
        ix + self.n_cells[0] * iy
    }

    /// Inverse of [`Grid::cell_index`]
    pub fn cell_coords(&self, cell: usize) -> [usize; 2] {
        [cell % self.n_cells[0], cell / self.n_cells[0]]
    }

    /// Lower left corner of a cell
    pub fn cell_lower(&self, cell: usize) -> Point {
        let [ix, iy] = self.cell_coords(cell);
        [
            self.lower[0] + ix as f64 * self.h[0],
            self.lower[1] + iy as f64 * self.h[1],
        ]
    }

    /// Cell center
    pub fn cell_center(&self, cell: usize) -> Point {
        let p = self.cell_lower(cell);
        [p[0] + 0.5 * self.h[0], p[1] + 0.5 * self.h[1]]
    }

    /// Volume (area) of every cell
    pub fn cell_volume(&self) -> f64 {
        self.h[0] * self.h[1]
    }

    /// Cell behind `face`, or the boundary id if the face is on
    /// a non-periodic side of the domain
    pub fn neighbor(&self, cell: usize, face: usize) -> FaceNeighbor {
        let (dir, side) = face_direction(face);
        let mut c = self.cell_coords(cell);
        let n = self.n_cells[dir];
        if side == 0 {
            if c[dir] == 0 {
                if !self.periodic[dir] {
                    return FaceNeighbor::Boundary(self.boundary_ids[face]);
                }
                c[dir] = n - 1;
            } else {
                c[dir] -= 1;
            }
        } else if c[dir] == n - 1 {
            if !self.periodic[dir] {
                return FaceNeighbor::Boundary(self.boundary_ids[face]);
            }
            c[dir] = 0;
        } else {
            c[dir] += 1;
        }
        FaceNeighbor::Interior(self.cell_index(c[0], c[1]))
    }

    /// Boundary ids present on non-periodic sides
    pub fn boundary_ids_used(&self) -> BTreeSet<BoundaryId> {
        (0..FACES_PER_CELL)
            .filter(|f| !self.periodic[face_direction(*f).0])
            .map(|f| self.boundary_ids[f])
            .collect()
    }

    /// All boundary faces as `(cell, face, boundary_id)`, ordered by cell
    pub fn boundary_faces(&self) -> Vec<(usize, usize, BoundaryId)> {
        let mut faces = Vec::new();
        for cell in 0..self.n_active_cells() {
            for face in 0..FACES_PER_CELL {
                if let FaceNeighbor::Boundary(id) = self.neighbor(cell, face) {
                    faces.push((cell, face, id));
                }
            }
        }
        faces
    }

    /// Number of grid vertices
    pub fn n_vertices(&self) -> usize {
        (self.n_cells[0] + 1) * (self.n_cells[1] + 1)
    }

    /// Coordinates of vertex `v`, numbered lexicographically
    pub fn vertex(&self, v: usize) -> Point {
        let nvx = self.n_cells[0] + 1;
        [
            self.lower[0] + (v % nvx) as f64 * self.h[0],
            self.lower[1] + (v / nvx) as f64 * self.h[1],
        ]
    }

    /// Vertices of a cell, counter-clockwise from the lower left one
    pub fn cell_vertices(&self, cell: usize) -> [usize; 4] {
        let [ix, iy] = self.cell_coords(cell);
        let nvx = self.n_cells[0] + 1;
        let v0 = ix + nvx * iy;
        [v0, v0 + 1, v0 + 1 + nvx, v0 + nvx]
    }

    /// Reference coordinates in `[-1, 1]^2` of a physical point with
    /// respect to `cell`
    pub fn to_reference(&self, cell: usize, p: Point) -> [f64; 2] {
        let c = self.cell_center(cell);
        [
            2. * (p[0] - c[0]) / self.h[0],
            2. * (p[1] - c[1]) / self.h[1],
        ]
    }

    /// Find the cell containing `p` among `candidates` (all cells if `None`).
    ///
    /// `tolerance` is relative to the reference cell, points slightly outside
    /// a cell are accepted and their reference coordinates clamped.
    ///
    /// # Errors
    /// No candidate cell contains the point.
    pub fn find_cell(
        &self,
        p: Point,
        candidates: Option<&BTreeSet<usize>>,
        tolerance: f64,
    ) -> Result<(usize, [f64; 2])> {
        let limit = 1. + tolerance;
        let inside = |cell: usize| {
            let r = self.to_reference(cell, p);
            if r[0].abs() <= limit && r[1].abs() <= limit {
                Some((cell, [r[0].clamp(-1., 1.), r[1].clamp(-1., 1.)]))
            } else {
                None
            }
        };
        let found = match candidates {
            Some(cells) => cells.iter().find_map(|c| inside(*c)),
            None => (0..self.n_active_cells()).find_map(inside),
        };
        found.ok_or_else(|| {
            DgError::Geometry(format!(
                "point ({:.6e}, {:.6e}) not found in source grid",
                p[0], p[1]
            ))
        })
    }

    /// Cells touching any of the marked vertices
    pub fn cells_at_vertices(&self, marked_vertices: &[bool]) -> BTreeSet<usize> {
        (0..self.n_active_cells())
            .filter(|c| {
                self.cell_vertices(*c)
                    .iter()
                    .any(|v| marked_vertices.get(*v).copied().unwrap_or(false))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors() {
        let grid = Grid::hyper_rectangle([3, 2], [0., 0.], [3., 2.]);
        assert_eq!(grid.neighbor(0, 0), FaceNeighbor::Boundary(0));
        assert_eq!(grid.neighbor(0, 1), FaceNeighbor::Interior(1));
        assert_eq!(grid.neighbor(0, 3), FaceNeighbor::Interior(3));
        assert_eq!(grid.neighbor(5, 1), FaceNeighbor::Boundary(1));
        assert_eq!(grid.neighbor(5, 3), FaceNeighbor::Boundary(3));
        let grid = grid.with_periodicity(1);
        assert_eq!(grid.neighbor(5, 3), FaceNeighbor::Interior(2));
        assert_eq!(grid.boundary_ids_used(), [0, 1].into_iter().collect());
        let faces = grid.boundary_faces();
        assert_eq!(faces.len(), 4);
        assert_eq!(faces[0], (0, 0, 0));
        assert_eq!(faces[3], (5, 1, 1));
    }

    #[test]
    fn test_find_cell() {
        let grid = Grid::hyper_cube(2, -1., 1.);
        let (cell, r) = grid.find_cell([0.1, -0.6], None, 1e-10).unwrap();
        assert_eq!(cell, grid.cell_index(2, 0));
        assert!((r[0] - (-0.6)).abs() < 1e-12);
        assert!((r[1] - 0.6).abs() < 1e-12);
        assert!(grid.find_cell([1.5, 0.], None, 1e-10).is_err());
    }

    #[test]
    fn test_vertices() {
        let grid = Grid::hyper_rectangle([2, 2], [0., 0.], [1., 1.]);
        assert_eq!(grid.n_vertices(), 9);
        assert_eq!(grid.cell_vertices(3), [4, 5, 8, 7]);
        assert_eq!(grid.vertex(5), [1., 0.5]);
        let mut marked = vec![false; 9];
        marked[2] = true;
        assert_eq!(grid.cells_at_vertices(&marked), [1].into_iter().collect());
    }
}
