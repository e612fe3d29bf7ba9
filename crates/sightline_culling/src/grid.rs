//! Uniform 3D cell partition of the world.
//!
//! The grid starts at the world origin. Every world position maps to a
//! cell by per-axis floor division; positions outside the volume are
//! clamped onto the nearest boundary cell rather than rejected, so nodes
//! that poke out of the world still get a (degenerate) cell assignment.

use sightline_core::{Aabb, Vec3};

use crate::error::GridError;

/// Integer coordinates of a grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    /// Cell along x.
    pub x: u32,
    /// Cell along y.
    pub y: u32,
    /// Cell along z.
    pub z: u32,
}

impl CellIndex {
    /// Creates a cell index.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(a: [u32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Coordinate along `axis`.
    #[inline]
    #[must_use]
    pub fn axis(self, axis: usize) -> u32 {
        self.to_array()[axis]
    }
}

/// Inclusive box of cell indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Lowest cell on every axis.
    pub min: CellIndex,
    /// Highest cell on every axis (inclusive).
    pub max: CellIndex,
}

impl CellRange {
    /// Creates a range. A range inverted on any axis is empty.
    #[must_use]
    pub const fn new(min: CellIndex, max: CellIndex) -> Self {
        Self { min, max }
    }

    /// True if `cell` lies inside the range.
    #[must_use]
    pub fn contains(&self, cell: CellIndex) -> bool {
        (0..3).all(|a| cell.axis(a) >= self.min.axis(a) && cell.axis(a) <= self.max.axis(a))
    }

    /// Number of cells in the range.
    #[must_use]
    pub fn len(&self) -> usize {
        (0..3)
            .map(|a| match self.max.axis(a).checked_sub(self.min.axis(a)) {
                Some(span) => span as usize + 1,
                None => 0,
            })
            .product()
    }

    /// True if `min` exceeds `max` on some axis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|a| self.min.axis(a) > self.max.axis(a))
    }

    /// All cells of the range, x varying fastest.
    pub fn iter(&self) -> impl Iterator<Item = CellIndex> {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |z| {
            (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| CellIndex::new(x, y, z)))
        })
    }
}

/// The uniform grid covering the world.
///
/// Immutable after construction and owned by the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct GridVolume {
    /// World size of one cell.
    cell_dimensions: Vec3,
    /// Number of cells per axis.
    cell_number: [u32; 3],
    /// World bounds of the whole grid.
    volume_bounds: Aabb,
    /// Cached `x * y * z`.
    cell_count: usize,
}

impl GridVolume {
    /// Creates a grid of `cell_number` cells, each `cell_dimensions` large.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if an axis has no cells, a cell size is not a
    /// positive finite number, or the cell count overflows `usize`.
    pub fn new(cell_dimensions: Vec3, cell_number: [u32; 3]) -> Result<Self, GridError> {
        for axis in 0..3 {
            if cell_number[axis] == 0 {
                return Err(GridError::ZeroCellCount { axis });
            }
            let size = cell_dimensions.axis(axis);
            if !(size.is_finite() && size > 0.0) {
                return Err(GridError::InvalidCellSize { axis, size });
            }
        }

        let cell_count = cell_number
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n as usize))
            .ok_or(GridError::TooManyCells {
                x: cell_number[0],
                y: cell_number[1],
                z: cell_number[2],
            })?;

        let extent = Vec3::new(
            cell_dimensions.x * cell_number[0] as f32,
            cell_dimensions.y * cell_number[1] as f32,
            cell_dimensions.z * cell_number[2] as f32,
        );

        Ok(Self {
            cell_dimensions,
            cell_number,
            volume_bounds: Aabb::new(Vec3::ZERO, extent),
            cell_count,
        })
    }

    /// World size of one cell.
    #[must_use]
    pub const fn cell_dimensions(&self) -> Vec3 {
        self.cell_dimensions
    }

    /// Number of cells per axis.
    #[must_use]
    pub const fn cell_number(&self) -> [u32; 3] {
        self.cell_number
    }

    /// World bounds of the whole grid.
    #[must_use]
    pub const fn volume_bounds(&self) -> Aabb {
        self.volume_bounds
    }

    /// Total number of cells.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Range covering every cell.
    #[must_use]
    pub fn full_range(&self) -> CellRange {
        let [nx, ny, nz] = self.cell_number;
        CellRange::new(CellIndex::new(0, 0, 0), CellIndex::new(nx - 1, ny - 1, nz - 1))
    }

    /// Cell containing `world_pos`, clamped to the volume.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cell_index_of(&self, world_pos: Vec3) -> CellIndex {
        let mut out = [0u32; 3];
        for (axis, slot) in out.iter_mut().enumerate() {
            let cells = (world_pos.axis(axis) / self.cell_dimensions.axis(axis)).floor();
            let last = (self.cell_number[axis] - 1) as f32;
            // NaN lands on 0 through max()
            *slot = cells.max(0.0).min(last) as u32;
        }
        CellIndex::from_array(out)
    }

    /// Flat storage index: `x + nx * (y + ny * z)`.
    #[inline]
    #[must_use]
    pub fn cell_array_index(&self, cell: CellIndex) -> usize {
        debug_assert!(self.full_range().contains(cell), "cell {cell:?} outside grid");
        let [nx, ny, _] = self.cell_number;
        cell.x as usize + nx as usize * (cell.y as usize + ny as usize * cell.z as usize)
    }

    /// Inverse of [`GridVolume::cell_array_index`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn cell_from_array_index(&self, index: usize) -> CellIndex {
        debug_assert!(index < self.cell_count, "array index {index} outside grid");
        let nx = self.cell_number[0] as usize;
        let ny = self.cell_number[1] as usize;
        CellIndex::new(
            (index % nx) as u32,
            ((index / nx) % ny) as u32,
            (index / (nx * ny)) as u32,
        )
    }

    /// Cells overlapped by a world box, clamped to the volume.
    #[must_use]
    pub fn cell_range_of(&self, world_box: &Aabb) -> CellRange {
        let a = self.cell_index_of(world_box.min);
        let b = self.cell_index_of(world_box.max);
        CellRange::new(
            CellIndex::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            CellIndex::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        )
    }

    /// World bounds of one cell.
    #[must_use]
    pub fn cell_bounds(&self, cell: CellIndex) -> Aabb {
        let min = Vec3::new(
            cell.x as f32 * self.cell_dimensions.x,
            cell.y as f32 * self.cell_dimensions.y,
            cell.z as f32 * self.cell_dimensions.z,
        );
        Aabb::new(min, min + self.cell_dimensions)
    }

    /// World center of one cell.
    #[must_use]
    pub fn cell_center(&self, cell: CellIndex) -> Vec3 {
        self.cell_bounds(cell).center()
    }
}
