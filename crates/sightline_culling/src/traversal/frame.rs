//! Local cell space of a traversal.
//!
//! World positions are divided by the cell size and re-labelled as
//! (slice, row, column). Axes along which the region direction is
//! negative are mirrored, so inside the traversal every axis is walked
//! from low to high and front-to-back is simply "increasing slice".

use sightline_core::Vec3;

use crate::grid::{CellIndex, CellRange, GridVolume};

/// Slot of the slice axis in local coordinates.
pub(crate) const SLICE: usize = 0;
/// Slot of the row axis in local coordinates.
pub(crate) const ROW: usize = 1;
/// Slot of the column axis in local coordinates.
pub(crate) const COLUMN: usize = 2;

/// Mapping between world/grid coordinates and local cell space.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CellFrame {
    /// World axis for each local slot (slice, row, column).
    axes: [usize; 3],
    /// Mirror flag per world axis.
    mirrored: [bool; 3],
    /// Cell size per world axis.
    cell_size: [f32; 3],
    /// Cell count per world axis.
    cell_number: [u32; 3],
}

impl CellFrame {
    pub(crate) fn new(grid: &GridVolume, axes: [usize; 3], direction_sign: [i8; 3]) -> Self {
        Self {
            axes,
            mirrored: direction_sign.map(|s| s < 0),
            cell_size: grid.cell_dimensions().to_array(),
            cell_number: grid.cell_number(),
        }
    }

    /// World position to local cell-space coordinates.
    pub(crate) fn to_local(&self, p: Vec3) -> [f32; 3] {
        self.axes.map(|axis| {
            let v = p.axis(axis) / self.cell_size[axis];
            if self.mirrored[axis] {
                self.cell_number[axis] as f32 - v
            } else {
                v
            }
        })
    }

    /// Inclusive local cell limits of a grid range, per local slot.
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn local_limits(&self, range: &CellRange) -> [(i32, i32); 3] {
        self.axes.map(|axis| {
            let lo = range.min.axis(axis) as i32;
            let hi = range.max.axis(axis) as i32;
            if self.mirrored[axis] {
                let last = self.cell_number[axis] as i32 - 1;
                (last - hi, last - lo)
            } else {
                (lo, hi)
            }
        })
    }

    /// Local cell (slice, row, column) back to a grid cell.
    ///
    /// Callers only pass cells inside the limits from `local_limits`.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub(crate) fn to_cell(&self, local: [i32; 3]) -> CellIndex {
        let mut out = [0u32; 3];
        for (slot, &axis) in self.axes.iter().enumerate() {
            let v = if self.mirrored[axis] {
                self.cell_number[axis] as i32 - 1 - local[slot]
            } else {
                local[slot]
            };
            debug_assert!(v >= 0 && (v as u32) < self.cell_number[axis]);
            out[axis] = v as u32;
        }
        CellIndex::from_array(out)
    }
}

/// Floor as an integer cell coordinate (saturating).
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn floor_cell(v: f32) -> i32 {
    v.floor() as i32
}

/// Ceiling as an integer cell coordinate (saturating).
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn ceil_cell(v: f32) -> i32 {
    v.ceil() as i32
}

/// Cells touched by the closed interval `[min, max]`.
///
/// A cell counts when it overlaps the interval with positive length, so a
/// maximum sitting exactly on a cell boundary does not pull in the next
/// cell. A zero-length interval still yields the cell containing it.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub(crate) fn cell_span(min: f32, max: f32) -> (i32, i32) {
    let first = floor_cell(min);
    let last = if max > min && max.floor() == max {
        max as i32 - 1
    } else {
        floor_cell(max)
    };
    (first, last.max(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_span_boundaries() {
        assert_eq!(cell_span(0.0, 4.0), (0, 3));
        assert_eq!(cell_span(0.25, 0.75), (0, 0));
        assert_eq!(cell_span(1.0, 1.0), (1, 1));
        assert_eq!(cell_span(0.5, 2.5), (0, 2));
        assert_eq!(cell_span(-1.5, -0.5), (-2, -1));
    }

    #[test]
    fn test_mirrored_axis_round_trip() {
        let grid = GridVolume::new(Vec3::new(2.0, 1.0, 1.0), [4, 3, 2]).unwrap();
        let frame = CellFrame::new(&grid, [0, 1, 2], [-1, 1, 1]);

        // world x = 1.0 is cell 0; mirrored it is local cell 3
        let local = frame.to_local(Vec3::new(1.0, 0.5, 0.5));
        assert!((local[SLICE] - 3.5).abs() < 1e-6);
        assert_eq!(frame.to_cell([3, 0, 0]), CellIndex::new(0, 0, 0));
        assert_eq!(frame.to_cell([0, 2, 1]), CellIndex::new(3, 2, 1));

        let limits = frame.local_limits(&grid.full_range());
        assert_eq!(limits, [(0, 3), (0, 2), (0, 1)]);
    }

    #[test]
    fn test_axes_are_permuted() {
        let grid = GridVolume::new(Vec3::ONE, [2, 3, 4]).unwrap();
        let frame = CellFrame::new(&grid, [2, 0, 1], [1, 1, 1]);
        let local = frame.to_local(Vec3::new(0.5, 1.5, 2.5));
        assert_eq!(local, [2.5, 0.5, 1.5]);
        assert_eq!(frame.to_cell([3, 1, 2]), CellIndex::new(1, 2, 3));
    }
}
