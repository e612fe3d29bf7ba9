//! # Slice Traversal
//!
//! Front-to-back enumeration of the grid cells touched by a convex region.
//!
//! ```text
//!  slice k      slice k+1     ...
//!   |  near       far  |
//!   |   o-----------o  |      1. active edges cut the boundary planes
//!   |  /  hull of    \ |      2. cuts + in-slab vertices -> convex hull
//!   | o   cuts and    o|      3. hull -> left/right chains, column clip
//!   |  \  vertices   / |      4. rows: left min .. right max per row
//!   |   o-----------o  |
//! ```
//!
//! Slices advance strictly along the axis most aligned with the region
//! direction, so the produced sequence is non-decreasing in depth. Each
//! (slice, row, column) triple is produced at most once. Cells the region
//! only touches along a face, edge or corner are not produced: a region
//! ending exactly on a cell boundary does not pull in the next cell.

mod frame;
mod hull;
mod raster;
mod section;

use std::fmt;
use std::iter::FusedIterator;

use crate::grid::{CellIndex, CellRange, GridVolume};
use crate::region::ConvexRegion;
use crate::stats::TraversalStats;

use frame::{cell_span, CellFrame, COLUMN, ROW, SLICE};
use hull::{build_chains, clip_chain, ChainClip};
use raster::{ChainWalker, Extreme};
use section::{SectionPoint, Slicer};

/// Callback invoked with every cell the traversal produces.
pub type TraceHook<'t> = &'t mut dyn FnMut(CellIndex);

/// Lazy, single-pass, forward-only sequence of grid cells inside a convex
/// region, ordered front to back.
///
/// Built per camera, viewport and frame; it cannot be rewound.
///
/// # Example
///
/// ```rust
/// use sightline_core::{Aabb, Vec3};
/// use sightline_culling::{ConvexRegion, GridVolume, SliceTraversal};
///
/// let grid = GridVolume::new(Vec3::ONE, [4, 4, 1]).unwrap();
/// let region = ConvexRegion::from_aabb(&grid.volume_bounds(), Vec3::X);
///
/// let mut traversal = SliceTraversal::new(&grid, &region, grid.full_range());
/// let mut count = 0;
/// while !traversal.at_end() {
///     let _cell = traversal.current_position();
///     traversal.forward();
///     count += 1;
/// }
/// assert_eq!(count, 16);
/// ```
pub struct SliceTraversal<'t> {
    frame: CellFrame,
    /// Inclusive local cell limits per slot (slice, row, column).
    limits: [(i32, i32); 3],
    slicer: Slicer,

    /// Cross-section at the near boundary of the current slice.
    near: Vec<SectionPoint>,
    /// Cross-section at the far boundary of the current slice.
    far: Vec<SectionPoint>,
    /// Boundary-vertex set of the current slice.
    points: Vec<SectionPoint>,
    left_hull: Vec<SectionPoint>,
    right_hull: Vec<SectionPoint>,
    left: Vec<SectionPoint>,
    right: Vec<SectionPoint>,
    left_walker: ChainWalker,
    right_walker: ChainWalker,

    first_slice: i32,
    last_slice: i32,
    slice: i32,
    /// Row extent of the current cross-section.
    row_extent: (f32, f32),
    row: i32,
    last_row: i32,
    col: i32,
    last_col: i32,

    finished: bool,
    trace: Option<TraceHook<'t>>,
    stats: TraversalStats,
}

impl<'t> SliceTraversal<'t> {
    /// Traversal of `region` restricted to the cells in `bounds`.
    ///
    /// `bounds` is clamped to the grid.
    #[must_use]
    pub fn new(grid: &GridVolume, region: &ConvexRegion, bounds: CellRange) -> Self {
        Self::build(grid, region, bounds, None)
    }

    /// Like [`SliceTraversal::new`], calling `trace` at every produced cell.
    #[must_use]
    pub fn with_trace(
        grid: &GridVolume,
        region: &ConvexRegion,
        bounds: CellRange,
        trace: TraceHook<'t>,
    ) -> Self {
        Self::build(grid, region, bounds, Some(trace))
    }

    fn build(
        grid: &GridVolume,
        region: &ConvexRegion,
        bounds: CellRange,
        trace: Option<TraceHook<'t>>,
    ) -> Self {
        let frame = CellFrame::new(grid, region.dimension_order(), region.direction_sign());
        let bounds = clamp_range(bounds, grid);
        let limits = frame.local_limits(&bounds);

        let local: Vec<[f32; 3]> = region.vertices().iter().map(|&v| frame.to_local(v)).collect();
        let slicer = Slicer::new(&local, region.edges());

        let (first_slice, last_slice) = slicer.extent().map_or((0, -1), |(lo, hi)| {
            let (first, last) = cell_span(lo, hi);
            (first.max(limits[SLICE].0), last.min(limits[SLICE].1))
        });

        let mut traversal = Self {
            frame,
            limits,
            slicer,
            near: Vec::new(),
            far: Vec::new(),
            points: Vec::new(),
            left_hull: Vec::new(),
            right_hull: Vec::new(),
            left: Vec::new(),
            right: Vec::new(),
            left_walker: ChainWalker::default(),
            right_walker: ChainWalker::default(),
            first_slice,
            last_slice,
            slice: first_slice - 1,
            row_extent: (0.0, 0.0),
            row: 0,
            last_row: -1,
            col: 0,
            last_col: -1,
            finished: first_slice > last_slice || bounds.is_empty(),
            trace,
            stats: TraversalStats::default(),
        };

        tracing::trace!(
            slice_axis = region.slice_axis(),
            first_slice,
            last_slice,
            "slice traversal prepared"
        );

        if !traversal.finished {
            traversal.slicer.section_at(first_slice, &mut traversal.near);
            traversal.advance();
        }
        traversal
    }

    /// True once every cell has been produced.
    #[inline]
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.finished
    }

    /// Moves to the next cell. Does nothing at the end.
    pub fn forward(&mut self) {
        if !self.finished {
            self.advance();
        }
    }

    /// The current cell.
    ///
    /// # Panics
    ///
    /// Panics when called after the end of the sequence.
    #[must_use]
    pub fn current_position(&self) -> CellIndex {
        assert!(!self.finished, "current_position called on a finished slice traversal");
        self.frame.to_cell([self.slice, self.row, self.col])
    }

    /// Counters collected so far.
    #[must_use]
    pub const fn stats(&self) -> TraversalStats {
        self.stats
    }

    fn advance(&mut self) {
        if self.col < self.last_col {
            self.col += 1;
            self.emit();
            return;
        }
        loop {
            while self.row < self.last_row {
                self.row += 1;
                if self.rasterize_row(self.row) {
                    self.emit();
                    return;
                }
            }
            if !self.next_slice() {
                self.finished = true;
                return;
            }
        }
    }

    fn next_slice(&mut self) -> bool {
        while self.slice < self.last_slice {
            self.slice += 1;
            if self.slice > self.first_slice {
                // Far boundary of the previous slice is this one's near boundary
                std::mem::swap(&mut self.near, &mut self.far);
            }
            self.stats.slices_visited += 1;
            if self.prepare_slice(self.slice) {
                return true;
            }
            self.stats.slices_skipped += 1;
        }
        false
    }

    /// Builds and clips the outline of slice `k`. False if it covers no cell.
    fn prepare_slice(&mut self, k: i32) -> bool {
        self.slicer.section_at(k + 1, &mut self.far);

        self.points.clear();
        self.points.extend_from_slice(&self.near);
        self.points.extend_from_slice(&self.far);
        self.slicer.collect_slab_vertices(k, &mut self.points);
        if self.points.is_empty() {
            return false;
        }

        build_chains(&mut self.points, &mut self.left_hull, &mut self.right_hull);
        let row_min = self.points[0].row;
        let row_max = self.points[self.points.len() - 1].row;

        let (first_row, last_row) = cell_span(row_min, row_max);
        let first_row = first_row.max(self.limits[ROW].0);
        let last_row = last_row.min(self.limits[ROW].1);
        if first_row > last_row {
            return false;
        }

        let (col_lo, col_hi) = column_bounds(self.limits[COLUMN]);
        if clip_chain(&self.left_hull, col_lo, col_hi, &mut self.left) == ChainClip::Above {
            return false;
        }
        if clip_chain(&self.right_hull, col_lo, col_hi, &mut self.right) == ChainClip::Below {
            return false;
        }

        self.row_extent = (row_min, row_max);
        self.row = first_row - 1;
        self.last_row = last_row;
        self.left_walker.reset();
        self.right_walker.reset();
        true
    }

    /// Computes the column run of row `j`. False if the row is empty.
    fn rasterize_row(&mut self, j: i32) -> bool {
        let lo = (j as f32).max(self.row_extent.0);
        let hi = ((j + 1) as f32).min(self.row_extent.1);

        let Some(left) = self.left_walker.extent(&self.left, lo, hi, Extreme::Min) else {
            return false;
        };
        let Some(right) = self.right_walker.extent(&self.right, lo, hi, Extreme::Max) else {
            return false;
        };
        // Clamped onto the low column bound: the row lies wholly below it
        if right <= self.limits[COLUMN].0 as f32 {
            return false;
        }

        let (first, last) = cell_span(left, right);
        let first = first.max(self.limits[COLUMN].0);
        let last = last.min(self.limits[COLUMN].1);
        if first > last {
            return false;
        }

        self.col = first;
        self.last_col = last;
        self.stats.rows_emitted += 1;
        true
    }

    fn emit(&mut self) {
        self.stats.cells_emitted += 1;
        if self.trace.is_some() {
            let cell = self.current_position();
            if let Some(trace) = &mut self.trace {
                trace(cell);
            }
        }
    }
}

/// Float column range covered by an inclusive cell range.
fn column_bounds((lo, hi): (i32, i32)) -> (f32, f32) {
    (lo as f32, (hi + 1) as f32)
}

fn clamp_range(range: CellRange, grid: &GridVolume) -> CellRange {
    let last = grid.full_range().max;
    let clamp = |c: CellIndex| CellIndex::new(c.x.min(last.x), c.y.min(last.y), c.z.min(last.z));
    CellRange::new(clamp(range.min), clamp(range.max))
}

impl Iterator for SliceTraversal<'_> {
    type Item = CellIndex;

    fn next(&mut self) -> Option<CellIndex> {
        if self.finished {
            return None;
        }
        let cell = self.current_position();
        self.advance();
        Some(cell)
    }
}

impl FusedIterator for SliceTraversal<'_> {}

impl fmt::Debug for SliceTraversal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceTraversal")
            .field("slice", &self.slice)
            .field("row", &self.row)
            .field("col", &self.col)
            .field("finished", &self.finished)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
