//! Temporal occlusion-query cache.
//!
//! Occlusion query results arrive a frame late. Instead of stalling, the
//! cache remembers per viewport and per cell (and per node) the frame up
//! to which the last answer holds, packed with the answer itself:
//!
//! ```text
//!  63  62                                                      0
//! ┌───┬─────────────────────────────────────────────────────────┐
//! │ V │                  frame (63 bits)                        │
//! └───┴─────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Visible** results hold for `success_duration` frames after harvest.
//! - **Hidden** results hold for `failure_duration` frames, never moving the
//!   expiry backwards.
//! - A visible result is still trusted one frame past its expiry, which is
//!   the frame the replacement query is in flight.

use sightline_core::PoolHandle;

/// High bit: the last harvested answer was "visible".
pub const VISIBLE_BIT: u64 = 1 << 63;

/// Low 63 bits: the frame counter.
pub const FRAME_MASK: u64 = !VISIBLE_BIT;

/// Masks a frame counter to 63 bits so it cannot touch the flag bit.
#[inline]
#[must_use]
pub const fn code_frame(frame: u64) -> u64 {
    frame & FRAME_MASK
}

/// The flag bit for a visibility answer.
#[inline]
#[must_use]
pub const fn encode_visible(visible: bool) -> u64 {
    if visible {
        VISIBLE_BIT
    } else {
        0
    }
}

/// The answer stored in a record.
#[inline]
#[must_use]
pub const fn decode_visible(record: u64) -> bool {
    record & VISIBLE_BIT != 0
}

/// The frame stored in a record.
#[inline]
#[must_use]
pub const fn decode_frame(record: u64) -> u64 {
    record & FRAME_MASK
}

/// Writes a harvested answer into a record.
#[inline]
fn apply_result(record: &mut u64, visible: bool, frame: u64, success_duration: u64, failure_duration: u64) {
    *record = if visible {
        encode_visible(true) | code_frame(frame.saturating_add(success_duration))
    } else {
        let expiry = decode_frame(*record).max(frame.saturating_add(failure_duration));
        encode_visible(false) | code_frame(expiry)
    };
}

/// True if the record says "render" at `frame`.
#[inline]
#[must_use]
pub const fn record_is_visible(record: u64, frame: u64) -> bool {
    decode_visible(record) && decode_frame(record).saturating_add(1) >= frame
}

/// True if the record has expired at `frame` and a new query is due.
#[inline]
#[must_use]
pub const fn record_needs_query(record: u64, frame: u64) -> bool {
    decode_frame(record) < frame
}

/// Dense identifier of a registered viewport.
///
/// The slot is reused after [`VisibilityCache::free_viewport`]; the
/// generation tells old ids apart from the new owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewportId {
    slot: u32,
    generation: u32,
}

impl ViewportId {
    /// Dense slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.slot as usize
    }
}

/// A cell query waiting for its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellQuery<Q> {
    /// Backend token.
    pub query: Q,
    /// Flat cell index the query was issued for.
    pub cell: usize,
    /// Viewport the query was issued for.
    pub viewport: ViewportId,
}

/// A node query waiting for its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQuery<Q> {
    /// Backend token.
    pub query: Q,
    /// Node the query was issued for.
    pub node: PoolHandle,
    /// Viewport the query was issued for.
    pub viewport: ViewportId,
}

/// Node record tagged with the handle generation it belongs to.
#[derive(Clone, Copy, Debug, Default)]
struct NodeRecord {
    generation: u32,
    record: u64,
}

#[derive(Debug)]
struct ViewportRecords {
    generation: u32,
    cells: Box<[u64]>,
    nodes: Vec<NodeRecord>,
}

/// Per-viewport, per-cell "visible until" records.
#[derive(Debug)]
pub struct VisibilityCache {
    cell_count: usize,
    viewports: Vec<Option<ViewportRecords>>,
    /// Generation of each slot, kept across frees.
    generations: Vec<u32>,
    free_slots: Vec<u32>,
}

impl VisibilityCache {
    /// Creates a cache for a grid of `cell_count` cells.
    #[must_use]
    pub fn new(cell_count: usize) -> Self {
        Self {
            cell_count,
            viewports: Vec::new(),
            generations: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    /// Cells per viewport record.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Number of registered viewports.
    #[must_use]
    pub fn viewport_count(&self) -> usize {
        self.viewports.iter().filter(|v| v.is_some()).count()
    }

    /// Allocates a zeroed record array and returns its id.
    ///
    /// # Panics
    ///
    /// Panics past `u32::MAX` viewports.
    pub fn register_viewport(&mut self) -> ViewportId {
        let slot = self.free_slots.pop().unwrap_or_else(|| {
            let slot = u32::try_from(self.viewports.len()).expect("viewport slots exhausted");
            self.viewports.push(None);
            self.generations.push(0);
            slot
        });
        let generation = self.generations[slot as usize];
        self.viewports[slot as usize] = Some(ViewportRecords {
            generation,
            cells: vec![0u64; self.cell_count].into_boxed_slice(),
            nodes: Vec::new(),
        });

        tracing::debug!(slot, generation, cells = self.cell_count, "viewport registered");
        ViewportId { slot, generation }
    }

    /// Releases a viewport's records.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not currently registered.
    pub fn free_viewport(&mut self, id: ViewportId) {
        self.records(id);
        self.viewports[id.index()] = None;
        self.generations[id.index()] = id.generation.wrapping_add(1);
        self.free_slots.push(id.slot);
        tracing::debug!(slot = id.slot, "viewport freed");
    }

    /// True if `id` refers to a live viewport.
    #[must_use]
    pub fn is_registered(&self, id: ViewportId) -> bool {
        self.try_records(id).is_some()
    }

    fn try_records(&self, id: ViewportId) -> Option<&ViewportRecords> {
        self.viewports
            .get(id.index())?
            .as_ref()
            .filter(|r| r.generation == id.generation)
    }

    fn try_records_mut(&mut self, id: ViewportId) -> Option<&mut ViewportRecords> {
        self.viewports
            .get_mut(id.index())?
            .as_mut()
            .filter(|r| r.generation == id.generation)
    }

    fn records(&self, id: ViewportId) -> &ViewportRecords {
        match self.try_records(id) {
            Some(records) => records,
            None => panic!("viewport {id:?} is not registered"),
        }
    }

    /// Raw cell records of a viewport.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    #[must_use]
    pub fn cell_records(&self, id: ViewportId) -> &[u64] {
        &self.records(id).cells
    }

    /// Raw record of one cell.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered or `cell` is out of range.
    #[must_use]
    pub fn cell_record(&self, id: ViewportId, cell: usize) -> u64 {
        self.records(id).cells[cell]
    }

    /// Whether `cell` renders without waiting for a query at `frame`.
    #[must_use]
    pub fn is_visible(&self, id: ViewportId, cell: usize, frame: u64) -> bool {
        record_is_visible(self.cell_record(id, cell), frame)
    }

    /// Whether `cell` needs a fresh query at `frame`.
    #[must_use]
    pub fn needs_query(&self, id: ViewportId, cell: usize, frame: u64) -> bool {
        record_needs_query(self.cell_record(id, cell), frame)
    }

    /// Writes one cell answer directly.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn record_cell_result(
        &mut self,
        id: ViewportId,
        cell: usize,
        visible: bool,
        frame: u64,
        success_duration: u64,
        failure_duration: u64,
    ) {
        let Some(records) = self.try_records_mut(id) else {
            panic!("viewport {id:?} is not registered");
        };
        apply_result(&mut records.cells[cell], visible, frame, success_duration, failure_duration);
    }

    /// Harvests every pending cell query, writing answers into the records.
    ///
    /// `result` is called exactly once per query. Queries of viewports
    /// freed since they were issued are consumed and dropped.
    ///
    /// Returns the number of queries harvested.
    pub fn retrieve_cell_queries<Q>(
        &mut self,
        pending: &mut Vec<CellQuery<Q>>,
        mut result: impl FnMut(Q) -> bool,
        frame: u64,
        success_duration: u64,
        failure_duration: u64,
    ) -> u32 {
        let mut harvested = 0;
        for CellQuery { query, cell, viewport } in pending.drain(..) {
            let visible = result(query);
            harvested += 1;
            match self.try_records_mut(viewport) {
                Some(records) => apply_result(
                    &mut records.cells[cell],
                    visible,
                    frame,
                    success_duration,
                    failure_duration,
                ),
                None => tracing::debug!(?viewport, cell, "dropping cell query of freed viewport"),
            }
        }
        harvested
    }

    /// Raw record of one node; zero if the node was never answered.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    #[must_use]
    pub fn node_record(&self, id: ViewportId, node: PoolHandle) -> u64 {
        self.records(id)
            .nodes
            .get(node.index())
            .filter(|r| r.generation == node.generation())
            .map_or(0, |r| r.record)
    }

    /// Whether `node` renders without waiting for a query at `frame`.
    #[must_use]
    pub fn is_node_visible(&self, id: ViewportId, node: PoolHandle, frame: u64) -> bool {
        record_is_visible(self.node_record(id, node), frame)
    }

    /// Whether `node` needs a fresh query at `frame`.
    #[must_use]
    pub fn node_needs_query(&self, id: ViewportId, node: PoolHandle, frame: u64) -> bool {
        record_needs_query(self.node_record(id, node), frame)
    }

    /// Harvests every pending node query. See
    /// [`VisibilityCache::retrieve_cell_queries`].
    pub fn retrieve_node_queries<Q>(
        &mut self,
        pending: &mut Vec<NodeQuery<Q>>,
        mut result: impl FnMut(Q) -> bool,
        frame: u64,
        success_duration: u64,
        failure_duration: u64,
    ) -> u32 {
        let mut harvested = 0;
        for NodeQuery { query, node, viewport } in pending.drain(..) {
            let visible = result(query);
            harvested += 1;
            let Some(records) = self.try_records_mut(viewport) else {
                tracing::debug!(?viewport, ?node, "dropping node query of freed viewport");
                continue;
            };
            if records.nodes.len() <= node.index() {
                records.nodes.resize(node.index() + 1, NodeRecord::default());
            }
            let slot = &mut records.nodes[node.index()];
            if slot.generation != node.generation() {
                *slot = NodeRecord {
                    generation: node.generation(),
                    record: 0,
                };
            }
            apply_result(&mut slot.record, visible, frame, success_duration, failure_duration);
        }
        harvested
    }
}
