//! Traversal and frame statistics.

/// Counters collected by one slice traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Slices whose cross-section was built.
    pub slices_visited: u32,
    /// Slices skipped because they missed the cell bounds.
    pub slices_skipped: u32,
    /// Rows that produced at least one cell.
    pub rows_emitted: u32,
    /// Cells produced.
    pub cells_emitted: u32,
}

/// Statistics from one frame of the scene traversal driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame counter value the frame ran with.
    pub frame: u64,
    /// Viewports traversed.
    pub viewports: u32,
    /// Cells produced by all traversals.
    pub cells_traversed: u32,
    /// Cells skipped for holding no nodes.
    pub cells_empty: u32,
    /// Cells whose nodes were queued.
    pub cells_visible: u32,
    /// Cell occlusion queries issued.
    pub cell_queries: u32,
    /// Node occlusion queries issued.
    pub node_queries: u32,
    /// Nodes added to render queues.
    pub nodes_queued: u32,
    /// Nodes rejected by the region test.
    pub nodes_outside: u32,
    /// Query results harvested at the start of the frame.
    pub queries_harvested: u32,
    /// `setup_query` / `end_query` pairs.
    pub query_batches: u32,
    /// Depth passes submitted.
    pub depth_passes: u32,
}

impl FrameStats {
    /// Fraction of non-empty traversed cells that were culled.
    #[must_use]
    pub fn cull_rate(&self) -> f32 {
        let populated = self.cells_traversed.saturating_sub(self.cells_empty);
        if populated > 0 {
            populated.saturating_sub(self.cells_visible) as f32 / populated as f32
        } else {
            0.0
        }
    }

    /// Adds one traversal's counters.
    pub fn absorb(&mut self, traversal: &TraversalStats) {
        self.cells_traversed += traversal.cells_emitted;
    }
}
