//! # Scene Traversal Driver
//!
//! Per-frame orchestration of grid traversal, the visibility cache and the
//! render backend:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          FRAME TIMELINE                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Harvest      cell queries, then node queries of last frame      │
//! │                                                                  │
//! │  Per view     traverse cells front to back                       │
//! │               ├── skip cells without nodes                       │
//! │               ├── setup_query (once per run of queries)          │
//! │               ├── query the cell if its record expired           │
//! │               ├── visible: queue nodes (stamp dedup, node tests) │
//! │               └── nodes queued: end_query, depth_pass            │
//! │               render (final shade)                               │
//! │                                                                  │
//! │  Advance      frame counter + 1                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queries issued in frame N are answered at the start of frame N+1. Cells
//! that were visible last frame keep rendering while they are re-queried,
//! so an answer arriving late never blanks the screen.

use std::fmt;

use crate::backend::{CellProbe, RenderBackend, RenderQueue};
use crate::config::CullingConfig;
use crate::grid::{CellIndex, CellRange};
use crate::region::ConvexRegion;
use crate::scene::{NodeHandle, Scene};
use crate::stats::FrameStats;
use crate::traversal::SliceTraversal;
use crate::visibility::{CellQuery, NodeQuery, ViewportId, VisibilityCache};

/// One viewport's request for a frame.
#[derive(Debug, Clone)]
pub struct View {
    /// Registered viewport.
    pub viewport: ViewportId,
    /// Region to traverse, usually the camera frustum.
    pub region: ConvexRegion,
    /// Cells to restrict the traversal to. `None` means the whole grid.
    pub bounds: Option<CellRange>,
}

impl View {
    /// A view over the whole grid.
    #[must_use]
    pub fn new(viewport: ViewportId, region: ConvexRegion) -> Self {
        Self {
            viewport,
            region,
            bounds: None,
        }
    }

    /// Restricts the traversal to `bounds`.
    #[must_use]
    pub fn with_bounds(mut self, bounds: CellRange) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// An open `setup_query` .. `end_query` run.
#[derive(Default)]
struct QueryRun {
    open: bool,
}

impl QueryRun {
    fn begin<B: RenderBackend>(&mut self, backend: &mut B, stats: &mut FrameStats) {
        if !self.open {
            backend.setup_query();
            self.open = true;
            stats.query_batches += 1;
        }
    }

    fn end<B: RenderBackend>(&mut self, backend: &mut B) {
        if self.open {
            backend.end_query();
            self.open = false;
        }
    }
}

/// Drives visibility for every viewport, one frame at a time.
pub struct SceneTraversalDriver<B: RenderBackend> {
    config: CullingConfig,
    cache: VisibilityCache,
    frame_counter: u64,
    render_access_counter: u64,
    pending_cells: Vec<CellQuery<B::Query>>,
    pending_nodes: Vec<NodeQuery<B::Query>>,
    queue: RenderQueue,
    scratch: Vec<NodeHandle>,
}

impl<B: RenderBackend> SceneTraversalDriver<B> {
    /// Creates a driver for scenes partitioned into `cell_count` cells.
    #[must_use]
    pub fn new(cell_count: usize, config: CullingConfig) -> Self {
        tracing::info!(cell_count, ?config, "scene traversal driver created");
        Self {
            config,
            cache: VisibilityCache::new(cell_count),
            frame_counter: 1,
            render_access_counter: 0,
            pending_cells: Vec::new(),
            pending_nodes: Vec::new(),
            queue: RenderQueue::new(),
            scratch: Vec::new(),
        }
    }

    /// Creates a driver sized for `scene`.
    #[must_use]
    pub fn for_scene(scene: &Scene, config: CullingConfig) -> Self {
        Self::new(scene.grid().cell_count(), config)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CullingConfig {
        &self.config
    }

    /// Replaces the configuration; takes effect next frame.
    pub fn set_config(&mut self, config: CullingConfig) {
        self.config = config;
    }

    /// Frame counter the next frame will run with. Starts at 1.
    #[must_use]
    pub const fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// The visibility records.
    #[must_use]
    pub const fn cache(&self) -> &VisibilityCache {
        &self.cache
    }

    /// Queries waiting for the next frame's harvest.
    #[must_use]
    pub fn pending_queries(&self) -> usize {
        self.pending_cells.len() + self.pending_nodes.len()
    }

    /// Registers a viewport with zeroed visibility records.
    pub fn register_viewport(&mut self) -> ViewportId {
        self.cache.register_viewport()
    }

    /// Frees a viewport. Its in-flight queries are dropped on harvest.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn free_viewport(&mut self, id: ViewportId) {
        self.cache.free_viewport(id);
    }

    /// Runs one frame over `views` and advances the frame counter.
    ///
    /// # Panics
    ///
    /// Panics if the scene grid does not match the driver's cell count or
    /// a view names an unregistered viewport.
    pub fn render_frame(&mut self, scene: &mut Scene, views: &[View], backend: &mut B) -> FrameStats {
        assert_eq!(
            scene.grid().cell_count(),
            self.cache.cell_count(),
            "scene grid does not match the driver's visibility records"
        );

        let frame = self.frame_counter;
        let _span = tracing::debug_span!("render_frame", frame).entered();
        let mut stats = FrameStats {
            frame,
            ..FrameStats::default()
        };

        let (success, failure) = (self.config.success_duration, self.config.failure_duration);
        stats.queries_harvested += self.cache.retrieve_cell_queries(
            &mut self.pending_cells,
            |query| backend.query_result(query),
            frame,
            success,
            failure,
        );
        stats.queries_harvested += self.cache.retrieve_node_queries(
            &mut self.pending_nodes,
            |query| backend.query_result(query),
            frame,
            success,
            failure,
        );

        for view in views {
            self.render_view(scene, view, backend, &mut stats);
        }

        self.frame_counter += 1;
        tracing::debug!(
            frame,
            cells = stats.cells_traversed,
            visible = stats.cells_visible,
            queries = stats.cell_queries + stats.node_queries,
            nodes = stats.nodes_queued,
            "frame complete"
        );
        stats
    }

    fn render_view(&mut self, scene: &mut Scene, view: &View, backend: &mut B, stats: &mut FrameStats) {
        let frame = self.frame_counter;
        let viewport = view.viewport;
        assert!(
            self.cache.is_registered(viewport),
            "viewport {viewport:?} is not registered"
        );

        stats.viewports += 1;
        self.render_access_counter += 1;
        self.queue.clear();

        let bounds = view.bounds.unwrap_or_else(|| scene.grid().full_range());
        let mut traversal = SliceTraversal::new(scene.grid(), &view.region, bounds);
        let mut run = QueryRun::default();

        for cell in traversal.by_ref() {
            let index = scene.grid().cell_array_index(cell);
            if scene.cell(index).is_empty() {
                stats.cells_empty += 1;
                continue;
            }

            let mut cell_query = None;
            let visible = if self.config.cell_culling {
                if self.cache.needs_query(viewport, index, frame) {
                    run.begin(backend, stats);
                    let probe = cell_probe(scene, &view.region, cell, index);
                    cell_query = Some(backend.occlusion_query_cell(&probe, viewport));
                    stats.cell_queries += 1;
                }
                self.cache.is_visible(viewport, index, frame)
            } else {
                true
            };

            if visible {
                stats.cells_visible += 1;
                self.enqueue_cell(scene, view, index, backend, &mut run, stats);
            }

            if self.queue.has_batch() {
                run.end(backend);
                backend.depth_pass(&self.queue, cell_query.as_ref(), viewport);
                self.queue.close_batch();
                stats.depth_passes += 1;
            }

            if let Some(query) = cell_query {
                self.pending_cells.push(CellQuery {
                    query,
                    cell: index,
                    viewport,
                });
            }
        }
        run.end(backend);
        stats.absorb(&traversal.stats());

        backend.render(&self.queue, viewport);
        tracing::trace!(?viewport, queued = self.queue.len(), "viewport shaded");
    }

    /// Queues the nodes of a visible cell.
    fn enqueue_cell(
        &mut self,
        scene: &mut Scene,
        view: &View,
        index: usize,
        backend: &mut B,
        run: &mut QueryRun,
        stats: &mut FrameStats,
    ) {
        let frame = self.frame_counter;
        let viewport = view.viewport;
        let stamp = self.render_access_counter;

        self.scratch.clear();
        self.scratch.extend(scene.cell(index).nodes());

        for &handle in &self.scratch {
            if !scene.stamp(handle, stamp) {
                continue;
            }
            let Ok(node) = scene.node(handle) else {
                continue;
            };

            if self.config.frustum_test_nodes && !view.region.intersects_aabb(node.bounds()) {
                stats.nodes_outside += 1;
                continue;
            }

            if self.config.node_culling && node.occlusion_cull {
                // Expired records are re-queried while a visible node keeps rendering.
                if self.cache.node_needs_query(viewport, handle, frame) {
                    run.begin(backend, stats);
                    let query = backend.occlusion_query_node(node, viewport);
                    self.pending_nodes.push(NodeQuery {
                        query,
                        node: handle,
                        viewport,
                    });
                    stats.node_queries += 1;
                }
                if !self.cache.is_node_visible(viewport, handle, frame) {
                    continue;
                }
            }

            self.queue.push(handle);
            stats.nodes_queued += 1;
        }
    }
}

fn cell_probe(scene: &Scene, region: &ConvexRegion, cell: CellIndex, index: usize) -> CellProbe {
    let grid = scene.grid();
    CellProbe {
        slice_axis: region.slice_axis(),
        direction: region.direction(),
        direction_sign: region.direction_sign(),
        center: grid.cell_center(cell),
        size: grid.cell_dimensions(),
        cell,
        cell_index: index,
    }
}

impl<B: RenderBackend> fmt::Debug for SceneTraversalDriver<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneTraversalDriver")
            .field("config", &self.config)
            .field("frame_counter", &self.frame_counter)
            .field("viewports", &self.cache.viewport_count())
            .field("pending_queries", &self.pending_queries())
            .finish_non_exhaustive()
    }
}
