//! # Render Backend
//!
//! The driver never talks to a graphics API. Everything it needs from the
//! renderer (occlusion queries, depth pre-pass and final shading) goes
//! through [`RenderBackend`].
//!
//! [`RecordingBackend`] implements the trait without a GPU: it records
//! every call and answers queries from caller-supplied predicates.

use std::fmt;

use sightline_core::Vec3;

use crate::grid::CellIndex;
use crate::scene::{NodeHandle, SceneNode};
use crate::visibility::ViewportId;

/// What a backend needs to rasterize a cell's occlusion proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellProbe {
    /// Axis the traversal slices along.
    pub slice_axis: usize,
    /// Unit view direction.
    pub direction: Vec3,
    /// Sign of each direction component.
    pub direction_sign: [i8; 3],
    /// World center of the cell.
    pub center: Vec3,
    /// World size of the cell.
    pub size: Vec3,
    /// Grid coordinates of the cell.
    pub cell: CellIndex,
    /// Flat cell index.
    pub cell_index: usize,
}

/// Nodes collected for one viewport during a frame.
///
/// The queue grows in front-to-back cell order. The nodes added since the
/// last depth pass form the current batch.
#[derive(Debug, Clone, Default)]
pub struct RenderQueue {
    nodes: Vec<NodeHandle>,
    batch_start: usize,
}

impl RenderQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node queued this viewport, in queue order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Nodes queued since the last depth pass.
    #[must_use]
    pub fn batch(&self) -> &[NodeHandle] {
        &self.nodes[self.batch_start..]
    }

    /// Number of queued nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn push(&mut self, node: NodeHandle) {
        self.nodes.push(node);
    }

    pub(crate) fn has_batch(&self) -> bool {
        self.batch_start < self.nodes.len()
    }

    pub(crate) fn close_batch(&mut self) {
        self.batch_start = self.nodes.len();
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.batch_start = 0;
    }
}

/// Renderer capability consumed by the scene traversal driver.
pub trait RenderBackend {
    /// Opaque token for an issued occlusion query.
    type Query;

    /// Prepares state for a run of occlusion queries.
    fn setup_query(&mut self);

    /// Restores state after a run of occlusion queries.
    fn end_query(&mut self);

    /// Issues an occlusion query for a cell's bounds.
    fn occlusion_query_cell(&mut self, probe: &CellProbe, viewport: ViewportId) -> Self::Query;

    /// Issues an occlusion query for a node's bounds.
    fn occlusion_query_node(&mut self, node: &SceneNode, viewport: ViewportId) -> Self::Query;

    /// Consumes a query and returns whether any sample passed.
    fn query_result(&mut self, query: Self::Query) -> bool;

    /// Renders the current batch of `queue` into the depth buffer,
    /// optionally conditioned on the cell query just issued.
    fn depth_pass(&mut self, queue: &RenderQueue, query: Option<&Self::Query>, viewport: ViewportId);

    /// Final shading of every queued node.
    fn render(&mut self, queue: &RenderQueue, viewport: ViewportId);
}

/// Query token handed out by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedQuery {
    /// Sequential query id.
    pub id: u32,
    /// Answer decided when the query was issued.
    pub visible: bool,
}

/// One call made against a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `setup_query`
    SetupQuery,
    /// `end_query`
    EndQuery,
    /// `occlusion_query_cell`
    CellQuery {
        /// Query id.
        id: u32,
        /// Queried cell.
        cell: CellIndex,
        /// Viewport.
        viewport: ViewportId,
    },
    /// `occlusion_query_node`
    NodeQuery {
        /// Query id.
        id: u32,
        /// Payload of the queried node.
        payload: u64,
        /// Viewport.
        viewport: ViewportId,
    },
    /// `query_result`
    QueryResult {
        /// Query id.
        id: u32,
        /// Returned answer.
        visible: bool,
    },
    /// `depth_pass`
    DepthPass {
        /// Nodes in the batch.
        nodes: Vec<NodeHandle>,
        /// Id of the attached cell query.
        query: Option<u32>,
        /// Viewport.
        viewport: ViewportId,
    },
    /// `render`
    Render {
        /// Every queued node.
        nodes: Vec<NodeHandle>,
        /// Viewport.
        viewport: ViewportId,
    },
}

type CellPredicate = Box<dyn Fn(&CellProbe) -> bool>;
type NodePredicate = Box<dyn Fn(&SceneNode) -> bool>;

/// Backend double that records calls and answers queries from predicates.
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    next_query: u32,
    cell_visible: CellPredicate,
    node_visible: NodePredicate,
}

impl RecordingBackend {
    /// A backend that reports everything visible.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_query: 0,
            cell_visible: Box::new(|_| true),
            node_visible: Box::new(|_| true),
        }
    }

    /// Answers cell queries with `predicate`.
    #[must_use]
    pub fn with_cell_visibility(mut self, predicate: impl Fn(&CellProbe) -> bool + 'static) -> Self {
        self.cell_visible = Box::new(predicate);
        self
    }

    /// Answers node queries with `predicate`.
    #[must_use]
    pub fn with_node_visibility(mut self, predicate: impl Fn(&SceneNode) -> bool + 'static) -> Self {
        self.node_visible = Box::new(predicate);
        self
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Forgets recorded calls. Query ids keep counting.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Cells queried so far, in issue order.
    #[must_use]
    pub fn queried_cells(&self) -> Vec<CellIndex> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::CellQuery { cell, .. } => Some(*cell),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching `filter`.
    pub fn count(&self, filter: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|call| filter(call)).count()
    }

    fn issue(&mut self, visible: bool) -> RecordedQuery {
        let query = RecordedQuery {
            id: self.next_query,
            visible,
        };
        self.next_query += 1;
        query
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("calls", &self.calls.len())
            .field("next_query", &self.next_query)
            .finish_non_exhaustive()
    }
}

impl RenderBackend for RecordingBackend {
    type Query = RecordedQuery;

    fn setup_query(&mut self) {
        self.calls.push(BackendCall::SetupQuery);
    }

    fn end_query(&mut self) {
        self.calls.push(BackendCall::EndQuery);
    }

    fn occlusion_query_cell(&mut self, probe: &CellProbe, viewport: ViewportId) -> RecordedQuery {
        let query = self.issue((self.cell_visible)(probe));
        self.calls.push(BackendCall::CellQuery {
            id: query.id,
            cell: probe.cell,
            viewport,
        });
        query
    }

    fn occlusion_query_node(&mut self, node: &SceneNode, viewport: ViewportId) -> RecordedQuery {
        let query = self.issue((self.node_visible)(node));
        self.calls.push(BackendCall::NodeQuery {
            id: query.id,
            payload: node.payload,
            viewport,
        });
        query
    }

    fn query_result(&mut self, query: RecordedQuery) -> bool {
        self.calls.push(BackendCall::QueryResult {
            id: query.id,
            visible: query.visible,
        });
        query.visible
    }

    fn depth_pass(&mut self, queue: &RenderQueue, query: Option<&RecordedQuery>, viewport: ViewportId) {
        self.calls.push(BackendCall::DepthPass {
            nodes: queue.batch().to_vec(),
            query: query.map(|q| q.id),
            viewport,
        });
    }

    fn render(&mut self, queue: &RenderQueue, viewport: ViewportId) {
        self.calls.push(BackendCall::Render {
            nodes: queue.nodes().to_vec(),
            viewport,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::VisibilityCache;
    use sightline_core::{Aabb, Pool};

    fn probe(x: u32) -> CellProbe {
        CellProbe {
            slice_axis: 0,
            direction: Vec3::X,
            direction_sign: [1, 1, 1],
            center: Vec3::new(x as f32 + 0.5, 0.5, 0.5),
            size: Vec3::ONE,
            cell: CellIndex::new(x, 0, 0),
            cell_index: x as usize,
        }
    }

    #[test]
    fn test_recording_backend_answers_from_predicate() {
        let viewport = VisibilityCache::new(4).register_viewport();
        let mut backend = RecordingBackend::new().with_cell_visibility(|p| p.cell.x % 2 == 0);

        let q0 = backend.occlusion_query_cell(&probe(0), viewport);
        let q1 = backend.occlusion_query_cell(&probe(1), viewport);
        assert_eq!((q0.id, q1.id), (0, 1));
        assert!(backend.query_result(q0));
        assert!(!backend.query_result(q1));
        assert_eq!(backend.queried_cells(), vec![CellIndex::new(0, 0, 0), CellIndex::new(1, 0, 0)]);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::QueryResult { .. })), 2);
    }

    #[test]
    fn test_render_queue_batches() {
        let mut pool: Pool<()> = Pool::new();
        let a = pool.allocate(());
        let b = pool.allocate(());

        let mut queue = RenderQueue::new();
        queue.push(a);
        assert_eq!(queue.batch(), &[a]);
        queue.close_batch();
        assert!(!queue.has_batch());
        queue.push(b);
        assert_eq!(queue.batch(), &[b]);
        assert_eq!(queue.nodes(), &[a, b]);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_node_query_records_payload() {
        let viewport = VisibilityCache::new(1).register_viewport();
        let mut backend = RecordingBackend::new().with_node_visibility(|n| n.payload > 5);
        let node = SceneNode::new(Aabb::new(Vec3::ZERO, Vec3::ONE)).with_payload(3);

        let query = backend.occlusion_query_node(&node, viewport);
        assert!(!query.visible);
        assert_eq!(
            backend.calls(),
            &[BackendCall::NodeQuery { id: 0, payload: 3, viewport }]
        );
    }
}
