//! # Scene Cells
//!
//! Nodes live in a generational [`Pool`] and are referenced everywhere by
//! [`NodeHandle`]. Each grid cell keeps the handles of the nodes whose
//! bounds overlap it, so a node spanning several cells appears in each.
//!
//! Static nodes are append-only: they never move and are never removed,
//! and their cells keep them in insertion order.

use std::collections::BTreeSet;

use sightline_core::{Aabb, Pool, PoolHandle};

use crate::error::SceneError;
use crate::grid::{CellRange, GridVolume};

/// Stable handle to a [`SceneNode`].
pub type NodeHandle = PoolHandle;

/// An object placed in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    bounds: Aabb,
    /// Route this node through its own occlusion query when it was not
    /// visible last frame.
    pub occlusion_cull: bool,
    /// Opaque value for the embedding renderer (mesh id, entity id, ...).
    pub payload: u64,
    render_stamp: u64,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    is_static: bool,
    cells: CellRange,
}

impl SceneNode {
    /// Creates a detached node with world `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            occlusion_cull: false,
            payload: 0,
            render_stamp: 0,
            parent: None,
            children: Vec::new(),
            is_static: false,
            cells: CellRange::default(),
        }
    }

    /// Sets the renderer payload.
    #[must_use]
    pub const fn with_payload(mut self, payload: u64) -> Self {
        self.payload = payload;
        self
    }

    /// Enables per-node occlusion queries.
    #[must_use]
    pub const fn with_occlusion_cull(mut self, enabled: bool) -> Self {
        self.occlusion_cull = enabled;
        self
    }

    /// World-space bounds.
    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Last render stamp written by the driver.
    #[must_use]
    pub const fn render_stamp(&self) -> u64 {
        self.render_stamp
    }

    /// Parent in the node hierarchy.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// True for append-only static nodes.
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    /// Cells the node is registered in.
    #[must_use]
    pub const fn cell_range(&self) -> CellRange {
        self.cells
    }
}

/// Nodes overlapping one grid cell.
#[derive(Debug, Clone, Default)]
pub struct SceneCell {
    nodes: BTreeSet<NodeHandle>,
    static_nodes: Vec<NodeHandle>,
}

impl SceneCell {
    /// True when no node overlaps the cell.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.static_nodes.is_empty()
    }

    /// Number of nodes, static included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.static_nodes.len()
    }

    /// Dynamic nodes, in handle order.
    pub fn dynamic_nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.iter().copied()
    }

    /// Static nodes, in insertion order.
    #[must_use]
    pub fn static_nodes(&self) -> &[NodeHandle] {
        &self.static_nodes
    }

    /// Static nodes first, then dynamic ones.
    pub fn nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.static_nodes.iter().copied().chain(self.dynamic_nodes())
    }
}

/// Node arena plus per-cell membership.
#[derive(Debug)]
pub struct Scene {
    grid: GridVolume,
    nodes: Pool<SceneNode>,
    cells: Vec<SceneCell>,
}

impl Scene {
    /// Creates an empty scene over `grid`.
    #[must_use]
    pub fn new(grid: GridVolume) -> Self {
        let cells = vec![SceneCell::default(); grid.cell_count()];
        Self {
            grid,
            nodes: Pool::new(),
            cells,
        }
    }

    /// The grid the scene is partitioned by.
    #[must_use]
    pub const fn grid(&self) -> &GridVolume {
        &self.grid
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every cell, indexed by flat cell index.
    #[must_use]
    pub fn cells(&self) -> &[SceneCell] {
        &self.cells
    }

    /// One cell by flat index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the grid's cell count.
    #[must_use]
    pub fn cell(&self, index: usize) -> &SceneCell {
        &self.cells[index]
    }

    /// Looks up a node.
    ///
    /// # Errors
    ///
    /// [`SceneError::NodeNotFound`] for stale or foreign handles.
    pub fn node(&self, handle: NodeHandle) -> Result<&SceneNode, SceneError> {
        self.nodes
            .get(handle)
            .ok_or(SceneError::NodeNotFound(handle.index()))
    }

    /// Mutable access to a node's flags and payload.
    ///
    /// # Errors
    ///
    /// [`SceneError::NodeNotFound`] for stale or foreign handles.
    pub fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut SceneNode, SceneError> {
        self.nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle.index()))
    }

    /// Iterates over live nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &SceneNode)> {
        self.nodes.iter()
    }

    /// Inserts a dynamic node and registers it in every cell it overlaps.
    pub fn insert_node(&mut self, mut node: SceneNode) -> NodeHandle {
        node.is_static = false;
        node.parent = None;
        node.children.clear();
        node.cells = self.grid.cell_range_of(&node.bounds);

        let range = node.cells;
        let handle = self.nodes.allocate(node);
        for cell in range.iter() {
            let index = self.grid.cell_array_index(cell);
            self.cells[index].nodes.insert(handle);
        }

        tracing::trace!(?handle, cells = range.len(), "node inserted");
        handle
    }

    /// Inserts a static node. Static nodes cannot move or be removed.
    pub fn insert_static_node(&mut self, mut node: SceneNode) -> NodeHandle {
        node.is_static = true;
        node.parent = None;
        node.children.clear();
        node.cells = self.grid.cell_range_of(&node.bounds);

        let range = node.cells;
        let handle = self.nodes.allocate(node);
        for cell in range.iter() {
            let index = self.grid.cell_array_index(cell);
            self.cells[index].static_nodes.push(handle);
        }

        tracing::trace!(?handle, cells = range.len(), "static node inserted");
        handle
    }

    /// Removes a dynamic node. Its children become roots.
    ///
    /// # Errors
    ///
    /// - [`SceneError::NodeNotFound`] for stale handles
    /// - [`SceneError::StaticNode`] for static nodes
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<SceneNode, SceneError> {
        if self.node(handle)?.is_static {
            return Err(SceneError::StaticNode(handle.index()));
        }
        self.detach(handle)?;

        let mut node = self
            .nodes
            .free(handle)
            .ok_or(SceneError::NodeNotFound(handle.index()))?;
        self.unregister(handle, node.cells);
        for child in node.children.drain(..) {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }

        tracing::trace!(?handle, "node removed");
        Ok(node)
    }

    /// Moves a dynamic node to new bounds, updating cell membership.
    ///
    /// # Errors
    ///
    /// - [`SceneError::NodeNotFound`] for stale handles
    /// - [`SceneError::StaticNode`] for static nodes
    pub fn move_node(&mut self, handle: NodeHandle, bounds: Aabb) -> Result<(), SceneError> {
        let grid = &self.grid;
        let node = self
            .nodes
            .get_mut(handle)
            .ok_or(SceneError::NodeNotFound(handle.index()))?;
        if node.is_static {
            return Err(SceneError::StaticNode(handle.index()));
        }

        let old = node.cells;
        let new = grid.cell_range_of(&bounds);
        node.bounds = bounds;
        node.cells = new;
        if old == new {
            return Ok(());
        }

        for cell in old.iter().filter(|c| !new.contains(*c)) {
            let index = self.grid.cell_array_index(cell);
            self.cells[index].nodes.remove(&handle);
        }
        for cell in new.iter().filter(|c| !old.contains(*c)) {
            let index = self.grid.cell_array_index(cell);
            self.cells[index].nodes.insert(handle);
        }
        Ok(())
    }

    /// Makes `child` a child of `parent`, detaching it from any previous
    /// parent first.
    ///
    /// # Errors
    ///
    /// - [`SceneError::NodeNotFound`] if either handle is stale
    /// - [`SceneError::HierarchyCycle`] if `child` is `parent` or one of its
    ///   ancestors
    pub fn attach_child(&mut self, parent: NodeHandle, child: NodeHandle) -> Result<(), SceneError> {
        self.node(child)?;
        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(SceneError::HierarchyCycle {
                    parent: parent.index(),
                    child: child.index(),
                });
            }
            cursor = self.node(ancestor)?.parent;
        }

        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Detaches a node from its parent. Detaching a root is a no-op.
    ///
    /// # Errors
    ///
    /// [`SceneError::NodeNotFound`] for stale handles.
    pub fn detach(&mut self, child: NodeHandle) -> Result<(), SceneError> {
        let Some(parent) = self.node_mut(child)?.parent.take() else {
            return Ok(());
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|c| *c != child);
        }
        Ok(())
    }

    /// Stamps a node for the current render pass.
    ///
    /// Returns false if it already carried `stamp`.
    pub(crate) fn stamp(&mut self, handle: NodeHandle, stamp: u64) -> bool {
        match self.nodes.get_mut(handle) {
            Some(node) if node.render_stamp != stamp => {
                node.render_stamp = stamp;
                true
            }
            _ => false,
        }
    }

    fn unregister(&mut self, handle: NodeHandle, range: CellRange) {
        for cell in range.iter() {
            let index = self.grid.cell_array_index(cell);
            self.cells[index].nodes.remove(&handle);
        }
    }
}
