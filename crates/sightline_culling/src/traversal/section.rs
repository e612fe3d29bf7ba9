//! Slice decomposition: vertex buckets, the active-edge table and the
//! cross-sections it produces at each slice boundary.

use super::frame::{ceil_cell, COLUMN, ROW, SLICE};

/// A point of a cross-section, projected onto the (row, column) plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct SectionPoint {
    /// Row coordinate (local cell units).
    pub row: f32,
    /// Column coordinate (local cell units).
    pub col: f32,
}

impl SectionPoint {
    pub(crate) const fn new(row: f32, col: f32) -> Self {
        Self { row, col }
    }

    fn project(p: [f32; 3]) -> Self {
        Self::new(p[ROW], p[COLUMN])
    }
}

/// An edge spanning at least one boundary plane that is still ahead.
#[derive(Clone, Copy, Debug)]
struct ActiveEdge {
    /// Endpoint with the smaller slice coordinate.
    near: [f32; 3],
    /// Endpoint with the larger slice coordinate.
    far: [f32; 3],
    /// Boundary planes left to cross after the current one.
    remaining: i32,
}

impl ActiveEdge {
    /// Point where the edge crosses the plane `slice = plane`.
    ///
    /// `None` for an edge parallel to the plane.
    fn intersect(&self, plane: f32) -> Option<SectionPoint> {
        let span = self.far[SLICE] - self.near[SLICE];
        if span <= 0.0 {
            return None;
        }
        let t = (plane - self.near[SLICE]) / span;
        Some(SectionPoint::new(
            self.near[ROW] + t * (self.far[ROW] - self.near[ROW]),
            self.near[COLUMN] + t * (self.far[COLUMN] - self.near[COLUMN]),
        ))
    }
}

/// Incremental slicer over a convex region in local cell space.
///
/// Planes must be requested in strictly increasing order; each request
/// consumes the edges and vertices that lie behind it.
#[derive(Debug, Default)]
pub(crate) struct Slicer {
    /// Vertices sorted by slice coordinate.
    vertices: Vec<[f32; 3]>,
    /// First vertex not yet behind the current slab.
    vertex_cursor: usize,
    /// Edges (near, far) sorted by the near endpoint's slice coordinate.
    edges: Vec<([f32; 3], [f32; 3])>,
    /// First edge not yet considered for activation.
    edge_cursor: usize,
    /// Edges crossing upcoming boundary planes.
    active: Vec<ActiveEdge>,
}

impl Slicer {
    pub(crate) fn new(vertices: &[[f32; 3]], edges: &[[usize; 2]]) -> Self {
        let mut sorted_vertices = vertices.to_vec();
        sorted_vertices.sort_unstable_by(|a, b| a[SLICE].total_cmp(&b[SLICE]));

        let mut sorted_edges: Vec<_> = edges
            .iter()
            .map(|&[a, b]| {
                let (p, q) = (vertices[a], vertices[b]);
                if p[SLICE] <= q[SLICE] {
                    (p, q)
                } else {
                    (q, p)
                }
            })
            .collect();
        sorted_edges.sort_unstable_by(|a, b| a.0[SLICE].total_cmp(&b.0[SLICE]));

        Self {
            vertices: sorted_vertices,
            vertex_cursor: 0,
            active: Vec::with_capacity(sorted_edges.len()),
            edges: sorted_edges,
            edge_cursor: 0,
        }
    }

    /// Slice-coordinate extent of the region, or `None` without vertices.
    pub(crate) fn extent(&self) -> Option<(f32, f32)> {
        let first = self.vertices.first()?;
        let last = self.vertices.last()?;
        Some((first[SLICE], last[SLICE]))
    }

    /// Writes the cross-section at `slice = plane` into `out`.
    ///
    /// Only edges strictly crossing the plane contribute; vertices lying
    /// exactly on it are reported by [`Slicer::collect_slab_vertices`].
    pub(crate) fn section_at(&mut self, plane: i32, out: &mut Vec<SectionPoint>) {
        let plane_f = plane as f32;

        while let Some(&(near, far)) = self.edges.get(self.edge_cursor) {
            if near[SLICE] >= plane_f {
                break;
            }
            self.edge_cursor += 1;
            if far[SLICE] > plane_f {
                // Planes crossed: plane ..= ceil(far) - 1
                let last_plane = ceil_cell(far[SLICE]) - 1;
                self.active.push(ActiveEdge {
                    near,
                    far,
                    remaining: last_plane - plane,
                });
            }
        }

        out.clear();
        let mut i = 0;
        while i < self.active.len() {
            let edge = &mut self.active[i];
            if let Some(point) = edge.intersect(plane_f) {
                out.push(point);
            }
            edge.remaining -= 1;
            if edge.remaining < 0 {
                self.active.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Appends the projection of every vertex inside the closed slab
    /// `[slab, slab + 1]`, then drops vertices that cannot reach later
    /// slabs.
    pub(crate) fn collect_slab_vertices(&mut self, slab: i32, out: &mut Vec<SectionPoint>) {
        let lo = slab as f32;
        let hi = lo + 1.0;

        while self
            .vertices
            .get(self.vertex_cursor)
            .is_some_and(|v| v[SLICE] < lo)
        {
            self.vertex_cursor += 1;
        }

        out.extend(
            self.vertices[self.vertex_cursor..]
                .iter()
                .take_while(|v| v[SLICE] <= hi)
                .map(|&v| SectionPoint::project(v)),
        );

        // Vertices on the far boundary also belong to the next slab
        while self
            .vertices
            .get(self.vertex_cursor)
            .is_some_and(|v| v[SLICE] < hi)
        {
            self.vertex_cursor += 1;
        }
    }

    /// Number of edges currently tracked.
    #[cfg(test)]
    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }
}
