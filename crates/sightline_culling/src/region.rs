//! Convex query volumes: camera frusta and arbitrary convex meshes.
//!
//! A region carries two views of the same solid. The inward-facing
//! planes answer containment questions; the vertex/edge list drives the
//! slice traversal. On top of that every region has a principal
//! direction, which decides the traversal axes.

use sightline_core::{Aabb, Plane, Vec3};

/// Tolerance for point-in-region tests, in world units.
const CONTAINMENT_EPSILON: f32 = 1e-4;

/// A convex polyhedron with a traversal direction.
///
/// Constructed once per camera or query per frame; read-only afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvexRegion {
    /// Corner points.
    vertices: Vec<Vec3>,
    /// Edges as pairs of vertex indices, lower index first.
    edges: Vec<[usize; 2]>,
    /// Bounding planes, normals pointing inside.
    planes: Vec<Plane>,
    /// Unit traversal direction.
    direction: Vec3,
    /// Sign of each direction component; zero counts as positive.
    direction_sign: [i8; 3],
    /// Axes from most to least aligned with `direction`.
    dimension_order: [usize; 3],
}

impl ConvexRegion {
    /// Builds a region from its raw parts.
    ///
    /// `planes` must face inward. Edge endpoints are reordered so the lower
    /// index comes first.
    ///
    /// # Panics
    ///
    /// Panics if `direction` has zero length or an edge references a
    /// missing vertex. Both are caller contract breaches.
    #[must_use]
    pub fn from_parts(
        vertices: Vec<Vec3>,
        edges: Vec<[usize; 2]>,
        planes: Vec<Plane>,
        direction: Vec3,
    ) -> Self {
        let Some(direction) = direction.try_normalized() else {
            panic!("convex region needs a non-zero direction, got {direction:?}");
        };
        let edges = edges
            .into_iter()
            .map(|[a, b]| {
                assert!(
                    a < vertices.len() && b < vertices.len(),
                    "edge [{a}, {b}] references a missing vertex"
                );
                [a.min(b), a.max(b)]
            })
            .collect();

        let mut direction_sign = [1i8; 3];
        for (axis, sign) in direction_sign.iter_mut().enumerate() {
            if direction.axis(axis) < 0.0 {
                *sign = -1;
            }
        }

        // sort_by is stable: equal magnitudes keep x before y before z
        let mut dimension_order = [0usize, 1, 2];
        dimension_order.sort_by(|&a, &b| direction.axis(b).abs().total_cmp(&direction.axis(a).abs()));

        Self {
            vertices,
            edges,
            planes,
            direction,
            direction_sign,
            dimension_order,
        }
    }

    /// Builds a region from a closed convex mesh.
    ///
    /// Each face lists its vertex indices in order around the face (either
    /// winding). Edges are the de-duplicated face boundaries; planes are
    /// oriented toward the vertex centroid.
    #[must_use]
    pub fn from_mesh<F: AsRef<[usize]>>(vertices: Vec<Vec3>, faces: &[F], direction: Vec3) -> Self {
        let centroid = if vertices.is_empty() {
            Vec3::ZERO
        } else {
            vertices.iter().fold(Vec3::ZERO, |acc, &v| acc + v) * (1.0 / vertices.len() as f32)
        };

        let mut edges = Vec::new();
        let mut planes = Vec::with_capacity(faces.len());
        for face in faces {
            let face = face.as_ref();
            for (i, &a) in face.iter().enumerate() {
                let b = face[(i + 1) % face.len()];
                if a != b {
                    edges.push([a.min(b), a.max(b)]);
                }
            }
            if let Some(plane) = face_plane(&vertices, face) {
                planes.push(if plane.distance_to_point(centroid) < 0.0 {
                    plane.flipped()
                } else {
                    plane
                });
            }
        }
        edges.sort_unstable();
        edges.dedup();

        Self::from_parts(vertices, edges, planes, direction)
    }

    /// Region covering an axis-aligned box.
    #[must_use]
    pub fn from_aabb(aabb: &Aabb, direction: Vec3) -> Self {
        const FACES: [[usize; 4]; 6] = [
            [0, 2, 6, 4], // -x
            [1, 3, 7, 5], // +x
            [0, 1, 5, 4], // -y
            [2, 3, 7, 6], // +y
            [0, 1, 3, 2], // -z
            [4, 5, 7, 6], // +z
        ];
        Self::from_mesh(aabb.corners().to_vec(), &FACES, direction)
    }

    /// Frustum from its near and far corner quads.
    ///
    /// Corners go around each quad in the same order (for example
    /// bottom-left, bottom-right, top-right, top-left). The direction runs
    /// from the near centre to the far centre.
    #[must_use]
    pub fn from_frustum_corners(near: [Vec3; 4], far: [Vec3; 4]) -> Self {
        const FACES: [[usize; 4]; 6] = [
            [0, 1, 2, 3], // near
            [4, 5, 6, 7], // far
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        let near_center = (near[0] + near[1] + near[2] + near[3]) * 0.25;
        let far_center = (far[0] + far[1] + far[2] + far[3]) * 0.25;

        let mut vertices = Vec::with_capacity(8);
        vertices.extend_from_slice(&near);
        vertices.extend_from_slice(&far);
        Self::from_mesh(vertices, &FACES, far_center - near_center)
    }

    /// Corner points.
    #[must_use]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Edges as vertex index pairs.
    #[must_use]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Inward-facing bounding planes.
    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Unit traversal direction.
    #[must_use]
    pub const fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Per-axis sign of the direction (+1 for zero components).
    #[must_use]
    pub const fn direction_sign(&self) -> [i8; 3] {
        self.direction_sign
    }

    /// Axes ranked from most to least aligned with the direction.
    #[must_use]
    pub const fn dimension_order(&self) -> [usize; 3] {
        self.dimension_order
    }

    /// Axis traversed one slice at a time.
    #[must_use]
    pub const fn slice_axis(&self) -> usize {
        self.dimension_order[0]
    }

    /// Axis walked row by row inside a slice.
    #[must_use]
    pub const fn row_axis(&self) -> usize {
        self.dimension_order[1]
    }

    /// Axis walked cell by cell inside a row.
    #[must_use]
    pub const fn column_axis(&self) -> usize {
        self.dimension_order[2]
    }

    /// True if `p` is inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(p) >= -CONTAINMENT_EPSILON)
    }

    /// Conservative box test: false only if some plane has the whole box
    /// outside.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let center = aabb.center();
        let half = aabb.half_extents();

        self.planes.iter().all(|plane| {
            // Projection interval radius of the box onto the plane normal
            let r = half.x * plane.a.abs() + half.y * plane.b.abs() + half.z * plane.c.abs();
            plane.distance_to_point(center) >= -r
        })
    }
}

/// Plane through the first non-collinear vertex triple of a face.
fn face_plane(vertices: &[Vec3], face: &[usize]) -> Option<Plane> {
    let &first = face.first()?;
    let origin = *vertices.get(first)?;
    face.windows(2)
        .skip(1)
        .find_map(|pair| Plane::from_points(origin, *vertices.get(pair[0])?, *vertices.get(pair[1])?))
}

/// Perspective camera description used to build view frusta.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    /// Camera position.
    pub eye: Vec3,
    /// Viewing direction (need not be normalized).
    pub forward: Vec3,
    /// Approximate up vector.
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width over height.
    pub aspect: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl Frustum {
    /// Describes a perspective camera.
    #[must_use]
    pub const fn perspective(
        eye: Vec3,
        forward: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            eye,
            forward,
            up,
            fov_y,
            aspect,
            near,
            far,
        }
    }

    /// Corner quads at the near and far planes, each ordered bottom-left,
    /// bottom-right, top-right, top-left.
    ///
    /// # Panics
    ///
    /// Panics if `forward` is zero or parallel to `up`.
    #[must_use]
    pub fn corners(&self) -> ([Vec3; 4], [Vec3; 4]) {
        let Some(forward) = self.forward.try_normalized() else {
            panic!("frustum forward vector must be non-zero");
        };
        let Some(right) = forward.cross(self.up).try_normalized() else {
            panic!("frustum up vector must not be parallel to forward");
        };
        let up = right.cross(forward);
        let tan_half = (self.fov_y * 0.5).tan();

        let quad = |distance: f32| {
            let center = self.eye + forward * distance;
            let half_h = up * (distance * tan_half);
            let half_w = right * (distance * tan_half * self.aspect);
            [
                center - half_w - half_h,
                center + half_w - half_h,
                center + half_w + half_h,
                center - half_w + half_h,
            ]
        };
        (quad(self.near), quad(self.far))
    }

    /// The frustum as a traversable region.
    #[must_use]
    pub fn to_region(&self) -> ConvexRegion {
        let (near, far) = self.corners();
        ConvexRegion::from_frustum_corners(near, far)
    }
}
