//! # Sightline Culling
//!
//! Front-to-back visibility for worlds partitioned into a uniform grid:
//! - Walks the cells of a frustum (or any convex region) in depth order,
//!   slice by slice, without visiting cells outside it
//! - Remembers occlusion-query answers per viewport so query latency never
//!   stalls a frame
//! - Drives a render backend through query, depth and shading passes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        PER FRAME                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ConvexRegion ─→ SliceTraversal ─→ cells, front to back      │
//! │                        ↓                                     │
//! │  Scene cells ─→ SceneTraversalDriver ←→ VisibilityCache      │
//! │                        ↓                                     │
//! │                  RenderBackend (queries, depth, shade)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Single threaded: the scene is not mutated while a frame runs
//! - No graphics API types cross the `RenderBackend` boundary
//! - Logging goes through `tracing`; the application installs the subscriber

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod grid;
pub mod region;
pub mod scene;
pub mod stats;
pub mod traversal;
pub mod visibility;

pub use backend::{BackendCall, CellProbe, RecordedQuery, RecordingBackend, RenderBackend, RenderQueue};
pub use config::CullingConfig;
pub use driver::{SceneTraversalDriver, View};
pub use error::{ConfigError, CullingError, CullingResult, GridError, SceneError};
pub use grid::{CellIndex, CellRange, GridVolume};
pub use region::{ConvexRegion, Frustum};
pub use scene::{NodeHandle, Scene, SceneCell, SceneNode};
pub use stats::{FrameStats, TraversalStats};
pub use traversal::{SliceTraversal, TraceHook};
pub use visibility::{
    code_frame, decode_frame, decode_visible, encode_visible, CellQuery, NodeQuery, ViewportId,
    VisibilityCache,
};
