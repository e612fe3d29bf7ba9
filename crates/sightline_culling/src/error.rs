//! # Culling Error Types
//!
//! Recoverable errors of the visibility core. Contract breaches (reading a
//! finished traversal, freeing an unknown viewport, a zero view direction)
//! are not represented here: they panic.

use thiserror::Error;

/// Errors raised while building a grid volume.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// An axis has no cells.
    #[error("grid axis {axis} has zero cells")]
    ZeroCellCount {
        /// The offending axis (0 = x, 1 = y, 2 = z).
        axis: usize,
    },

    /// A cell dimension is zero, negative or not finite.
    #[error("grid axis {axis} has invalid cell size {size}")]
    InvalidCellSize {
        /// The offending axis.
        axis: usize,
        /// The rejected size.
        size: f32,
    },

    /// The total cell count does not fit in memory addressing.
    #[error("grid of {x}x{y}x{z} cells is too large")]
    TooManyCells {
        /// Cells along x.
        x: u32,
        /// Cells along y.
        y: u32,
        /// Cells along z.
        z: u32,
    },
}

/// Errors raised by scene node operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The handle does not resolve to a live node.
    #[error("scene node not found: slot {0}")]
    NodeNotFound(usize),

    /// Static nodes are append-only and cannot move or be removed.
    #[error("scene node {0} is static")]
    StaticNode(usize),

    /// Attaching would make a node its own ancestor.
    #[error("attaching node {child} under {parent} would create a cycle")]
    HierarchyCycle {
        /// Prospective parent slot.
        parent: usize,
        /// Prospective child slot.
        child: usize,
    },
}

/// Errors raised while loading culling configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML document did not parse.
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Any error produced by this crate.
#[derive(Error, Debug)]
pub enum CullingError {
    /// Grid construction failed.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// A scene operation failed.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for culling operations.
pub type CullingResult<T> = Result<T, CullingError>;
