//! # Sightline Core
//!
//! Geometry primitives and storage shared by the visibility stack:
//! - `Vec3`, `Aabb` and `Plane` in world space
//! - A generational pool handing out stable integer handles
//!
//! ## Rules
//!
//! 1. **No rendering state** - this crate is pure data
//! 2. **Handles, not pointers** - graphs reference each other by `PoolHandle`

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod math;
pub mod memory;

pub use math::{Aabb, Plane, Vec3};
pub use memory::{Pool, PoolHandle};
