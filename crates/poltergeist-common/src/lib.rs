//! # Poltergeist Common
//!
//! Common types, utilities, and shared abstractions for Poltergeist.
//!
//! This crate provides foundational types used across all subsystems:
//! - ID types (EntityId, AbilitySlot)
//! - Physics layers and masks
//! - Vector helpers on top of `glam`
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod layers;
pub mod math;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::layers::*;
}

pub use glam;
pub use prelude::*;
