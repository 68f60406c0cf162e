//! Core types and traits for the Lightning Dispatch job-assignment engine.
//!
//! Records serialize to camelCase JSON so they stay readable by the marketplace clients
//! that share the same key/value documents.

mod dto;
mod model;
mod traits;

pub use dto::*;
pub use model::*;
pub use traits::*;
