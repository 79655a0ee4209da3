//! Records module: consultation intake and project tracking
//!
//! Consultation requests are an append-only collection; the project is a
//! singleton that falls back to a built-in default until first written.

pub mod store;
pub mod types;

pub use store::{default_project, RecordStore};
pub use types::*;
