//! Interval data model.
//!
//! Stage, sequence and activity intervals share one struct; the kind is a
//! tagged enum. Analyst-driven status changes live in [`transition`].

pub mod transition;
pub mod types;

pub use transition::{apply_activity_status, apply_stage_status, TransitionError};
pub use types::*;
