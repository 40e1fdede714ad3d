//! Anchor location for text patches.
//!
//! An anchor is a position in a buffer that an edit attaches to. Host files
//! drift in formatting between runs and across upstream edits, so anchors are
//! found through an ordered fallback chain rather than a single pattern.

pub mod errors;
pub mod locator;
pub mod spec;

pub use errors::AnchorError;
pub use locator::{locate, locate_all, AnchorMatch, Strategy};
pub use spec::{AnchorSpec, Occurrence, StructuralMarker};
