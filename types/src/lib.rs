//! Core domain types for saga.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! registered entities, detector matches, protocol positions and diagnostics.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod diagnostic;
mod entity;
mod position;
pub mod text;

pub use diagnostic::{Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity};
pub use entity::{
    DetectableEntity, EntityInfo, EntityKey, EntityKind, LifecycleStatus, MatchPosition,
    MatchTier, PositionedMatch,
};
pub use position::{Location, Position, Range};
