//! # Composition Engine
//!
//! Joins normalized clips into a timeline, appends the end card, trims to
//! the length budget and renders the result.

pub mod engine;
pub mod exporter;
pub mod timeline;

// Re-exports for convenience
pub use engine::{AssemblyEngine, AssemblyReport};
pub use exporter::Exporter;
pub use timeline::{Compositor, Segment, Timeline, Transition};
