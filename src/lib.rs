//! # Clip-Assembler
//!
//! Assemble short source clips into a single hero video.
//!
//! Clips and stills of mixed sizes are normalized to one canonical frame
//! size, joined with hard cuts or crossfades, followed by an optional
//! captioned end card, trimmed to a length budget and encoded to H.264 MP4.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clip_assembler::{composition::AssemblyEngine, config::Config};
//! use std::path::PathBuf;
//!
//! # fn main() -> clip_assembler::Result<()> {
//! let mut config = Config::default();
//! config.clips = vec![PathBuf::from("clip1_desk.mp4"), PathBuf::from("clip2_jobsite.mp4")];
//! config.composition.end_card_text = Some("Built for the field".to_string());
//! config.composition.max_duration = Some(15.0);
//!
//! let engine = AssemblyEngine::new(config)?;
//! let report = engine.assemble()?;
//! println!("{:.1}s, {} clips", report.duration, report.clips_used);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Source probing and decoding, normalization, end cards, encoding
//! - [`composition`] - Timeline composition, trimming and the assembly engine
//! - [`remote`] - Clients for hosted generation services
//! - [`config`] - Configuration management
//!
//! ## Custom sources
//!
//! Anything that can produce frames on demand can join a timeline by
//! implementing the [`Clip`](video::Clip) trait:
//!
//! ```rust,no_run
//! use clip_assembler::video::{Clip, ClipInfo, Frame};
//! use clip_assembler::Result;
//!
//! struct Black;
//!
//! impl Clip for Black {
//!     fn label(&self) -> String {
//!         "black".to_string()
//!     }
//!
//!     fn info(&self) -> ClipInfo {
//!         ClipInfo { width: 1280, height: 720, fps: 24.0, duration: 1.0 }
//!     }
//!
//!     fn frame_at(&mut self, _t: f64) -> Result<Frame> {
//!         Ok(Frame::new_filled(1280, 720, [0, 0, 0]))
//!     }
//! }
//! ```

pub mod composition;
pub mod config;
pub mod error;
pub mod remote;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{AssemblyEngine, AssemblyReport},
    config::Config,
    error::{AssemblerError, Result},
    video::{Clip, Frame},
};
