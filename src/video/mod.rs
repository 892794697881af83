//! # Video Processing Module
//!
//! Opens source footage and stills, normalizes them to the canonical frame
//! size, draws end cards and encodes the final frames.

pub mod encoder;
pub mod endcard;
pub mod loader;
pub mod normalize;
pub mod probe;
pub mod source;
pub mod stderr;
pub mod types;

pub use encoder::{EncodedVideo, ExportSettings, FfmpegEncoder, FrameSink};
pub use endcard::{EndCard, EndCardSynthesizer};
pub use loader::{ClipListing, ListingStatus, LoadedSources, SkippedClip, SourceLoader};
pub use normalize::{ClipNormalizer, CropWindow, NormalizedClip};
pub use probe::VideoMetadata;
pub use source::FileClip;
pub use types::{Clip, ClipInfo, Frame, StaticClip};
