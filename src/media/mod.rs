//! Media handling around the core loop: frame overlays, event clips and
//! conversion/sync of recorded footage.

pub mod archive;
pub mod clip;
pub mod overlay;

pub use archive::{Archiver, RecordingArchiver, SyncError, SyncReport};
pub use clip::{ClipError, ClipFrame, ClipWriter, FfmpegClipWriter};
