//! FFmpeg wrapper used to join rendered scene segments into one video.
//!
//! All muxing goes through the FFmpeg CLI. The [`Muxer`] trait is the seam the
//! pipeline depends on so tests can swap in an in-process implementation.

pub mod command;
pub mod concat;
pub mod error;
pub mod probe;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use concat::{concat_list_contents, normalize_command, FfmpegMuxer, Muxer, NormalizeProfile};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_streams, StreamSummary};
