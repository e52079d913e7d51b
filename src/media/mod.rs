//! Video probing, thumbnails and card previews.

pub mod preview;
pub mod probe;
pub mod thumbnail;

pub use preview::{Preview, PreviewCache, PreviewKey, PREVIEW_SIZE};
pub use probe::{video_info_or_default, HeaderProbe, MediaDecoder, VideoInfo};
pub use thumbnail::{fit_within, ThumbnailGenerator, ThumbnailKind, THUMB_MAX_SIZE};
