//! FFmpeg-backed deepfake video analysis: frame extraction, the per-frame
//! locate/classify pipeline and report thumbnails.

extern crate ffmpeg_next as ffmpeg;

pub mod extractor;
pub mod pipeline;
pub mod thumbnail;
