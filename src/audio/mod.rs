pub mod chunk;

pub use chunk::{check_ffmpeg, extract_audio_chunks, remove_chunk};

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Duration of one audio chunk in seconds. Chunk `i`'s subtitle
/// timestamps are offset by `i * CHUNK_DURATION_SECS` when merged.
pub const CHUNK_DURATION_SECS: u64 = 300;

/// Audio codec used for chunk files.
pub const AUDIO_CODEC: &str = "aac";

/// One bounded-duration slice of a video's audio track.
///
/// The file is owned by the pipeline processing the video: produced by the
/// chunking stage, deleted right after its transcription is consumed.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// 0-based position in playback order.
    pub index: usize,
    pub path: PathBuf,
}

/// Splits a video's audio track into bounded chunks.
///
/// The external segmenting tool sits behind this seam so the pipeline can
/// be exercised without it.
pub trait Chunker: Send + Sync {
    fn chunk(&self, video_path: &Path, out_dir: &Path) -> Result<Vec<AudioChunk>>;
}

/// Production chunker backed by ffmpeg segment mode.
pub struct FfmpegChunker;

impl Chunker for FfmpegChunker {
    fn chunk(&self, video_path: &Path, out_dir: &Path) -> Result<Vec<AudioChunk>> {
        extract_audio_chunks(video_path, out_dir)
    }
}
