use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Result, VidscribeError};

use super::{AudioChunk, AUDIO_CODEC, CHUNK_DURATION_SECS};

/// Check that ffmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg").arg("-version").output().map_err(|e| {
        VidscribeError::Chunking(format!(
            "ffmpeg not found. Please install ffmpeg and ensure it's in your PATH. Error: {e}"
        ))
    })?;

    if !output.status.success() {
        return Err(VidscribeError::Chunking("ffmpeg check failed".to_string()));
    }

    debug!("ffmpeg is available");
    Ok(())
}

/// Split a video's audio track into fixed-duration chunks.
///
/// Runs ffmpeg in segment mode, writing `chunk_NNN.m4a` files into
/// `out_dir`. Returns the chunks in playback order. A failing ffmpeg run
/// is fatal for the whole video; there is no partial-chunk recovery.
pub fn extract_audio_chunks(video_path: &Path, out_dir: &Path) -> Result<Vec<AudioChunk>> {
    check_ffmpeg()?;

    if !video_path.exists() {
        return Err(VidscribeError::Chunking(format!(
            "input video not found: {}",
            video_path.display()
        )));
    }

    std::fs::create_dir_all(out_dir)
        .map_err(|e| VidscribeError::Chunking(format!("failed to create chunk dir: {e}")))?;

    let template = out_dir.join("chunk_%03d.m4a");
    info!("Extracting audio and splitting into chunks...");
    debug!(
        "ffmpeg segment: input={}, template={}",
        video_path.display(),
        template.display()
    );

    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(video_path)
        .args(["-f", "segment", "-segment_time"])
        .arg(CHUNK_DURATION_SECS.to_string())
        .args(["-c:a", AUDIO_CODEC, "-vn"])
        .arg(&template)
        .status()
        .map_err(|e| VidscribeError::Chunking(format!("failed to run ffmpeg: {e}")))?;

    if !status.success() {
        return Err(VidscribeError::Chunking(
            "ffmpeg audio segmentation failed".to_string(),
        ));
    }

    let mut paths: Vec<_> = std::fs::read_dir(out_dir)
        .map_err(|e| VidscribeError::Chunking(format!("failed to read chunk dir: {e}")))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("m4a"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(VidscribeError::Chunking(
            "ffmpeg produced no audio chunks".to_string(),
        ));
    }

    let chunks: Vec<AudioChunk> = paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| AudioChunk { index, path })
        .collect();

    info!("Created {} audio chunks", chunks.len());
    Ok(chunks)
}

/// Delete a consumed chunk file.
pub fn remove_chunk(chunk: &AudioChunk) -> Result<()> {
    if chunk.path.exists() {
        std::fs::remove_file(&chunk.path).map_err(|e| {
            VidscribeError::Chunking(format!(
                "failed to remove chunk file {}: {e}",
                chunk.path.display()
            ))
        })?;
    }
    Ok(())
}
