//! Subtitle track assembly and the on-disk document format.
//!
//! Per-chunk segments come in with chunk-local timestamps; assembly shifts
//! each group by its cumulative chunk offset, sorts globally by start time
//! and reindexes. Documents are indexed timestamp blocks; timestamps are
//! normalized to dot-decimal millisecond separators before persistence
//! (comma-decimal input is accepted and rewritten).

use crate::transcribe::TranscriptSegment;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Header prefixed to every persisted subtitle document.
pub const VTT_HEADER: &str = "WEBVTT\n\n";

/// One entry of an assembled track. Index is 1-based and contiguous;
/// entries are ordered by start time.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Merge per-chunk segment groups into one time-ordered track.
///
/// A running offset starts at zero and advances by `chunk_duration_secs`
/// per group whether or not the group produced segments, so chunk `i`'s
/// segments land at `t + i * chunk_duration_secs`. Invalid segments
/// (inverted times, blank text) are dropped. The final stable sort defends
/// against engines returning out-of-order segments; indices are reassigned
/// afterwards to stay contiguous.
pub fn assemble_track(
    groups: &[Vec<TranscriptSegment>],
    chunk_duration_secs: u64,
) -> Vec<SubtitleEntry> {
    let mut entries = Vec::new();
    let mut time_offset = 0.0;
    let mut index = 1;

    for group in groups {
        for segment in group.iter().filter(|s| s.is_valid()) {
            entries.push(SubtitleEntry {
                index,
                start: segment.start + time_offset,
                end: segment.end + time_offset,
                text: segment.text.trim().to_string(),
            });
            index += 1;
        }
        time_offset += chunk_duration_secs as f64;
    }

    entries.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(Ordering::Equal));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.index = i + 1;
    }
    entries
}

/// Render entries as indexed timestamp blocks.
pub fn compose_blocks(entries: &[SubtitleEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}\n{} --> {}\n{}\n",
                entry.index,
                format_timestamp(entry.start),
                format_timestamp(entry.end),
                entry.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full persisted document: header plus normalized blocks.
pub fn compose_document(entries: &[SubtitleEntry]) -> String {
    format!("{}{}", VTT_HEADER, normalize_timestamps(&compose_blocks(entries)))
}

fn timestamp_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2}:\d{2}:\d{2}),(\d{3})").expect("valid regex"))
}

/// Rewrite comma-decimal millisecond separators to dots.
pub fn normalize_timestamps(text: &str) -> String {
    timestamp_comma_re().replace_all(text, "$1.$2").into_owned()
}

/// Parse a persisted subtitle document back into entries.
///
/// Accepts both comma and dot millisecond separators and tolerates a
/// leading header line. Blocks without a parsable timestamp line are
/// skipped.
pub fn parse_document(text: &str) -> Vec<SubtitleEntry> {
    let body = text.strip_prefix(VTT_HEADER).unwrap_or(text);
    let mut entries = Vec::new();

    for block in body.split("\n\n") {
        let mut lines = block.lines().filter(|l| !l.trim().is_empty()).peekable();

        // Optional numeric index line before the timestamps.
        if let Some(first) = lines.peek() {
            if first.trim().chars().all(|c| c.is_ascii_digit()) {
                lines.next();
            }
        }

        let Some(times) = lines.next() else { continue };
        let Some((start_raw, end_raw)) = times.split_once("-->") else {
            continue;
        };
        let (Some(start), Some(end)) = (
            parse_timestamp(start_raw.trim()),
            parse_timestamp(end_raw.trim()),
        ) else {
            continue;
        };

        let text = lines.collect::<Vec<_>>().join("\n");
        if text.trim().is_empty() {
            continue;
        }

        entries.push(SubtitleEntry {
            index: entries.len() + 1,
            start,
            end,
            text,
        });
    }

    entries
}

/// `HH:MM:SS,mmm` with comma separator; normalization rewrites the comma.
fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_secs = total_millis / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

fn parse_timestamp(raw: &str) -> Option<f64> {
    let (hms, millis) = raw.split_once([',', '.'])?;
    let mut parts = hms.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let millis: f64 = millis.trim().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + millis / 1000.0)
}
