//! Filename/path sanitization and streaming-URL derivation.
//!
//! Keys coming out of object storage may contain parentheses and
//! whitespace; both break the downstream streaming-URL scheme, so every
//! path component that ends up in a CDN URL goes through `sanitize_path`
//! or `sanitize_filename` first.

use regex::Regex;
use std::sync::OnceLock;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s").expect("valid regex"))
}

/// Strip parentheses from a filename. Whitespace is preserved; this is the
/// convention used for persisted artifact filenames.
pub fn clean_filename(name: &str) -> String {
    name.replace(['(', ')'], "")
}

/// Strip parentheses and replace any whitespace with underscores in a
/// filename base. Idempotent.
pub fn sanitize_filename(name: &str) -> String {
    let without_parens = name.replace(['(', ')'], "");
    whitespace_re().replace_all(&without_parens, "_").into_owned()
}

/// Strip parentheses and replace any whitespace with underscores across an
/// entire path string. Idempotent; applied uniformly to every segment.
pub fn sanitize_path(path: &str) -> String {
    let without_parens = path.replace(['(', ')'], "");
    whitespace_re().replace_all(&without_parens, "_").into_owned()
}

/// Streaming endpoints derived for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingUrls {
    pub dash_url: String,
    pub hls_url: String,
    pub preview_url: String,
}

/// Build the DASH/HLS/preview URL set for a video key.
///
/// With `advanced_encoding` the renditions live under the full key
/// (extension included) and are named after the file; otherwise they live
/// under the extension-less media path with fixed manifest names.
pub fn build_streaming_urls(base_url: &str, key: &str, advanced_encoding: bool) -> StreamingUrls {
    let media_path = strip_extension(key);
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let file_base = sanitize_filename(strip_extension(file_name));

    if advanced_encoding {
        let cleaned = sanitize_path(key);
        StreamingUrls {
            dash_url: format!("https://{base_url}/{cleaned}/dash/{file_base}.mpd"),
            hls_url: format!("https://{base_url}/{cleaned}/hls/{file_base}.m3u8"),
            preview_url: format!("https://{base_url}/{cleaned}/img/{file_base}_01.png"),
        }
    } else {
        let cleaned = sanitize_path(media_path);
        StreamingUrls {
            dash_url: format!("https://{base_url}/{cleaned}/dash/stream.mpd"),
            hls_url: format!("https://{base_url}/{cleaned}/hls/master.m3u8"),
            preview_url: format!("https://{base_url}/{cleaned}/img/{file_base}_01.png"),
        }
    }
}

/// The key with its final extension removed, or unchanged if it has none.
pub fn strip_extension(key: &str) -> &str {
    match key.rfind('.') {
        Some(pos) if pos > key.rfind('/').map_or(0, |p| p + 1) => &key[..pos],
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("lesson(1) intro"), "lesson1 intro");
        assert_eq!(clean_filename("plain"), "plain");
    }

    #[test]
    fn test_sanitize_removes_parens_and_whitespace() {
        assert_eq!(sanitize_filename("lesson(1) intro"), "lesson1_intro");
        assert_eq!(sanitize_path("a b/c(d)/e\tf"), "a_b/cd/e_f");
    }

    #[test]
    fn test_sanitize_idempotent() {
        for input in ["lesson(1) intro.mp4", "x y z", "(((", "already_clean"] {
            let once = sanitize_path(input);
            assert_eq!(sanitize_path(&once), once);
            assert!(!once.contains('('));
            assert!(!once.contains(')'));
            assert!(!once.chars().any(char::is_whitespace));
        }
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("dir/video.mp4"), "dir/video");
        assert_eq!(strip_extension("dir.v1/video"), "dir.v1/video");
        assert_eq!(strip_extension("noext"), "noext");
    }

    #[test]
    fn test_streaming_urls_default_encoding() {
        let urls = build_streaming_urls("cdn.test", "course/lesson(1) intro.mp4", false);
        assert_eq!(urls.dash_url, "https://cdn.test/course/lesson1_intro/dash/stream.mpd");
        assert_eq!(urls.hls_url, "https://cdn.test/course/lesson1_intro/hls/master.m3u8");
        assert_eq!(
            urls.preview_url,
            "https://cdn.test/course/lesson1_intro/img/lesson1_intro_01.png"
        );
    }

    #[test]
    fn test_streaming_urls_advanced_encoding() {
        let urls = build_streaming_urls("cdn.test", "course/clip one.mp4", true);
        assert_eq!(urls.dash_url, "https://cdn.test/course/clip_one.mp4/dash/clip_one.mpd");
        assert_eq!(urls.hls_url, "https://cdn.test/course/clip_one.mp4/hls/clip_one.m3u8");
    }
}
