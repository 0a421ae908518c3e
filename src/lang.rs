//! The fixed set of languages the pipeline can transcribe into or
//! translate between.

/// Supported language codes (ISO 639-1).
pub const SUPPORTED_LANGUAGES: [&str; 12] = [
    "en", "de", "es", "hu", "cs", "sv", "ru", "zh", "ja", "he", "ro", "fr",
];

/// True if `code` is one of the supported languages.
pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

/// Human-readable label for a supported language code, used for subtitle
/// track listings.
pub fn language_label(code: &str) -> &'static str {
    match code {
        "en" => "English",
        "de" => "German",
        "es" => "Spanish",
        "hu" => "Hungarian",
        "cs" => "Czech",
        "sv" => "Swedish",
        "ru" => "Russian",
        "zh" => "Chinese",
        "ja" => "Japanese",
        "he" => "Hebrew",
        "ro" => "Romanian",
        "fr" => "French",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_set() {
        assert!(is_supported("en"));
        assert!(is_supported("he"));
        assert!(!is_supported("ko"));
        assert_eq!(SUPPORTED_LANGUAGES.len(), 12);
    }

    #[test]
    fn test_labels() {
        assert_eq!(language_label("de"), "German");
        assert_eq!(language_label("zh"), "Chinese");
        assert_eq!(language_label("xx"), "Unknown");
    }
}
