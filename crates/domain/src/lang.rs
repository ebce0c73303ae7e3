//! Language-tag matching.
//!
//! Speech providers report detected languages as BCP-47-ish tags
//! (`ja-JP`, `zh`, sometimes `cmn-Hans-CN`). Output routing only cares
//! whether the detected language already *is* the target language, so the
//! comparison is deliberately loose: primary-subtag prefix match, plus the
//! Mandarin (`cmn`) → Chinese (`zh`) aliasing some recognizers emit.

/// Returns `true` when `detected` and `target` name the same language.
///
/// Empty on either side never matches — an output with no target language
/// is handled before this is consulted, and a recognizer that did not
/// report a language gives us nothing to compare.
pub fn is_lang_match(detected: &str, target: &str) -> bool {
    if detected.is_empty() || target.is_empty() {
        return false;
    }
    let detected = detected.to_ascii_lowercase();
    let target = target.to_ascii_lowercase();

    if detected.starts_with("cmn") && target.starts_with("zh") {
        return true;
    }

    let d: String = detected.chars().take(2).collect();
    let t: String = target.chars().take(2).collect();
    d == t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_subtag_matches_regional_variant() {
        assert!(is_lang_match("ja", "ja-JP"));
        assert!(is_lang_match("ja-JP", "ja"));
        assert!(is_lang_match("zh-CN", "zh-TW"));
    }

    #[test]
    fn match_is_case_insensitive() {
        assert!(is_lang_match("JA-jp", "ja-JP"));
        assert!(is_lang_match("EN-us", "en-GB"));
    }

    #[test]
    fn mandarin_alias_maps_to_chinese() {
        assert!(is_lang_match("cmn-Hans-CN", "zh-CN"));
        assert!(is_lang_match("cmn", "zh"));
        // But not the other direction, and not to other targets.
        assert!(!is_lang_match("cmn-Hans-CN", "ja-JP"));
    }

    #[test]
    fn different_languages_do_not_match() {
        assert!(!is_lang_match("ja-JP", "zh-CN"));
        assert!(!is_lang_match("en-US", "ja-JP"));
    }

    #[test]
    fn empty_side_never_matches() {
        assert!(!is_lang_match("", "ja-JP"));
        assert!(!is_lang_match("ja-JP", ""));
        assert!(!is_lang_match("", ""));
    }
}
