pub mod kyutai;
pub mod mock;
pub mod qwen;

/// Maps an ISO language code to the capitalized label Qwen's custom-voice
/// model expects. Unknown codes pass through unchanged; empty/absent
/// resolves to `"Auto"`.
pub(crate) fn resolve_qwen_language(language: Option<&str>) -> String {
    const MAP: &[(&str, &str)] = &[
        ("auto", "Auto"),
        ("zh", "Chinese"),
        ("en", "English"),
        ("ja", "Japanese"),
        ("ko", "Korean"),
        ("de", "German"),
        ("fr", "French"),
        ("es", "Spanish"),
        ("pt", "Portuguese"),
        ("ru", "Russian"),
        ("it", "Italian"),
    ];

    let Some(language) = language else {
        return "Auto".to_string();
    };
    let normalized = language.trim().to_lowercase();
    if normalized.is_empty() {
        return "Auto".to_string();
    }
    MAP.iter()
        .find(|(code, _)| *code == normalized)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| language.to_string())
}

/// Kyutai accepts only this small set of language hints; anything else (or
/// `auto`/absent) is coerced to `None`, meaning "let the model decide".
pub(crate) fn resolve_kyutai_language(language: Option<&str>) -> Option<String> {
    const ALLOWED: &[&str] = &["en", "fr"];
    let language = language?;
    let normalized = language.trim().to_lowercase();
    if normalized == "auto" || normalized.is_empty() {
        return None;
    }
    ALLOWED
        .iter()
        .find(|&&code| code == normalized)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qwen_language_maps_known_codes() {
        assert_eq!(resolve_qwen_language(Some("en")), "English");
        assert_eq!(resolve_qwen_language(Some("ZH")), "Chinese");
    }

    #[test]
    fn qwen_language_defaults_to_auto() {
        assert_eq!(resolve_qwen_language(None), "Auto");
        assert_eq!(resolve_qwen_language(Some("")), "Auto");
    }

    #[test]
    fn qwen_language_passes_through_unknown_codes() {
        assert_eq!(resolve_qwen_language(Some("xx")), "xx");
    }

    #[test]
    fn kyutai_language_coerces_auto_to_none() {
        assert_eq!(resolve_kyutai_language(Some("auto")), None);
        assert_eq!(resolve_kyutai_language(None), None);
    }

    #[test]
    fn kyutai_language_allows_known_codes_only() {
        assert_eq!(resolve_kyutai_language(Some("fr")), Some("fr".to_string()));
        assert_eq!(resolve_kyutai_language(Some("de")), None);
    }
}
