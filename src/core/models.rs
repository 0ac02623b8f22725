//! Gemini model-name validation.

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const CURRENT_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-2.5-flash-lite",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
];

const RETIRED_MODELS: &[(&str, &str)] = &[
    ("gemini-pro", "gemini-2.5-flash"),
    ("gemini-1.5-pro", "gemini-2.5-flash"),
    ("gemini-1.5-flash", "gemini-2.5-flash"),
    ("gemini-1.5-flash-latest", "gemini-2.5-flash"),
    ("gemini-1.5-flash-8b", "gemini-2.5-flash-lite"),
];

/// Map a configured model name onto one the API still serves.
///
/// Retired names are redirected to their closest successor and anything
/// unrecognised falls back to [`DEFAULT_MODEL`].
pub fn resolve_model_name(requested: &str) -> &'static str {
    let requested = requested.trim().trim_start_matches("models/");

    if let Some(current) = CURRENT_MODELS.iter().find(|name| **name == requested) {
        return current;
    }

    RETIRED_MODELS
        .iter()
        .find(|(retired, _)| *retired == requested)
        .map(|(_, successor)| *successor)
        .unwrap_or(DEFAULT_MODEL)
}
