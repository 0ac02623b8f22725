//! Endpoint construction for the Gemini REST API.

/// Remove trailing slashes so endpoints can be appended without doubling them.
///
/// ```
/// use xang::utils::url::normalize_base_url;
///
/// assert_eq!(
///     normalize_base_url("https://generativelanguage.googleapis.com/v1beta/"),
///     "https://generativelanguage.googleapis.com/v1beta"
/// );
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// URL of a model method such as `generateContent`.
///
/// A `models/` prefix on the model name is accepted, since the API reports
/// model names in that form.
///
/// ```
/// use xang::utils::url::model_method_url;
///
/// assert_eq!(
///     model_method_url("https://example.test/v1beta/", "models/gemini-2.5-flash", "generateContent"),
///     "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
/// );
/// ```
pub fn model_method_url(base_url: &str, model: &str, method: &str) -> String {
    let model = model.trim().trim_start_matches("models/");
    format!(
        "{}/models/{}:{}",
        normalize_base_url(base_url),
        model,
        method.trim_start_matches(':')
    )
}
