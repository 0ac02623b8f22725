//! Turns raw exec-mode model text into an [`ExecResult`].
//!
//! The model is asked for a bare `{"cmd", "exp", "exec"}` object but regularly
//! wraps it in prose or code fences. Parsing never fails: anything that does
//! not contain a usable object degrades to a non-executable explanation.

use memchr::memchr_iter;
use serde::Deserialize;

/// Marker a streamed exec reply starts with when the model declines to
/// produce a runnable command.
pub const NOEXEC_SENTINEL: &str = "[noexec]";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub command: String,
    pub explanation: String,
    pub executable: bool,
}

#[derive(Deserialize)]
struct ExecPayload {
    cmd: String,
    #[serde(default)]
    exp: String,
    #[serde(default)]
    exec: bool,
}

impl From<ExecPayload> for ExecResult {
    fn from(payload: ExecPayload) -> Self {
        let executable = payload.exec && is_single_line_command(&payload.cmd);
        Self {
            command: payload.cmd,
            explanation: payload.exp,
            executable,
        }
    }
}

impl ExecResult {
    fn not_executable(raw: &str) -> Self {
        Self {
            command: String::new(),
            explanation: raw.to_string(),
            executable: false,
        }
    }
}

fn is_single_line_command(cmd: &str) -> bool {
    !cmd.trim().is_empty() && !cmd.contains(['\n', '\r'])
}

/// Parse the model's exec-mode reply.
pub fn parse_exec_output(raw: &str) -> ExecResult {
    if let Ok(payload) = serde_json::from_str::<ExecPayload>(raw) {
        return payload.into();
    }

    embedded_payloads(raw)
        .next()
        .map(ExecResult::from)
        .unwrap_or_else(|| ExecResult::not_executable(raw))
}

/// Objects carrying a `cmd` key, found left to right wherever a `{` opens a
/// complete JSON object. Braces inside string values are handled by the JSON
/// parser rather than by the scan.
fn embedded_payloads(raw: &str) -> impl Iterator<Item = ExecPayload> + '_ {
    memchr_iter(b'{', raw.as_bytes()).filter_map(move |start| {
        let candidate = &raw[start..];
        if !candidate.contains("\"cmd\"") {
            return None;
        }
        serde_json::Deserializer::from_str(candidate)
            .into_iter::<ExecPayload>()
            .next()
            .and_then(Result::ok)
    })
}

/// Whether a streamed exec-mode reply may be offered for execution.
///
/// Only single-line text that does not open with [`NOEXEC_SENTINEL`] counts.
/// The text is not checked against the JSON contract used by
/// [`parse_exec_output`].
pub fn is_streamed_text_executable(text: &str) -> bool {
    !text.starts_with(NOEXEC_SENTINEL) && !text.contains('\n')
}
