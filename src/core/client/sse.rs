//! Server-sent-events decoding for `streamGenerateContent?alt=sse`.

use memchr::memchr;

use crate::api::GenerateContentResponse;
use crate::core::error::ClientError;

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Decode one `data:` payload. `Ok(None)` means the payload carried no text.
fn decode_payload(payload: &str) -> Result<Option<String>, ClientError> {
    if payload.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|_| ClientError::Stream(format_api_error(payload)))?;

    if value.get("error").is_some() {
        return Err(ClientError::Stream(format_api_error(payload)));
    }

    let response: GenerateContentResponse =
        serde_json::from_value(value).map_err(|err| ClientError::Decode(err.to_string()))?;
    let text = response.text();
    Ok((!text.is_empty()).then_some(text))
}

/// Incremental line splitter that turns raw body bytes into text chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed body bytes; returns the chunks completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, ClientError>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = Self::decode_line(&line[..newline_pos]) {
                events.push(event);
            }
        }

        events
    }

    /// Decode whatever is left once the body has ended.
    pub fn finish(&mut self) -> Vec<Result<String, ClientError>> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest).into_iter().collect()
    }

    fn decode_line(line: &[u8]) -> Option<Result<String, ClientError>> {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line.trim(),
            Err(err) => {
                return Some(Err(ClientError::Decode(format!(
                    "invalid UTF-8 in stream: {err}"
                ))))
            }
        };

        let payload = extract_data_payload(line)?;
        decode_payload(payload).transpose()
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        })
        .or_else(|| {
            // Gemini sometimes answers with a one-element array of errors.
            value
                .pointer("/0/error/message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Render a provider error body for display: a one-line summary when one can
/// be found, followed by the body itself.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error: <empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n{}", summary, pretty_json);
                }
            }
            return format!("API Error:\n{}", pretty_json);
        }
    }

    format!("API Error: {}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_texts(events: Vec<Result<String, ClientError>>) -> Vec<String> {
        events
            .into_iter()
            .map(|event| event.expect("expected a text chunk"))
            .collect()
    }

    #[test]
    fn decodes_spacing_variants() {
        let mut decoder = SseDecoder::new();
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n",
            "\n",
            "data:{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\r\n",
        );
        assert_eq!(chunk_texts(decoder.push(body.as_bytes())), ["Hel", "lo"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn lines_split_across_pushes_are_reassembled() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"héllo\"}]}}]}\n";
        let (head, tail) = line.as_bytes().split_at(40);
        assert!(decoder.push(head).is_empty());
        assert_eq!(chunk_texts(decoder.push(tail)), ["héllo"]);
    }

    #[test]
    fn trailing_line_without_newline_is_flushed() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"end\"}]}}]}";
        assert!(decoder.push(line.as_bytes()).is_empty());
        assert_eq!(chunk_texts(decoder.finish()), ["end"]);
    }

    #[test]
    fn chunks_without_text_are_skipped() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"candidates\":[{\"finishReason\":\"STOP\"}],\"usageMetadata\":{}}\n: keep-alive\n";
        assert!(decoder.push(body.as_bytes()).is_empty());
    }

    #[test]
    fn in_band_errors_are_stream_failures() {
        let mut decoder = SseDecoder::new();
        let body = "data: {\"error\":{\"code\":500,\"message\":\"internal  error\",\"status\":\"INTERNAL\"}}\n";
        let events = decoder.push(body.as_bytes());
        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(ClientError::Stream(text)) => {
                assert!(text.starts_with("API Error: internal error\n{"));
            }
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn format_api_error_prettifies_json_with_summary() {
        let raw = r#"{"error":{"message":"model overloaded","status":"UNAVAILABLE"}}"#;
        let expected = r#"API Error: model overloaded
{
  "error": {
    "message": "model overloaded",
    "status": "UNAVAILABLE"
  }
}"#;
        assert_eq!(format_api_error(raw), expected);
    }

    #[test]
    fn format_api_error_handles_arrays_and_plaintext() {
        let raw = r#"[{"error":{"code":404,"message":"model not found"}}]"#;
        assert!(format_api_error(raw).starts_with("API Error: model not found\n["));
        assert_eq!(format_api_error("bad gateway"), "API Error: bad gateway");
        assert_eq!(format_api_error("   "), "API Error: <empty>");
    }
}
