//! Turns raw model text into an [`AuditResult`] or a validation [`AuditFailure`].
//!
//! Accepted shapes: a bare JSON object, one inside a Markdown code fence, or
//! one surrounded by prose (the span from the first `{` to the last `}`).
//! Unknown keys are ignored.

use serde_json::Value;

use actready_core::audit::{AuditFailure, AuditResult, ValidationError, MAX_ACTIONS};

/// Parse and validate, keeping the verbatim text on failure.
pub fn validate(raw: &str) -> Result<AuditResult, AuditFailure> {
    parse_report(raw).map_err(|e| AuditFailure::validation(&e, raw))
}

pub fn parse_report(raw: &str) -> Result<AuditResult, ValidationError> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => {
            let candidate = extract_json(raw).ok_or(ValidationError::NoJsonObject)?;
            serde_json::from_str(candidate).map_err(|e| ValidationError::Malformed(e.to_string()))?
        }
    };

    if !value.is_object() {
        return Err(ValidationError::NoJsonObject);
    }
    if let Some(actions) = value.get("actions").and_then(Value::as_array) {
        if actions.len() > MAX_ACTIONS {
            return Err(ValidationError::TooManyActions {
                count: actions.len(),
            });
        }
    }

    serde_json::from_value(value).map_err(|e| ValidationError::Schema(e.to_string()))
}

/// Locate the JSON object text inside a model answer that is not bare JSON.
///
/// An unterminated object runs to the end of the text so that truncated
/// output surfaces as malformed JSON rather than as missing JSON.
fn extract_json(raw: &str) -> Option<&str> {
    let body = fenced_body(raw).unwrap_or(raw);
    let start = body.find('{')?;
    let end = body.rfind('}').filter(|&end| end > start).map_or(body.len(), |end| end + 1);
    Some(body[start..end].trim())
}

/// Content of a Markdown code fence wrapping the answer.
///
/// The opening fence must start a line and come before any `{`; the body
/// runs to the last fence in the text, so fences inside JSON string values
/// stay part of the object.
fn fenced_body(raw: &str) -> Option<&str> {
    let open = raw
        .match_indices("```")
        .map(|(i, _)| i)
        .find(|&i| i == 0 || raw[..i].ends_with('\n'))?;
    if raw[..open].contains('{') {
        return None;
    }
    let after_ticks = &raw[open + 3..];
    // Skip the info string (e.g. `json`) up to the end of the line
    let content_start = after_ticks.find('\n').map_or(after_ticks.len(), |i| i + 1);
    let content = &after_ticks[content_start..];
    let close = content.rfind("```").unwrap_or(content.len());
    let body = &content[..close];
    body.contains('{').then_some(body)
}
