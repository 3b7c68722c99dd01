//! Utilities for extracting structured data from generative responses.
//!
//! Provider responses often wrap JSON in markdown code fences or mix it with
//! explanatory text. This module provides best-effort extraction tolerant of
//! fence wrapping and truncated responses, plus typed parsing.

use fabula_error::{FabulaResult, ProviderError, ProviderErrorKind};

/// Extract JSON from a response that may contain markdown or extra text.
///
/// Tries, in order:
/// 1. Markdown code blocks: ```json ... ```
/// 2. Balanced braces: { ... }
/// 3. Balanced brackets: [ ... ]
///
/// # Errors
///
/// Returns an error if no JSON-like structure is found in the response.
///
/// # Examples
///
/// ```
/// use fabula_pipeline::extract_json;
///
/// let response = "Here's your story:\n```json\n{\"title\": \"Der Wald\"}\n```\n";
/// let json = extract_json(response).unwrap();
/// assert!(json.contains("Der Wald"));
/// ```
pub fn extract_json(response: &str) -> FabulaResult<String> {
    if let Some(json) = extract_from_code_block(response, "json") {
        return Ok(json);
    }

    // Prefer whichever structure appears first in the response.
    let bracket_pos = response.find('[');
    let brace_pos = response.find('{');

    match (bracket_pos, brace_pos) {
        (Some(b_pos), Some(c_pos)) if b_pos < c_pos => {
            if let Some(json) = extract_balanced(response, '[', ']') {
                return Ok(json);
            }
            if let Some(json) = extract_balanced(response, '{', '}') {
                return Ok(json);
            }
        }
        (Some(_), None) => {
            if let Some(json) = extract_balanced(response, '[', ']') {
                return Ok(json);
            }
        }
        _ => {
            if let Some(json) = extract_balanced(response, '{', '}') {
                return Ok(json);
            }
            if let Some(json) = extract_balanced(response, '[', ']') {
                return Ok(json);
            }
        }
    }

    tracing::error!(
        response_length = response.len(),
        "No JSON found in provider response"
    );

    Err(ProviderError::new(ProviderErrorKind::MalformedResponse(format!(
        "no JSON found in response (length: {})",
        response.len()
    )))
    .into())
}

/// Extract content from markdown code blocks.
fn extract_from_code_block(response: &str, language: &str) -> Option<String> {
    let pattern = format!("```{}", language);

    if let Some(start) = response.find(&pattern) {
        let content_start = start + pattern.len();
        if let Some(end) = response[content_start..].find("```") {
            let content = &response[content_start..content_start + end];
            return Some(content.trim().to_string());
        }
        // No closing fence - likely a truncated response; take the rest.
        return Some(response[content_start..].trim().to_string());
    }

    // Try without language specifier
    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        let skip_to = response[content_start..]
            .find('\n')
            .map(|n| content_start + n + 1)
            .unwrap_or(content_start);

        if let Some(end) = response[skip_to..].find("```") {
            let content = &response[skip_to..skip_to + end];
            return Some(content.trim().to_string());
        }
        return Some(response[skip_to..].trim().to_string());
    }

    None
}

/// Extract content between balanced delimiters, handling nesting and
/// string/escape state.
fn extract_balanced(response: &str, open: char, close: char) -> Option<String> {
    let start = response.find(open)?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse extracted JSON into a typed value.
///
/// # Errors
///
/// Returns an error if the JSON string cannot be parsed into type `T`.
pub fn parse_json<T>(json_str: &str) -> FabulaResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(json_str).map_err(|e| {
        let preview = json_str.chars().take(100).collect::<String>();

        tracing::error!(
            error = %e,
            json_preview = %preview,
            "JSON parsing failed"
        );

        ProviderError::new(ProviderErrorKind::MalformedResponse(format!(
            "failed to parse JSON: {e} (JSON: {preview}...)"
        )))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_block() {
        let response = "Here is the story:\n\n```json\n{\n  \"title\": \"Die Reise\"\n}\n```\n\nEnjoy!";
        let json = extract_json(response).unwrap();
        assert!(json.contains("\"title\""));
        assert!(!json.contains("```"));
    }

    #[test]
    fn test_extract_json_balanced_braces() {
        let response = r#"Sure! {"title": "x", "nested": {"a": 1}}"#;
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
        assert!(json.contains("nested"));
    }

    #[test]
    fn test_extract_json_array_first() {
        let response = "chapters: [{\"chapter\": 1}, {\"chapter\": 2}]";
        let json = extract_json(response).unwrap();
        assert!(json.starts_with('['));
    }

    #[test]
    fn test_extract_json_with_string_escapes() {
        let response = r#"{"text": "Sie sagte \"hallo\" und {winkte}"}"#;
        let json = extract_json(response).unwrap();
        assert!(json.contains("winkte"));
    }

    #[test]
    fn test_truncated_fence_recovers() {
        let response = "```json\n{\"title\": \"cut off\"}";
        let json = extract_json(response).unwrap();
        assert!(json.contains("cut off"));
    }

    #[test]
    fn test_no_json_is_an_error() {
        assert!(extract_json("plain prose, no structure").is_err());
    }

    #[test]
    fn test_parse_json_typed() {
        #[derive(serde::Deserialize)]
        struct Probe {
            chapter: u32,
        }
        let probe: Probe = parse_json(r#"{"chapter": 3}"#).unwrap();
        assert_eq!(probe.chapter, 3);
    }
}
