// feedback-service-rs/src/parser.rs
//
// Turns raw model output into a FeedbackResult.
//
// Model output is untrusted. Every failure is reported as a `ParseError`
// value; nothing here panics.

use serde_json::{Map, Value};

use crate::prompt::{ACTION_KEY, REPLY_KEY, SUMMARY_KEY};
use crate::FeedbackResult;

/// Model output that could not be turned into a three-field result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("model output is empty")]
    Empty,

    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model output is JSON but not an object")]
    NotAnObject,

    #[error("model output is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("key '{0}' is not a string")]
    NotAString(&'static str),
}

/// Parse raw model text into a `FeedbackResult`.
///
/// A key that is present with an empty string is accepted here; deciding
/// whether a blank field is good enough is the generator's call.
pub fn parse(raw: &str) -> Result<FeedbackResult, ParseError> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    Ok(FeedbackResult {
        customer_reply: string_field(object, REPLY_KEY)?,
        internal_summary: string_field(object, SUMMARY_KEY)?,
        recommended_action: string_field(object, ACTION_KEY)?,
    })
}

/// Remove a surrounding ``` fence, including any language tag on the opening line.
///
/// Text that does not start with a fence is returned unchanged.
fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }

    // Opening line ("```" or "```json") goes entirely.
    let inner = match text.find('\n') {
        Some(newline) => &text[newline + 1..],
        None => return "",
    };

    // Closing line goes only if it is a fence.
    let inner = inner.trim_end();
    let inner = match inner.rfind('\n') {
        Some(newline) if inner[newline + 1..].trim_start().starts_with("```") => &inner[..newline],
        None if inner.trim_start().starts_with("```") => "",
        _ => inner,
    };

    inner.trim()
}

fn string_field(object: &Map<String, Value>, key: &'static str) -> Result<String, ParseError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(ParseError::MissingKey(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::NotAString(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{"user_response":"Thanks!","admin_summary":"Happy customer","recommended_action":"None"}"#;

    fn expected() -> FeedbackResult {
        FeedbackResult {
            customer_reply: "Thanks!".to_string(),
            internal_summary: "Happy customer".to_string(),
            recommended_action: "None".to_string(),
        }
    }

    #[test]
    fn test_plain_json() {
        assert_eq!(parse(WELL_FORMED).unwrap(), expected());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let raw = r#"{"recommended_action":"None","user_response":"Thanks!","admin_summary":"Happy customer"}"#;
        assert_eq!(parse(raw).unwrap(), expected());
    }

    #[test]
    fn test_json_fence_is_stripped() {
        let raw = format!("```json\n{}\n```", WELL_FORMED);
        assert_eq!(parse(&raw).unwrap(), expected());
    }

    #[test]
    fn test_bare_fence_and_surrounding_whitespace() {
        let raw = format!("\n\n  ```\n{}\n```  \n", WELL_FORMED);
        assert_eq!(parse(&raw).unwrap(), expected());
    }

    #[test]
    fn test_unclosed_fence_still_parses() {
        let raw = format!("```json\n{}", WELL_FORMED);
        assert_eq!(parse(&raw).unwrap(), expected());
    }

    #[test]
    fn test_pretty_printed_json_in_fence() {
        let raw = "```json\n{\n  \"user_response\": \"Thanks!\",\n  \"admin_summary\": \"Happy customer\",\n  \"recommended_action\": \"None\"\n}\n```";
        assert_eq!(parse(raw).unwrap(), expected());
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let raw = r#"{"user_response":"Thanks!","admin_summary":"Happy customer","recommended_action":"None","sentiment":"positive"}"#;
        assert_eq!(parse(raw).unwrap(), expected());
    }

    #[test]
    fn test_empty_value_is_accepted() {
        let raw = r#"{"user_response":"","admin_summary":"Happy customer","recommended_action":"None"}"#;
        let result = parse(raw).unwrap();
        assert_eq!(result.customer_reply, "");
        assert!(!result.is_complete());
    }

    #[test]
    fn test_missing_key_is_unusable() {
        let raw = r#"{"user_response":"Thanks!","admin_summary":"Happy customer"}"#;
        assert_eq!(parse(raw), Err(ParseError::MissingKey(ACTION_KEY)));
    }

    #[test]
    fn test_null_value_counts_as_missing() {
        let raw = r#"{"user_response":null,"admin_summary":"a","recommended_action":"b"}"#;
        assert_eq!(parse(raw), Err(ParseError::MissingKey(REPLY_KEY)));
    }

    #[test]
    fn test_non_string_value_is_unusable() {
        let raw = r#"{"user_response":"a","admin_summary":42,"recommended_action":"b"}"#;
        assert_eq!(parse(raw), Err(ParseError::NotAString(SUMMARY_KEY)));
    }

    #[test]
    fn test_malformed_json_is_unusable() {
        let raw = r#"{"user_response":"Thanks!","admin_summary":"#;
        assert!(matches!(parse(raw), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_prose_is_unusable() {
        let raw = "Sure! Here is the JSON you asked for: {\"user_response\": \"Hi\"}";
        assert!(matches!(parse(raw), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn test_non_object_json_is_unusable() {
        assert_eq!(parse("[1, 2, 3]"), Err(ParseError::NotAnObject));
        assert_eq!(parse("\"just a string\""), Err(ParseError::NotAnObject));
    }

    #[test]
    fn test_empty_and_fence_only_input() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   \n "), Err(ParseError::Empty));
        assert_eq!(parse("```"), Err(ParseError::Empty));
        assert_eq!(parse("```json\n```"), Err(ParseError::Empty));
    }
}
