//! Interaction channel abstraction.
//!
//! A channel is whatever surface can show a flat form to a person and hand
//! back their answers: an MCP elicitation, a web form, a terminal prompt.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use shipfill_core::{CollectedAnswers, FormSchema};

/// Errors from an interaction channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// What the person did with a presented form.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentOutcome {
    Accepted(CollectedAnswers),
    Declined,
    Cancelled,
}

/// Channel abstraction allows swapping presentation surfaces.
///
/// `present` is the only suspension point of a completion; no timeout is
/// imposed on it.
#[async_trait]
pub trait InteractionChannel: Send + Sync {
    /// Whether this channel can render forms at all.
    fn supports_form(&self) -> bool;

    /// Show `form` with `message` and wait for the outcome.
    async fn present(&self, message: &str, form: &FormSchema) -> Result<PresentOutcome, ChannelError>;
}

/// Flatten a JSON object of answers into [`CollectedAnswers`].
///
/// Numbers and booleans are stringified and nulls dropped. Nested values
/// cannot come from a flat form and are rejected.
pub fn answers_from_json(value: &Value) -> Result<CollectedAnswers, ChannelError> {
    let Some(map) = value.as_object() else {
        return Err(ChannelError::InvalidResponse(format!(
            "expected an object of answers, got {}",
            shipfill_core::path::kind_name(value)
        )));
    };

    let mut answers = CollectedAnswers::new();
    for (key, raw) in map {
        let text = match raw {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ChannelError::InvalidResponse(format!(
                    "answer '{key}' must be a primitive value"
                )))
            }
        };
        answers.insert(key.clone(), text);
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answers_from_json_coerces_primitives() {
        let answers = answers_from_json(&json!({
            "shipper_name": "Acme",
            "package_1_weight": 5.5,
            "quantity": 3,
            "residential": true,
            "skipped": null
        }))
        .unwrap();
        assert_eq!(answers["shipper_name"], "Acme");
        assert_eq!(answers["package_1_weight"], "5.5");
        assert_eq!(answers["quantity"], "3");
        assert_eq!(answers["residential"], "true");
        assert!(!answers.contains_key("skipped"));
    }

    #[test]
    fn test_answers_from_json_rejects_non_flat() {
        assert!(matches!(
            answers_from_json(&json!(["a"])),
            Err(ChannelError::InvalidResponse(_))
        ));
        let err = answers_from_json(&json!({"nested": {"a": 1}})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid response: answer 'nested' must be a primitive value");
    }

    #[test]
    fn test_transport_error_wraps_anyhow() {
        let err: ChannelError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.to_string(), "connection reset");
    }
}
