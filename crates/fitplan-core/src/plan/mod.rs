//! Plan payloads: validation, prompt construction and the local fallback.

pub mod fallback;
pub mod prompt;

use serde_json::Value;

/// Why a JSON document is not a usable plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("plan is not a JSON object")]
    NotAnObject,
    #[error("plan has no `days` object")]
    MissingDays,
    #[error("plan `days` object is empty")]
    EmptyDays,
}

/// A plan document known to carry a non-empty `days` object.
///
/// The rest of the document is opaque to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanPayload(Value);

impl PlanPayload {
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;
        let days = object
            .get("days")
            .and_then(Value::as_object)
            .ok_or(PayloadError::MissingDays)?;
        if days.is_empty() {
            return Err(PayloadError::EmptyDays);
        }
        Ok(Self(value))
    }

    /// Entries of the `days` object.
    pub fn days(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0
            .get("days")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}
