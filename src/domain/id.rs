use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PaymentError;

/// Provider-assigned payment identifier. Opaque, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, PaymentError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PaymentError::validation(
                "PaymentId must not be empty",
                "Missing payment reference.",
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Webhook event identifier, kept for audit only.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, PaymentError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PaymentError::validation(
                "EventId must not be empty",
                "Invalid event.",
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
