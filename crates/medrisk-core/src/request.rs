//! Analysis request payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// The payload submitted for analysis, typically an EMR-shaped document.
///
/// The queueing core treats the content as opaque and validates shape only:
/// it must be a non-empty JSON object. Field-level validation (patient
/// demographics, medication lists) belongs to the submitting layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct AnalysisRequest(Value);

impl AnalysisRequest {
    /// Validate and wrap a raw payload.
    pub fn from_value(value: Value) -> Result<Self> {
        match value.as_object() {
            None => Err(Error::InvalidRequest(
                "payload must be a JSON object".to_string(),
            )),
            Some(map) if map.is_empty() => {
                Err(Error::InvalidRequest("payload must not be empty".to_string()))
            }
            Some(_) => Ok(Self(value)),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl TryFrom<Value> for AnalysisRequest {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}
