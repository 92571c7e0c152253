//! The JSON record clients exchange through the relay.
//!
//! Only two fields mean anything to the server: `toUserId` picks the
//! recipient and `fromUserId` is always overwritten with the sender's own ID.
//! Everything else passes through untouched, in its original order.

use serde_json::{Map, Value};

use crate::errors::{RelayError, Result};

/// Recipient field name.
pub const TO_USER_ID: &str = "toUserId";
/// Sender field name, forced by the server.
pub const FROM_USER_ID: &str = "fromUserId";

/// A parsed inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse a text frame. Anything other than a JSON object is malformed.
    pub fn parse(payload: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(payload)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(RelayError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Set `fromUserId`, replacing whatever the client sent.
    pub fn stamp_sender(&mut self, from_user_id: &str) {
        let _ = self.fields.insert(
            FROM_USER_ID.to_owned(),
            Value::String(from_user_id.to_owned()),
        );
    }

    /// The addressed recipient, or `None` when missing or blank.
    ///
    /// Numbers are accepted and used in their textual form.
    pub fn recipient(&self) -> Option<String> {
        let id = match self.fields.get(TO_USER_ID)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!id.trim().is_empty()).then_some(id)
    }

    /// Serialize back to a text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.fields)?)
    }
}

#[cfg(test)]
impl Envelope {
    fn sender(&self) -> Option<&str> {
        self.fields.get(FROM_USER_ID).and_then(Value::as_str)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
