//! Frame format
//!
//! Every text frame, in both directions, is `{"event": <name>, "data": <json>}`.

use super::CloseCode;
use pulse_core::{MailboxEntry, TransportEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Error report for the originating connection
    #[must_use]
    pub fn chat_error(error: impl Into<String>, extra: Option<(&str, Value)>) -> Self {
        let mut data = json!({ "error": error.into() });
        if let (Some((key, value)), Some(object)) = (extra, data.as_object_mut()) {
            object.insert(key.to_string(), value);
        }
        Self::new(TransportEvent::ChatError.as_str(), data)
    }

    /// Decode the data field into a typed payload
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<MailboxEntry> for Envelope {
    /// A replayed entry looks exactly like the live push it replaces
    fn from(entry: MailboxEntry) -> Self {
        let event = entry.kind.as_str();
        Self::new(event, entry.payload)
    }
}

/// Item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(Envelope),
    Ping,
    Close(CloseCode),
}
