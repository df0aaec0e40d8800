//! Queueable outbound event

use super::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An application event addressed to one or more users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub kind: EventKind,
    pub payload: Value,
}

impl OutboundEvent {
    #[must_use]
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// Wire name used for both live push and replay
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}
