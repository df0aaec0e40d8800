//! Event names and the outbound event envelope

mod event_kind;
mod outbound;

pub use event_kind::{EventKind, TransportEvent};
pub use outbound::OutboundEvent;
