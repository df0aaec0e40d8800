//! # pulse-core
//!
//! Domain layer of the delivery core: identifiers, rooms, event kinds, call
//! sessions, mailbox entries and the ports the core calls into.
//! This crate has no dependency on infrastructure (store, database, web framework).

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    CallSession, CallStats, CallStatus, CallType, ChatMessage, ChatType, DirectMessage,
    GroupMessage, MailboxEntry, MessageRoute, PresenceRecord, Reaction, ReactionChange, Sender,
    StatusChange, UserStatus,
};
pub use error::DomainError;
pub use events::{EventKind, OutboundEvent, TransportEvent};
pub use traits::{
    ChatRepository, Emitted, IdentityResolver, InMemoryDirectory, MembershipDirectory,
    RecordingTransport, RepoResult, Transport, UserPush,
};
pub use value_objects::{generate_call_id, generate_entry_id, now_millis, Room, UserId};
