//! Ports the delivery core calls into
//!
//! The domain layer defines what it needs; infrastructure crates provide the
//! implementation.

mod collaborators;
mod memory;
mod transport;

pub use collaborators::{ChatRepository, IdentityResolver, MembershipDirectory, RepoResult};
pub use memory::{Emitted, InMemoryDirectory, RecordingTransport};
pub use transport::{Transport, UserPush};
