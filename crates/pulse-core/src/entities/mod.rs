//! Domain entities

mod call;
mod chat;
mod mailbox;
mod presence;

pub use call::{CallSession, CallStats, CallStatus, CallType, ChatType};
pub use chat::{
    ChatMessage, DirectMessage, GroupMessage, MessageRoute, Reaction, ReactionChange, Sender,
};
pub use mailbox::MailboxEntry;
pub use presence::{PresenceRecord, StatusChange, UserStatus};
