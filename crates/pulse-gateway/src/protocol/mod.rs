//! Gateway protocol definitions
//!
//! Frame format, close codes, client event names and payloads.

mod close_codes;
mod envelope;
mod inbound;
mod payloads;

pub use close_codes::CloseCode;
pub use envelope::{Envelope, Frame};
pub use inbound::InboundEvent;
pub use payloads::{
    AddChatPayload, AnswerCallPayload, CallRef, ChatRef, FollowPayload, LegacySignalPayload,
    TypingPayload, UpdateConversationPayload, UserRef,
};
