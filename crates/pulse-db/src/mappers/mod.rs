//! Model to entity mappers

mod message;

pub use message::{chat_type_column, parse_chat_type};
