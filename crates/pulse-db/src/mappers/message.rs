//! Message mappers

use pulse_core::{ChatType, MessageRoute, UserId};

use crate::models::MessageRouteModel;

/// Value stored in the `chat_type` columns
pub fn chat_type_column(chat_type: ChatType) -> &'static str {
    match chat_type {
        ChatType::Direct => "DM",
        ChatType::Group => "Group",
    }
}

pub fn parse_chat_type(column: &str) -> ChatType {
    match column {
        "Group" => ChatType::Group,
        _ => ChatType::Direct,
    }
}

impl From<MessageRouteModel> for MessageRoute {
    fn from(model: MessageRouteModel) -> Self {
        let sender_id = UserId::from(model.sender_id.as_str());
        match (parse_chat_type(&model.chat_type), model.receiver_id) {
            (ChatType::Direct, Some(receiver_id)) => {
                MessageRoute::direct(model.chat_id, sender_id, UserId::from(receiver_id.as_str()))
            }
            // A direct row without a receiver only reaches its sender
            (ChatType::Direct, None) => {
                MessageRoute::direct(model.chat_id, sender_id.clone(), sender_id)
            }
            (ChatType::Group, _) => MessageRoute::group(model.chat_id, sender_id),
        }
    }
}
