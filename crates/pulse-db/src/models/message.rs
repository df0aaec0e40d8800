//! Message database models

use sqlx::FromRow;

/// Addressing columns of the messages table
#[derive(Debug, Clone, FromRow)]
pub struct MessageRouteModel {
    pub chat_id: String,
    pub chat_type: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
}
