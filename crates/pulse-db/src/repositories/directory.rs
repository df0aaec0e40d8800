//! PostgreSQL implementation of the identity, membership and chat collaborators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::instrument;

use pulse_core::{
    generate_entry_id, ChatMessage, ChatRepository, ChatType, DomainError, IdentityResolver,
    MembershipDirectory, MessageRoute, Reaction, ReactionChange, RepoResult, UserId,
};

use crate::mappers::chat_type_column;
use crate::models::MessageRouteModel;

use super::error::{chat_not_found, map_db_error, message_not_found};

/// Directory and chat store backed by PostgreSQL
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Create a new PgDirectory
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PgDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDirectory")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl IdentityResolver for PgDirectory {
    #[instrument(skip(self))]
    async fn resolve(&self, raw: &str) -> RepoResult<Option<UserId>> {
        let Some(user_id) = UserId::parse(raw) else {
            return Ok(None);
        };

        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)
            ",
        )
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(exists.then_some(user_id))
    }
}

#[async_trait]
impl MembershipDirectory for PgDirectory {
    #[instrument(skip(self))]
    async fn groups_for_user(&self, user_id: &UserId) -> RepoResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r"
            SELECT c.id
            FROM chats c
            INNER JOIN chat_participants p ON p.chat_id = c.id
            WHERE p.user_id = $1 AND c.chat_type = $2
            ORDER BY c.id
            ",
        )
        .bind(user_id.as_str())
        .bind(chat_type_column(ChatType::Group))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }

    #[instrument(skip(self))]
    async fn chat_participants(&self, chat_id: &str) -> RepoResult<Vec<UserId>> {
        let rows = sqlx::query_scalar::<_, String>(
            r"
            SELECT user_id
            FROM chat_participants
            WHERE chat_id = $1
            ORDER BY joined_at, user_id
            ",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(UserId::from).collect())
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for PgDirectory {
    #[instrument(skip(self, message), fields(chat_id = %message.chat_id()))]
    async fn save_message(&self, message: &ChatMessage) -> RepoResult<Value> {
        let id = generate_entry_id();
        let route = message.route();
        let (chat_type, receiver_id) = match &route {
            MessageRoute::Direct { receiver_id, .. } => {
                (ChatType::Direct, Some(receiver_id.as_str().to_string()))
            }
            MessageRoute::Group { .. } => (ChatType::Group, None),
        };
        let body =
            serde_json::to_value(message).map_err(|e| DomainError::InternalError(e.to_string()))?;

        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            r"
            INSERT INTO messages (id, chat_id, chat_type, sender_id, receiver_id, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at
            ",
        )
        .bind(&id)
        .bind(route.chat_id())
        .bind(chat_type_column(chat_type))
        .bind(message.sender_id().as_str())
        .bind(receiver_id)
        .bind(&body)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        let mut stored = body;
        if let Some(object) = stored.as_object_mut() {
            object.insert("_id".to_string(), Value::String(id));
            object.insert(
                "createdAt".to_string(),
                Value::String(created_at.to_rfc3339()),
            );
        }
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn message_route(&self, message_id: &str) -> RepoResult<Option<MessageRoute>> {
        let result = sqlx::query_as::<_, MessageRouteModel>(
            r"
            SELECT chat_id, chat_type, sender_id, receiver_id
            FROM messages
            WHERE id = $1
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(result.map(MessageRoute::from))
    }

    #[instrument(skip(self, reaction), fields(message_id = %reaction.message_id))]
    async fn toggle_reaction(&self, reaction: &Reaction) -> RepoResult<ReactionChange> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        // Lock the message row so concurrent toggles by one user serialize
        let exists = sqlx::query_scalar::<_, String>(
            r"
            SELECT id FROM messages WHERE id = $1 FOR UPDATE
            ",
        )
        .bind(&reaction.message_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;
        if exists.is_none() {
            return Err(message_not_found(&reaction.message_id));
        }

        let previous = sqlx::query_scalar::<_, String>(
            r"
            SELECT reaction FROM message_reactions
            WHERE message_id = $1 AND user_id = $2
            ",
        )
        .bind(&reaction.message_id)
        .bind(&reaction.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let change = ReactionChange::between(previous.as_deref(), &reaction.reaction);
        match change {
            ReactionChange::Removed => {
                sqlx::query(
                    r"
                    DELETE FROM message_reactions
                    WHERE message_id = $1 AND user_id = $2
                    ",
                )
                .bind(&reaction.message_id)
                .bind(&reaction.user_id)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
            }
            ReactionChange::Added | ReactionChange::Updated => {
                sqlx::query(
                    r"
                    INSERT INTO message_reactions (message_id, user_id, reaction)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (message_id, user_id)
                    DO UPDATE SET reaction = EXCLUDED.reaction, updated_at = NOW()
                    ",
                )
                .bind(&reaction.message_id)
                .bind(&reaction.user_id)
                .bind(&reaction.reaction)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
            }
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(change)
    }

    #[instrument(skip(self, updates))]
    async fn update_conversation(
        &self,
        chat_id: &str,
        user_id: &UserId,
        updates: &Value,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE chat_participants
            SET settings = settings || $3
            WHERE chat_id = $1 AND user_id = $2
            ",
        )
        .bind(chat_id)
        .bind(user_id.as_str())
        .bind(updates)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(chat_not_found(chat_id));
        }
        Ok(())
    }
}
