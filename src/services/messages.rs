//! Message persistence
//!
//! The fan-out entry point is invoked once a message is durably stored;
//! this service owns that store and serves the history pull path.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::Message;

pub struct MessageService;

impl MessageService {
    pub async fn insert_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        original_language: &str,
    ) -> Result<Message, AppError> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, sender_id, content, original_language)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING created_at"#,
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(original_language)
        .fetch_one(db)
        .await?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            content: content.to_string(),
            original_language: original_language.to_string(),
            created_at: row.get("created_at"),
            is_edited: false,
            is_deleted: false,
        })
    }

    pub async fn get_message(
        db: &Pool<Postgres>,
        message_id: Uuid,
    ) -> Result<Option<Message>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, conversation_id, sender_id, content, original_language,
                      created_at, is_edited, is_deleted
               FROM messages
               WHERE id = $1"#,
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?;

        Ok(row.as_ref().map(Self::map_row))
    }

    pub async fn history(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Message>, AppError> {
        let limit = limit.clamp(1, 200);
        let rows = sqlx::query(
            r#"SELECT id, conversation_id, sender_id, content, original_language,
                      created_at, is_edited, is_deleted
               FROM messages
               WHERE conversation_id = $1 AND NOT is_deleted
               ORDER BY created_at ASC
               LIMIT $2"#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(db)
        .await?;

        Ok(rows.iter().map(Self::map_row).collect())
    }

    fn map_row(row: &sqlx::postgres::PgRow) -> Message {
        let created_at: DateTime<Utc> = row.get("created_at");
        Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            original_language: row.get("original_language"),
            created_at,
            is_edited: row.get("is_edited"),
            is_deleted: row.get("is_deleted"),
        }
    }
}
