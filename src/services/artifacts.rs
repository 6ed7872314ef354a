//! Idempotent artifact persistence
//!
//! The uniqueness constraint on (message_id, target_language) is the sole
//! correctness mechanism against concurrent duplicate triggers: writers
//! insert with ON CONFLICT DO NOTHING and treat a conflict as success, so
//! racing instances safely produce exactly one persisted row. No in-memory
//! locking is involved; multiple service instances share the same store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ModelTier, TranslationArtifact};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Artifact fields supplied by the orchestrator; the store stamps
/// `created_at` on insert.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub message_id: Uuid,
    pub source_language: String,
    pub target_language: String,
    pub translated_content: String,
    pub model_tier: ModelTier,
    pub confidence_score: Option<f32>,
    pub cache_key: String,
}

/// Result of a conditional insert. On conflict the existing row is
/// authoritative and returned unchanged.
#[derive(Debug, Clone)]
pub enum InsertResult {
    Inserted(TranslationArtifact),
    AlreadyExists(TranslationArtifact),
}

impl InsertResult {
    pub fn artifact(&self) -> &TranslationArtifact {
        match self {
            InsertResult::Inserted(a) | InsertResult::AlreadyExists(a) => a,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted(_))
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Conditional insert keyed on (message_id, target_language).
    async fn insert_if_absent(&self, new: NewArtifact) -> Result<InsertResult, StoreError>;

    async fn list_for_message(
        &self,
        message_id: Uuid,
    ) -> Result<Vec<TranslationArtifact>, StoreError>;

    async fn get(
        &self,
        message_id: Uuid,
        target_language: &str,
    ) -> Result<Option<TranslationArtifact>, StoreError>;

    /// Force-replace path: removes the row so a new attempt can insert.
    async fn delete(&self, message_id: Uuid, target_language: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// Postgres store
// ============================================================================

pub struct PgArtifactStore {
    db: Pool<Postgres>,
}

impl PgArtifactStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    fn map_row(row: &sqlx::postgres::PgRow) -> TranslationArtifact {
        let model_tier: String = row.get("model_tier");
        TranslationArtifact {
            message_id: row.get("message_id"),
            source_language: row.get("source_language"),
            target_language: row.get("target_language"),
            translated_content: row.get("translated_content"),
            model_tier: ModelTier::parse(&model_tier),
            confidence_score: row.get("confidence_score"),
            cache_key: row.get("cache_key"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn insert_if_absent(&self, new: NewArtifact) -> Result<InsertResult, StoreError> {
        let inserted = sqlx::query(
            r#"INSERT INTO translation_artifacts
                   (message_id, source_language, target_language, translated_content,
                    model_tier, confidence_score, cache_key)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (message_id, target_language) DO NOTHING
               RETURNING created_at"#,
        )
        .bind(new.message_id)
        .bind(&new.source_language)
        .bind(&new.target_language)
        .bind(&new.translated_content)
        .bind(new.model_tier.as_str())
        .bind(new.confidence_score)
        .bind(&new.cache_key)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertResult::Inserted(TranslationArtifact {
                message_id: new.message_id,
                source_language: new.source_language,
                target_language: new.target_language,
                translated_content: new.translated_content,
                model_tier: new.model_tier,
                confidence_score: new.confidence_score,
                cache_key: new.cache_key,
                created_at: row.get("created_at"),
            }));
        }

        // Lost the race: the winner's row is authoritative.
        let existing = sqlx::query(
            r#"SELECT message_id, source_language, target_language, translated_content,
                      model_tier, confidence_score, cache_key, created_at
               FROM translation_artifacts
               WHERE message_id = $1 AND target_language = $2"#,
        )
        .bind(new.message_id)
        .bind(&new.target_language)
        .fetch_one(&self.db)
        .await?;

        Ok(InsertResult::AlreadyExists(Self::map_row(&existing)))
    }

    async fn list_for_message(
        &self,
        message_id: Uuid,
    ) -> Result<Vec<TranslationArtifact>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT message_id, source_language, target_language, translated_content,
                      model_tier, confidence_score, cache_key, created_at
               FROM translation_artifacts
               WHERE message_id = $1
               ORDER BY target_language ASC"#,
        )
        .bind(message_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(Self::map_row).collect())
    }

    async fn get(
        &self,
        message_id: Uuid,
        target_language: &str,
    ) -> Result<Option<TranslationArtifact>, StoreError> {
        let row = sqlx::query(
            r#"SELECT message_id, source_language, target_language, translated_content,
                      model_tier, confidence_score, cache_key, created_at
               FROM translation_artifacts
               WHERE message_id = $1 AND target_language = $2"#,
        )
        .bind(message_id)
        .bind(target_language)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.as_ref().map(Self::map_row))
    }

    async fn delete(&self, message_id: Uuid, target_language: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM translation_artifacts WHERE message_id = $1 AND target_language = $2",
        )
        .bind(message_id)
        .bind(target_language)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Map-backed store with the same conditional-insert semantics, for tests
/// and fixtures. The mutex makes the insert check-and-set atomic.
#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: Mutex<HashMap<(Uuid, String), TranslationArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn insert_if_absent(&self, new: NewArtifact) -> Result<InsertResult, StoreError> {
        let mut guard = self.inner.lock().await;
        let key = (new.message_id, new.target_language.clone());

        if let Some(existing) = guard.get(&key) {
            return Ok(InsertResult::AlreadyExists(existing.clone()));
        }

        let artifact = TranslationArtifact {
            message_id: new.message_id,
            source_language: new.source_language,
            target_language: new.target_language,
            translated_content: new.translated_content,
            model_tier: new.model_tier,
            confidence_score: new.confidence_score,
            cache_key: new.cache_key,
            created_at: Utc::now(),
        };
        guard.insert(key, artifact.clone());
        Ok(InsertResult::Inserted(artifact))
    }

    async fn list_for_message(
        &self,
        message_id: Uuid,
    ) -> Result<Vec<TranslationArtifact>, StoreError> {
        let guard = self.inner.lock().await;
        let mut artifacts: Vec<TranslationArtifact> = guard
            .values()
            .filter(|a| a.message_id == message_id)
            .cloned()
            .collect();
        artifacts.sort_by(|a, b| a.target_language.cmp(&b.target_language));
        Ok(artifacts)
    }

    async fn get(
        &self,
        message_id: Uuid,
        target_language: &str,
    ) -> Result<Option<TranslationArtifact>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard
            .get(&(message_id, target_language.to_string()))
            .cloned())
    }

    async fn delete(&self, message_id: Uuid, target_language: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        Ok(guard
            .remove(&(message_id, target_language.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_artifact(message_id: Uuid, target: &str, content: &str) -> NewArtifact {
        NewArtifact {
            message_id,
            source_language: "fr".into(),
            target_language: target.into(),
            translated_content: content.into(),
            model_tier: ModelTier::Medium,
            confidence_score: Some(0.9),
            cache_key: "key".into(),
        }
    }

    #[tokio::test]
    async fn test_conditional_insert_keeps_first_writer() {
        let store = MemoryArtifactStore::new();
        let message_id = Uuid::new_v4();

        let first = store
            .insert_if_absent(new_artifact(message_id, "en", "hello"))
            .await
            .unwrap();
        assert!(first.was_inserted());

        let second = store
            .insert_if_absent(new_artifact(message_id, "en", "other text"))
            .await
            .unwrap();
        assert!(!second.was_inserted());
        // the existing row is authoritative
        assert_eq!(second.artifact().translated_content, "hello");

        let all = store.list_for_message(message_id).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_same_message_different_languages_coexist() {
        let store = MemoryArtifactStore::new();
        let message_id = Uuid::new_v4();

        store
            .insert_if_absent(new_artifact(message_id, "en", "hello"))
            .await
            .unwrap();
        store
            .insert_if_absent(new_artifact(message_id, "de", "hallo"))
            .await
            .unwrap();

        let all = store.list_for_message(message_id).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_reopens_the_slot() {
        let store = MemoryArtifactStore::new();
        let message_id = Uuid::new_v4();

        store
            .insert_if_absent(new_artifact(message_id, "en", "v1"))
            .await
            .unwrap();
        assert!(store.delete(message_id, "en").await.unwrap());
        assert!(!store.delete(message_id, "en").await.unwrap());

        let replaced = store
            .insert_if_absent(new_artifact(message_id, "en", "v2"))
            .await
            .unwrap();
        assert!(replaced.was_inserted());
        assert_eq!(
            store
                .get(message_id, "en")
                .await
                .unwrap()
                .unwrap()
                .translated_content,
            "v2"
        );
    }
}
