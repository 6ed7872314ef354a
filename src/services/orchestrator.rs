//! Translation fan-out orchestration
//!
//! One message fans out into independent per-(message, target-language)
//! units. Within a unit the pipeline is strictly cache-check → translate →
//! persist → distribute; across units there is no ordering and none is
//! needed. Units run concurrently, bounded by a semaphore, and a failure in
//! one never delays or fails its siblings. Persisted artifacts are handed to
//! the distribution layer as they land, not after the whole fan-out.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::TranslationCache;
use crate::error::AppError;
use crate::metrics;
use crate::models::{Message, ModelTier, ParticipantLanguageProfile};
use crate::services::artifacts::{ArtifactStore, InsertResult, NewArtifact};
use crate::services::distributor::Distributor;
use crate::services::resolver::{normalize_code, LanguageResolver};
use crate::services::translator::{TranslationAttempt, TranslationBackend};

/// Terminal state of one per-language unit:
/// pending → {cache-hit | translating} → {persisted | failed}
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Exact cache hit persisted without an inference call.
    CacheHit,
    /// Near-duplicate reuse, only on explicit best-effort requests.
    SimilarityReuse,
    /// Fresh inference result persisted.
    Translated,
    /// Lost the insert race; the existing artifact is authoritative.
    Deduplicated,
    Failed(String),
}

impl UnitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::CacheHit => "cache_hit",
            UnitOutcome::SimilarityReuse => "similarity_reuse",
            UnitOutcome::Translated => "translated",
            UnitOutcome::Deduplicated => "deduplicated",
            UnitOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_persisted(&self) -> bool {
        !matches!(self, UnitOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct UnitReport {
    pub target_language: String,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Default)]
pub struct FanoutSummary {
    pub units: Vec<UnitReport>,
}

impl FanoutSummary {
    pub fn persisted_count(&self) -> usize {
        self.units.iter().filter(|u| u.outcome.is_persisted()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.units.len() - self.persisted_count()
    }

    pub fn outcome_for(&self, target_language: &str) -> Option<&UnitOutcome> {
        self.units
            .iter()
            .find(|u| u.target_language == target_language)
            .map(|u| &u.outcome)
    }
}

#[derive(Clone)]
pub struct TranslationOrchestrator {
    resolver: Arc<LanguageResolver>,
    cache: TranslationCache,
    backend: Arc<dyn TranslationBackend>,
    store: Arc<dyn ArtifactStore>,
    distributor: Arc<Distributor>,
    limiter: Arc<Semaphore>,
    preferred_tier: ModelTier,
    similarity_threshold: f32,
}

impl TranslationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: Arc<LanguageResolver>,
        cache: TranslationCache,
        backend: Arc<dyn TranslationBackend>,
        store: Arc<dyn ArtifactStore>,
        distributor: Arc<Distributor>,
        max_concurrent: usize,
        preferred_tier: ModelTier,
        similarity_threshold: f32,
    ) -> Self {
        Self {
            resolver,
            cache,
            backend,
            store,
            distributor,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            preferred_tier,
            similarity_threshold,
        }
    }

    /// Fan a stored message out into per-language units. The original is
    /// distributed before any translation work begins; each unit distributes
    /// its own artifact the moment it persists.
    pub async fn translate_message(&self, message: &Message) -> FanoutSummary {
        self.distributor.on_message_created(message).await;

        // Roster snapshot at dispatch time; later membership changes do not
        // affect this fan-out.
        let roster = match self.resolver.roster(message.conversation_id).await {
            Ok(roster) => roster,
            Err(e) => {
                warn!(
                    error = %e,
                    conversation_id = %message.conversation_id,
                    "participant roster unavailable; message delivered without translations"
                );
                return FanoutSummary::default();
            }
        };

        let targets = self
            .resolver
            .required_from_roster(&roster, &message.original_language);
        if targets.is_empty() {
            debug!(
                message_id = %message.id,
                "no target languages required; message fully distributed"
            );
            return FanoutSummary::default();
        }

        let roster = Arc::new(roster);
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let orchestrator = self.clone();
            let message = message.clone();
            let roster = roster.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .translate_unit(&message, &target, &roster, false)
                    .await
            }));
        }

        let mut summary = FanoutSummary::default();
        for handle in handles {
            match handle.await {
                Ok(report) => summary.units.push(report),
                Err(e) => warn!(error = %e, "translation unit task aborted"),
            }
        }

        info!(
            message_id = %message.id,
            persisted = summary.persisted_count(),
            failed = summary.failed_count(),
            "translation fan-out finished"
        );
        summary
    }

    /// Explicit re-translation of a single target language. Without `force`
    /// an existing artifact is a conflict no-op; with `force` the old
    /// artifact is removed first so the new attempt can insert.
    pub async fn retranslate(
        &self,
        message: &Message,
        target_language: &str,
        force: bool,
        best_effort: bool,
    ) -> Result<UnitReport, AppError> {
        let target = normalize_code(target_language);
        if target.is_empty() {
            return Err(AppError::BadRequest("target language is required".into()));
        }
        if target == normalize_code(&message.original_language) {
            return Err(AppError::BadRequest(
                "target language equals the message's source language".into(),
            ));
        }

        if force {
            self.store.delete(message.id, &target).await?;
        } else if self.store.get(message.id, &target).await?.is_some() {
            return Ok(UnitReport {
                target_language: target,
                outcome: UnitOutcome::Deduplicated,
            });
        }

        let roster = self.resolver.roster(message.conversation_id).await?;
        Ok(self
            .translate_unit(message, &target, &roster, best_effort)
            .await)
    }

    /// One (message, target-language) unit, strictly sequential inside.
    async fn translate_unit(
        &self,
        message: &Message,
        target: &str,
        roster: &[ParticipantLanguageProfile],
        best_effort: bool,
    ) -> UnitReport {
        let _permit = match self.limiter.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return self.fail_unit(message, target, roster, "scheduler shut down").await;
            }
        };

        let source = normalize_code(&message.original_language);

        // 1. exact cache hit bypasses inference entirely
        if let Some(hit) = self
            .cache
            .lookup(&message.content, &source, target, self.preferred_tier)
            .await
        {
            return self
                .persist_and_distribute(
                    message,
                    &source,
                    target,
                    hit.tier,
                    &hit.entry.translated_text,
                    hit.entry.confidence,
                    hit.key,
                    roster,
                    UnitOutcome::CacheHit,
                )
                .await;
        }

        // 2. near-duplicate reuse only when the caller explicitly opted in
        if best_effort {
            let similar = self
                .cache
                .find_similar(
                    &message.content,
                    &source,
                    target,
                    self.preferred_tier,
                    self.similarity_threshold,
                )
                .await;
            if let Some(best) = similar.first() {
                info!(
                    similarity = best.similarity,
                    target_language = target,
                    "reusing near-duplicate cache entry (best-effort request)"
                );
                let key = self
                    .cache
                    .store(
                        &message.content,
                        &source,
                        target,
                        self.preferred_tier,
                        &best.entry.translated_text,
                        best.entry.confidence,
                        &best.entry.model_used,
                    )
                    .await;
                let translated = best.entry.translated_text.clone();
                let confidence = best.entry.confidence;
                return self
                    .persist_and_distribute(
                        message,
                        &source,
                        target,
                        self.preferred_tier,
                        &translated,
                        confidence,
                        key,
                        roster,
                        UnitOutcome::SimilarityReuse,
                    )
                    .await;
            }
        }

        // 3. inference with one fallback retry on the cheaper tier
        let attempt =
            TranslationAttempt::new(&message.content, &source, target, self.preferred_tier);
        match attempt.run(self.backend.as_ref()).await {
            Ok((outcome, tier_used)) => {
                let key = self
                    .cache
                    .store(
                        &message.content,
                        &source,
                        target,
                        tier_used,
                        &outcome.text,
                        outcome.confidence,
                        &outcome.model_used,
                    )
                    .await;
                self.persist_and_distribute(
                    message,
                    &source,
                    target,
                    tier_used,
                    &outcome.text,
                    outcome.confidence,
                    key,
                    roster,
                    UnitOutcome::Translated,
                )
                .await
            }
            Err(e) => self.fail_unit(message, target, roster, &e.to_string()).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_and_distribute(
        &self,
        message: &Message,
        source: &str,
        target: &str,
        tier: ModelTier,
        translated_content: &str,
        confidence: Option<f32>,
        cache_key: String,
        roster: &[ParticipantLanguageProfile],
        outcome: UnitOutcome,
    ) -> UnitReport {
        let new = NewArtifact {
            message_id: message.id,
            source_language: source.to_string(),
            target_language: target.to_string(),
            translated_content: translated_content.to_string(),
            model_tier: tier,
            confidence_score: confidence,
            cache_key,
        };

        match self.store.insert_if_absent(new).await {
            Ok(InsertResult::Inserted(artifact)) => {
                metrics::record_artifact_insert("inserted");
                metrics::record_unit_outcome(outcome.label());
                self.distributor
                    .on_artifact_ready(message, &artifact, roster)
                    .await;
                UnitReport {
                    target_language: target.to_string(),
                    outcome,
                }
            }
            Ok(InsertResult::AlreadyExists(_)) => {
                // Expected under concurrent triggers, not an error: the
                // winner already distributed this artifact.
                metrics::record_artifact_insert("duplicate");
                metrics::record_unit_outcome("deduplicated");
                UnitReport {
                    target_language: target.to_string(),
                    outcome: UnitOutcome::Deduplicated,
                }
            }
            Err(e) => {
                warn!(error = %e, target_language = target, message_id = %message.id, "artifact persistence failed");
                self.fail_unit(message, target, roster, &e.to_string()).await
            }
        }
    }

    async fn fail_unit(
        &self,
        message: &Message,
        target: &str,
        roster: &[ParticipantLanguageProfile],
        reason: &str,
    ) -> UnitReport {
        metrics::record_unit_outcome("failed");
        self.distributor
            .on_translation_failed(message, target, roster, reason)
            .await;
        UnitReport {
            target_language: target.to_string(),
            outcome: UnitOutcome::Failed(reason.to_string()),
        }
    }
}
