//! Translation inference capability
//!
//! The neural model is consumed as a black box over HTTP. Upstream payload
//! shapes vary (flat or wrapped in a `data`/`result` envelope), so responses
//! are normalized into one canonical outcome type right at the boundary.
//! A failed call is retried exactly once on the next cheaper model tier,
//! driven by an explicit per-attempt state machine.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::TranslatorConfig;
use crate::models::ModelTier;

/// Canonical result of one inference call.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub text: String,
    pub confidence: Option<f32>,
    pub model_used: String,
}

#[derive(Debug, Error)]
pub enum TranslatorError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("translation endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("malformed translation response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        tier: ModelTier,
    ) -> Result<TranslationOutcome, TranslatorError>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
    model_tier: &'a str,
}

pub struct HttpTranslationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranslationClient {
    pub fn new(config: &TranslatorConfig) -> Result<Self, TranslatorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TranslationBackend for HttpTranslationClient {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
        tier: ModelTier,
    ) -> Result<TranslationOutcome, TranslatorError> {
        let url = format!("{}/v1/translate", self.base_url);
        let request = TranslateRequest {
            text,
            source_language: source,
            target_language: target,
            model_tier: tier.as_str(),
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let start = std::time::Instant::now();
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, source, target_language = target, tier = tier.as_str(), "inference call failed");
            return Err(TranslatorError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let outcome = parse_outcome(&body, tier)?;
        debug!(
            source,
            target_language = target,
            tier = tier.as_str(),
            model = %outcome.model_used,
            elapsed_ms = start.elapsed().as_millis(),
            "inference call succeeded"
        );
        Ok(outcome)
    }
}

/// Normalize upstream response shapes into one canonical outcome. Accepts
/// either a flat object or one wrapped under `data`/`result`; the pipeline
/// never branches on payload shape past this point.
fn parse_outcome(body: &Value, tier: ModelTier) -> Result<TranslationOutcome, TranslatorError> {
    let payload = body
        .get("data")
        .or_else(|| body.get("result"))
        .unwrap_or(body);

    let text = payload
        .get("translatedText")
        .or_else(|| payload.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            TranslatorError::InvalidResponse("missing translated text field".to_string())
        })?;

    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c as f32)
        .filter(|c| (0.0..=1.0).contains(c));

    let model_used = payload
        .get("modelUsed")
        .or_else(|| payload.get("model"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("mt-{}", tier.as_str()));

    Ok(TranslationOutcome {
        text: text.to_string(),
        confidence,
        model_used,
    })
}

// ============================================================================
// Per-attempt state machine
// ============================================================================

/// States of one translation attempt:
/// pending → primary-model → fallback-model → {done | failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Primary(ModelTier),
    Fallback(ModelTier),
    Done(ModelTier),
    Failed,
}

pub struct TranslationAttempt {
    text: String,
    source: String,
    target: String,
    preferred: ModelTier,
    state: AttemptState,
}

impl TranslationAttempt {
    pub fn new(text: &str, source: &str, target: &str, preferred: ModelTier) -> Self {
        Self {
            text: text.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            preferred,
            state: AttemptState::Pending,
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Drive the attempt to a terminal state. At most two inference calls
    /// are made: the preferred tier, then its fallback.
    pub async fn run(
        mut self,
        backend: &dyn TranslationBackend,
    ) -> Result<(TranslationOutcome, ModelTier), TranslatorError> {
        let mut last_error: Option<TranslatorError> = None;

        loop {
            self.state = match self.state {
                AttemptState::Pending => AttemptState::Primary(self.preferred),

                AttemptState::Primary(tier) => {
                    match backend
                        .translate(&self.text, &self.source, &self.target, tier)
                        .await
                    {
                        Ok(outcome) => {
                            self.state = AttemptState::Done(tier);
                            return Ok((outcome, tier));
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                tier = tier.as_str(),
                                target_language = %self.target,
                                "primary model failed; trying fallback tier"
                            );
                            last_error = Some(e);
                            match tier.fallback() {
                                Some(lower) => AttemptState::Fallback(lower),
                                None => AttemptState::Failed,
                            }
                        }
                    }
                }

                AttemptState::Fallback(tier) => {
                    match backend
                        .translate(&self.text, &self.source, &self.target, tier)
                        .await
                    {
                        Ok(outcome) => {
                            self.state = AttemptState::Done(tier);
                            return Ok((outcome, tier));
                        }
                        Err(e) => {
                            last_error = Some(e);
                            AttemptState::Failed
                        }
                    }
                }

                AttemptState::Failed | AttemptState::Done(_) => {
                    return Err(last_error.take().unwrap_or_else(|| {
                        TranslatorError::InvalidResponse("attempt already terminal".to_string())
                    }));
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Backend scripted to fail for a fixed set of tiers.
    struct ScriptedBackend {
        failing_tiers: Vec<ModelTier>,
        calls: Mutex<Vec<ModelTier>>,
    }

    impl ScriptedBackend {
        fn failing(tiers: &[ModelTier]) -> Self {
            Self {
                failing_tiers: tiers.to_vec(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ModelTier> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranslationBackend for ScriptedBackend {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
            tier: ModelTier,
        ) -> Result<TranslationOutcome, TranslatorError> {
            self.calls.lock().unwrap().push(tier);
            if self.failing_tiers.contains(&tier) {
                return Err(TranslatorError::Endpoint {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            Ok(TranslationOutcome {
                text: format!("{}-{}", text, tier.as_str()),
                confidence: Some(0.9),
                model_used: format!("mt-{}", tier.as_str()),
            })
        }
    }

    #[tokio::test]
    async fn test_primary_success_makes_one_call() {
        let backend = ScriptedBackend::failing(&[]);
        let attempt = TranslationAttempt::new("hola", "es", "en", ModelTier::Premium);

        let (outcome, tier) = attempt.run(&backend).await.unwrap();
        assert_eq!(tier, ModelTier::Premium);
        assert_eq!(outcome.text, "hola-premium");
        assert_eq!(backend.calls(), vec![ModelTier::Premium]);
    }

    #[tokio::test]
    async fn test_fallback_after_primary_failure() {
        let backend = ScriptedBackend::failing(&[ModelTier::Premium]);
        let attempt = TranslationAttempt::new("hola", "es", "en", ModelTier::Premium);

        let (outcome, tier) = attempt.run(&backend).await.unwrap();
        assert_eq!(tier, ModelTier::Medium);
        assert_eq!(outcome.model_used, "mt-medium");
        assert_eq!(backend.calls(), vec![ModelTier::Premium, ModelTier::Medium]);
    }

    #[tokio::test]
    async fn test_both_tiers_failing_is_terminal() {
        let backend = ScriptedBackend::failing(&[ModelTier::Medium, ModelTier::Basic]);
        let attempt = TranslationAttempt::new("hola", "es", "en", ModelTier::Medium);

        let err = attempt.run(&backend).await.unwrap_err();
        assert!(matches!(err, TranslatorError::Endpoint { status: 503, .. }));
        // exactly one fallback retry, never more
        assert_eq!(backend.calls(), vec![ModelTier::Medium, ModelTier::Basic]);
    }

    #[tokio::test]
    async fn test_basic_tier_has_no_fallback() {
        let backend = ScriptedBackend::failing(&[ModelTier::Basic]);
        let attempt = TranslationAttempt::new("hola", "es", "en", ModelTier::Basic);

        let err = attempt.run(&backend).await.unwrap_err();
        assert!(matches!(err, TranslatorError::Endpoint { .. }));
        assert_eq!(backend.calls(), vec![ModelTier::Basic]);
    }

    #[test]
    fn test_parse_outcome_flat_shape() {
        let body = serde_json::json!({
            "translatedText": "hello",
            "confidence": 0.87,
            "model": "mt-medium-2"
        });
        let outcome = parse_outcome(&body, ModelTier::Medium).unwrap();
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.model_used, "mt-medium-2");
        assert!((outcome.confidence.unwrap() - 0.87).abs() < 1e-6);
    }

    #[test]
    fn test_parse_outcome_wrapped_shape() {
        let body = serde_json::json!({
            "data": { "text": "hello", "modelUsed": "mt-basic-1" }
        });
        let outcome = parse_outcome(&body, ModelTier::Basic).unwrap();
        assert_eq!(outcome.text, "hello");
        assert_eq!(outcome.model_used, "mt-basic-1");
        assert!(outcome.confidence.is_none());
    }

    #[test]
    fn test_parse_outcome_rejects_missing_text() {
        let body = serde_json::json!({ "confidence": 0.5 });
        let err = parse_outcome(&body, ModelTier::Basic).unwrap_err();
        assert!(matches!(err, TranslatorError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_outcome_discards_out_of_range_confidence() {
        let body = serde_json::json!({ "translatedText": "hi", "confidence": 3.2 });
        let outcome = parse_outcome(&body, ModelTier::Basic).unwrap();
        assert!(outcome.confidence.is_none());
    }
}
