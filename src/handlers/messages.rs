//! Message ingestion, artifact pull, and diagnostics handlers

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiResponse;
use crate::error::AppError;
use crate::models::{Message, TranslationArtifact};
use crate::services::messages::MessageService;
use crate::services::resolver::normalize_code;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub sender_id: Uuid,
    pub content: String,
    pub original_language: String,
}

/// Ingestion entry point. The message is durably stored first; the fan-out
/// runs in the background so the sender never waits on translation.
///
/// POST /api/v1/conversations/{conversation_id}/messages
pub async fn create_message(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<CreateMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();

    if body.content.trim().is_empty() {
        return Err(AppError::BadRequest("message content cannot be empty".into()));
    }
    if body.original_language.trim().is_empty() {
        return Err(AppError::BadRequest("original language is required".into()));
    }

    let message = MessageService::insert_message(
        &state.db,
        conversation_id,
        body.sender_id,
        &body.content,
        &body.original_language,
    )
    .await?;

    let orchestrator = state.orchestrator.clone();
    let stored = message.clone();
    tokio::spawn(async move {
        orchestrator.translate_message(&stored).await;
    });

    Ok(HttpResponse::Accepted().json(ApiResponse::ok(message)))
}

/// Pull path for reconnect/history: the full artifact set of one message.
///
/// GET /api/v1/messages/{message_id}/artifacts
pub async fn get_artifacts(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message_id = path.into_inner();

    if MessageService::get_message(&state.db, message_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let artifacts = state.artifacts.list_for_message(message_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(artifacts)))
}

#[derive(Debug, Deserialize)]
pub struct RequiredLanguagesQuery {
    pub source: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredLanguagesResponse {
    pub conversation_id: Uuid,
    pub source_language: String,
    pub required_languages: Vec<String>,
}

/// Diagnostics view of the language requirement resolver.
///
/// GET /api/v1/conversations/{conversation_id}/required-languages?source=xx
pub async fn get_required_languages(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<RequiredLanguagesQuery>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    if query.source.trim().is_empty() {
        return Err(AppError::BadRequest("source language is required".into()));
    }

    let required = state
        .resolver
        .required_languages(conversation_id, &query.source)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RequiredLanguagesResponse {
        conversation_id,
        source_language: query.source.to_lowercase(),
        required_languages: required.into_iter().collect(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct RetranslateRequest {
    pub target_language: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub best_effort: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetranslateResponse {
    pub message_id: Uuid,
    pub target_language: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Explicit re-translation of one target language. Without `force` an
/// existing artifact wins; `best_effort` additionally allows near-duplicate
/// cache reuse instead of an inference call.
///
/// POST /api/v1/messages/{message_id}/retranslate
pub async fn retranslate(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<RetranslateRequest>,
) -> Result<HttpResponse, AppError> {
    let message_id = path.into_inner();
    let message = MessageService::get_message(&state.db, message_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let report = state
        .orchestrator
        .retranslate(&message, &body.target_language, body.force, body.best_effort)
        .await?;

    let detail = match &report.outcome {
        crate::services::orchestrator::UnitOutcome::Failed(reason) => Some(reason.clone()),
        _ => None,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::ok(RetranslateResponse {
        message_id,
        target_language: report.target_language,
        outcome: report.outcome.label().to_string(),
        detail,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub participant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub message: Message,
    /// The artifact matching the requesting participant's resolved
    /// preference, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationArtifact>,
}

/// Conversation history with the participant's language variant inlined.
///
/// GET /api/v1/conversations/{conversation_id}/messages
pub async fn get_history(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = path.into_inner();
    let messages =
        MessageService::history(&state.db, conversation_id, query.limit.unwrap_or(50)).await?;

    let preferred = match query.participant_id {
        Some(participant_id) => {
            let roster = state.resolver.roster(conversation_id).await?;
            roster
                .iter()
                .find(|p| p.participant_id == participant_id)
                .map(|p| state.resolver.resolved_preference(p))
        }
        None => None,
    };

    let mut items = Vec::with_capacity(messages.len());
    for message in messages {
        let translation = match &preferred {
            Some(language) if *language != normalize_code(&message.original_language) => {
                state.artifacts.get(message.id, language).await?
            }
            _ => None,
        };
        items.push(HistoryItem { message, translation });
    }

    Ok(HttpResponse::Ok().json(ApiResponse::ok(items)))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route(
                "/conversations/{conversation_id}/messages",
                web::post().to(create_message),
            )
            .route(
                "/conversations/{conversation_id}/messages",
                web::get().to(get_history),
            )
            .route(
                "/conversations/{conversation_id}/required-languages",
                web::get().to(get_required_languages),
            )
            .route("/messages/{message_id}/artifacts", web::get().to(get_artifacts))
            .route("/messages/{message_id}/retranslate", web::post().to(retranslate)),
    );
}
