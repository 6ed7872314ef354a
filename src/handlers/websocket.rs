//! Websocket connection handlers

use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;
use crate::websocket::{session_channel, WsSession};

/// Open a real-time session for one participant in one conversation.
///
/// GET /ws/conversations/{conversation_id}/participants/{participant_id}
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(Uuid, Uuid)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (conversation_id, participant_id) = path.into_inner();

    let (tx, rx) = session_channel();
    let connection_id = state
        .registry
        .subscribe(conversation_id, participant_id, tx)
        .await;

    ws::start(
        WsSession::new(conversation_id, connection_id, state.registry.clone(), rx),
        &req,
        stream,
    )
}

/// Connection status for a participant.
///
/// GET /api/v1/ws/status/{participant_id}
pub async fn ws_status(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let participant_id = path.into_inner();
    let connection_count = state.registry.connection_count(participant_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "participant_id": participant_id.to_string(),
        "connected": connection_count > 0,
        "connection_count": connection_count
    })))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/ws/conversations/{conversation_id}/participants/{participant_id}",
        web::get().to(ws_connect),
    )
    .route("/api/v1/ws/status/{participant_id}", web::get().to(ws_status));
}
