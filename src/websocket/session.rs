//! Websocket session actor
//!
//! One actor per connected client. Events queued for the session by the
//! distribution layer arrive over an mpsc channel and are forwarded as text
//! frames; a heartbeat closes sessions that stop answering pings.

use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;
use uuid::Uuid;

use super::{ConnectionRegistry, WsEvent};
use crate::metrics;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WsSession {
    conversation_id: Uuid,
    connection_id: Uuid,
    registry: ConnectionRegistry,
    rx: Option<UnboundedReceiver<WsEvent>>,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(
        conversation_id: Uuid,
        connection_id: Uuid,
        registry: ConnectionRegistry,
        rx: UnboundedReceiver<WsEvent>,
    ) -> Self {
        Self {
            conversation_id,
            connection_id,
            registry,
            rx: Some(rx),
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        metrics::ws_session_opened();
        self.heartbeat(ctx);
        if let Some(rx) = self.rx.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        metrics::ws_session_closed();
        let registry = self.registry.clone();
        let conversation_id = self.conversation_id;
        let connection_id = self.connection_id;
        actix::spawn(async move {
            registry.unsubscribe(conversation_id, connection_id).await;
        });
    }
}

/// Events queued by the distribution layer.
impl StreamHandler<WsEvent> for WsSession {
    fn handle(&mut self, event: WsEvent, ctx: &mut Self::Context) {
        match event.to_json() {
            Ok(payload) => ctx.text(payload),
            Err(e) => warn!(error = %e, "failed to serialize websocket event"),
        }
    }
}

/// Client frames. Sessions are receive-only apart from the heartbeat.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(_) => ctx.stop(),
        }
    }
}
