//! Redis pub/sub bridge for cross-instance fan-out
//!
//! Each instance publishes distribution envelopes on per-conversation
//! channels and replays envelopes published by other instances into its
//! local registry. The origin id suppresses double delivery on the
//! publishing instance.

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConnectionRegistry, WsEvent};

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: Uuid,
    pub conversation_id: Uuid,
    /// None broadcasts to the whole conversation; otherwise only the listed
    /// participants receive the event.
    pub recipients: Option<Vec<Uuid>>,
    pub event: WsEvent,
}

fn channel_for_conversation(id: Uuid) -> String {
    format!("conversation:{}", id)
}

pub async fn publish(client: &redis::Client, envelope: &Envelope) -> redis::RedisResult<()> {
    let payload = serde_json::to_string(envelope).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "envelope serialization failed",
            e.to_string(),
        ))
    })?;

    let mut conn = client.get_multiplexed_async_connection().await?;
    let channel = channel_for_conversation(envelope.conversation_id);
    conn.publish::<_, _, ()>(channel, payload).await
}

pub async fn start_psub_listener(
    client: redis::Client,
    registry: ConnectionRegistry,
    instance_id: Uuid,
) -> redis::RedisResult<()> {
    // PubSub requires a dedicated connection, not multiplexed
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.psubscribe("conversation:*").await?;
    let mut stream = pubsub.on_message();

    use futures_util::StreamExt;
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload()?;
        let envelope: Envelope = match serde_json::from_str(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable fan-out envelope");
                continue;
            }
        };

        if envelope.origin == instance_id {
            continue;
        }

        deliver(&registry, &envelope).await;
    }
    Ok(())
}

pub async fn deliver(registry: &ConnectionRegistry, envelope: &Envelope) {
    match &envelope.recipients {
        None => {
            registry
                .broadcast(envelope.conversation_id, &envelope.event)
                .await
        }
        Some(recipients) => {
            registry
                .send_to_participants(envelope.conversation_id, recipients, &envelope.event)
                .await
        }
    }
}
