//! EventSub websocket session.
//!
//! The provider pushes JSON frames over a long-lived websocket. A welcome
//! frame establishes (or re-establishes) the session; subscriptions are
//! bound to its id and must be recreated through the fan-out whenever a
//! new welcome arrives.

use crate::eventsub::fanout::SubscriptionFanout;
use anyhow::Context;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Delay before reconnecting after the socket drops.
const RECONNECT_DELAY_SECONDS: u64 = 5;

/// Provider-reported session descriptor, replaced wholesale on welcome.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SessionState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub connected_at: String,
    #[serde(default)]
    pub keepalive_timeout_seconds: u64,
    #[serde(default)]
    pub reconnect_url: Option<String>,
    #[serde(default)]
    pub recovery_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventSubMessage {
    metadata: MessageMetadata,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessageMetadata {
    message_type: String,
}

#[derive(Debug, Deserialize)]
struct WelcomePayload {
    session: SessionState,
}

pub struct EventSession {
    state: Arc<RwLock<SessionState>>,
    fanout: Arc<SubscriptionFanout>,
}

impl EventSession {
    pub fn new(fanout: Arc<SubscriptionFanout>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            fanout,
        }
    }

    /// Snapshot of the current session descriptor.
    pub fn session(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    /// Dispatch one raw frame from the websocket.
    pub async fn handle_message(&self, raw: &str) -> anyhow::Result<()> {
        let message: EventSubMessage =
            serde_json::from_str(raw).context("unparseable eventsub frame")?;

        match message.metadata.message_type.as_str() {
            "session_welcome" => {
                let welcome: WelcomePayload = serde_json::from_value(message.payload)
                    .context("welcome frame carried no session")?;

                info!(
                    session_id = %welcome.session.id,
                    keepalive_timeout_seconds = welcome.session.keepalive_timeout_seconds,
                    "eventsub session established"
                );

                let session_id = welcome.session.id.clone();
                {
                    let mut state = self.state.write().unwrap();
                    *state = welcome.session;
                }

                match self.fanout.resubscribe_all(&session_id).await {
                    Ok(summary) => {
                        info!(
                            attempted = summary.attempted,
                            failed = summary.failed,
                            "subscriber fan-out finished"
                        );
                    }
                    Err(e) => warn!(error = %e, "subscriber fan-out failed"),
                }
            }
            "session_keepalive" => {
                debug!("eventsub keepalive");
            }
            "notification" => {
                let kind = message
                    .payload
                    .get("subscription")
                    .and_then(|s| s.get("type"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("unknown");
                info!(kind = %kind, "event notification received");
            }
            other => {
                debug!(message_type = %other, "ignoring eventsub frame");
            }
        }

        Ok(())
    }
}

/// Keep a websocket connected to the EventSub endpoint, dispatching frames
/// to the session and reconnecting with a fixed delay when it drops.
pub async fn run_event_session(session: Arc<EventSession>, url: String) {
    loop {
        match connect_async(&url).await {
            Ok((ws, _)) => {
                info!(url = %url, "eventsub websocket connected");
                let (mut write, mut read) = ws.split();

                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = session.handle_message(&text).await {
                                warn!(error = %e, "failed to handle eventsub frame");
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) => {
                            info!("eventsub websocket closed by server");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "eventsub websocket read failed");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "eventsub websocket connect failed");
            }
        }

        debug!(
            delay_seconds = RECONNECT_DELAY_SECONDS,
            "reconnecting eventsub websocket"
        );
        tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECONDS)).await;
    }
}
