//! Live observation monitor.
//!
//! Path: `GET {prefix}/ws/monitor`
//!
//! Clients send `subscribe` (optionally scoped to one device; no `deviceId`
//! or `"*"` means every device), `unsubscribe` or `ping`. On subscribe the
//! server answers with one `snapshot` per device from the latest-state cache,
//! a `subscribed` ack, then one `update` per observation. The hub
//! subscription lives as long as the socket.

use std::sync::Arc;

use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_ws::{Message as WsMessage, Session};
use futures::StreamExt;
use regway_models::{
    domain::prelude::{LatestView, Observation},
    Subscription,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::AppState;

/// Incoming WebSocket messages from client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum MonitorClientMessage {
    /// Replace the current subscription; no `deviceId` or `"*"` means every device.
    Subscribe {
        #[serde(default, alias = "requestId")]
        request_id: Option<String>,
        #[serde(default, alias = "deviceId")]
        device_id: Option<String>,
    },
    /// Drop the subscription but keep the socket open.
    Unsubscribe {
        #[serde(default, alias = "requestId")]
        request_id: Option<String>,
    },
    Ping {
        #[serde(default)]
        ts: i64,
    },
}

/// Outgoing WebSocket messages to client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum MonitorServerMessage<'a> {
    Subscribed {
        #[serde(skip_serializing_if = "Option::is_none", rename = "requestId")]
        request_id: Option<String>,
        /// `None` while unsubscribed or subscribed to all devices
        #[serde(skip_serializing_if = "Option::is_none", rename = "deviceId")]
        device_id: Option<String>,
        active: bool,
    },
    Snapshot {
        #[serde(flatten)]
        latest: &'a LatestView,
    },
    Update {
        #[serde(flatten)]
        observation: &'a Observation,
    },
    Error {
        code: &'a str,
        message: String,
    },
    Pong {
        ts: i64,
    },
}

/// The forwarding task of the connection's current subscription, if any.
#[derive(Default)]
struct ConnectionSubscription {
    cancel: Option<CancellationToken>,
}

impl ConnectionSubscription {
    fn clear(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Forward observations from `sub` to the session until cancelled, the
    /// socket fails, or the hub drops the subscriber.
    fn replace_with(&mut self, mut sub: Subscription, mut session: Session) {
        self.clear();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(subscription = sub.id(), "Monitor subscription cancelled");
                        break;
                    }
                    next = sub.recv() => match next {
                        Some(observation) => {
                            let msg = MonitorServerMessage::Update { observation: &observation };
                            if !send(&mut session, &msg).await {
                                break;
                            }
                        }
                        None => {
                            warn!(subscription = sub.id(), "Monitor subscriber fell behind and was dropped");
                            let msg = MonitorServerMessage::Error {
                                code: "Lagged",
                                message: "Too many pending updates; subscribe again".into(),
                            };
                            send(&mut session, &msg).await;
                            break;
                        }
                    }
                }
            }
        });
        self.cancel = Some(cancel);
    }
}

/// Serialize and send one message; `false` once the socket is gone.
async fn send(session: &mut Session, msg: &MonitorServerMessage<'_>) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to serialize monitor message: {}", e);
            return true;
        }
    };
    match session.text(text).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Monitor WS send error: {}", e);
            false
        }
    }
}

/// Handle WebSocket upgrades for `/ws/monitor`.
#[instrument(skip_all)]
pub async fn monitor_ws(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, ActixError> {
    let (res, session, msg_stream) = actix_ws::handle(&req, body)?;
    let state: Arc<AppState> = Arc::clone(state.get_ref());

    actix_rt::spawn(async move {
        monitor_ws_loop(state, session, msg_stream).await;
    });

    Ok(res)
}

async fn monitor_ws_loop(
    state: Arc<AppState>,
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
) {
    let mut current = ConnectionSubscription::default();

    while let Some(item) = msg_stream.next().await {
        let msg = match item {
            Ok(m) => m,
            Err(e) => {
                error!("Monitor WS stream error: {}", e);
                break;
            }
        };
        let alive = match msg {
            WsMessage::Text(text) => match serde_json::from_str::<MonitorClientMessage>(&text) {
                Ok(MonitorClientMessage::Subscribe {
                    request_id,
                    device_id,
                }) => subscribe(&state, &mut current, &mut session, request_id, device_id).await,
                Ok(MonitorClientMessage::Unsubscribe { request_id }) => {
                    current.clear();
                    let ack = MonitorServerMessage::Subscribed {
                        request_id,
                        device_id: None,
                        active: false,
                    };
                    send(&mut session, &ack).await
                }
                Ok(MonitorClientMessage::Ping { ts }) => {
                    send(&mut session, &MonitorServerMessage::Pong { ts }).await
                }
                Err(e) => {
                    warn!("Invalid monitor WS message: {}", e);
                    let err = MonitorServerMessage::Error {
                        code: "BadRequest",
                        message: format!("Invalid monitor websocket message: {e}"),
                    };
                    send(&mut session, &err).await
                }
            },
            WsMessage::Close(reason) => {
                info!("Monitor WS closed by client: {:?}", reason);
                false
            }
            WsMessage::Ping(bytes) => session.pong(&bytes).await.is_ok(),
            WsMessage::Binary(_) => {
                let err = MonitorServerMessage::Error {
                    code: "UnsupportedMediaType",
                    message: "Binary frames are not supported on the monitor socket".into(),
                };
                send(&mut session, &err).await
            }
            WsMessage::Continuation(_) => {
                warn!("Unexpected continuation frame on monitor WS, closing");
                false
            }
            WsMessage::Pong(_) | WsMessage::Nop => true,
        };
        if !alive {
            break;
        }
    }

    // Cancelling the forwarder drops its `Subscription`, which unregisters it.
    current.clear();
    session.close(None).await.ok();
}

async fn subscribe(
    state: &AppState,
    current: &mut ConnectionSubscription,
    session: &mut Session,
    request_id: Option<String>,
    device_id: Option<String>,
) -> bool {
    let sub = match state.gateway.subscribe(device_id.as_deref()) {
        Ok(sub) => sub,
        Err(e) => {
            let err = MonitorServerMessage::Error {
                code: "NotFound",
                message: e.to_string(),
            };
            return send(session, &err).await;
        }
    };
    current.clear();

    // Registered before the snapshot is taken, so no observation falls between.
    for latest in state.gateway.snapshot(device_id.as_deref()) {
        if !send(session, &MonitorServerMessage::Snapshot { latest: &latest }).await {
            return false;
        }
    }
    let ack = MonitorServerMessage::Subscribed {
        request_id,
        device_id,
        active: true,
    };
    if !send(session, &ack).await {
        return false;
    }
    current.replace_with(sub, session.clone());
    true
}
