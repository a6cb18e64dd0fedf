//! Connection lifecycle relay.
//!
//! Bridges the automation client's lifecycle events to any number of
//! connected observers (the pairing page, monitoring clients) and persists
//! the session bundle when pairing completes.

use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use qrcode::{render::svg, QrCode};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    client::{ChatClient, ClientEvent},
    config::StatusMessages,
    domain::{OutboundMessage, OutboundPayload, SessionData},
    errors::Error,
    session::SessionStore,
    Result,
};

const PING_COMMAND: &str = "!ping";
const PING_REPLY: &str = "pong";

/// Where the client currently is in its pairing lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    QrPending,
    Authenticated,
    Ready,
}

/// JSON-shaped notification pushed to observers.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ObserverEvent {
    Message {
        text: String,
    },
    Qr {
        #[serde(rename = "dataUrl")]
        data_url: String,
    },
    Authenticated {
        text: String,
    },
    Ready {
        text: String,
    },
    Disconnected {
        text: String,
    },
}

struct RelayInner {
    state: ConnectionState,
    session: Option<SessionData>,
    observers: Vec<mpsc::UnboundedSender<ObserverEvent>>,
}

/// Forwards client lifecycle events to observers, in emission order.
///
/// Each observer gets its own unbounded channel, so a slow consumer never
/// stalls the event loop or its peers. Observers that connect mid-session
/// receive only the generic connecting status; past QR/authenticated/ready
/// events are not replayed, so a late observer sees future events only.
pub struct ConnectionRelay {
    client: Arc<dyn ChatClient>,
    store: SessionStore,
    status: StatusMessages,
    inner: Mutex<RelayInner>,
}

impl ConnectionRelay {
    pub fn new(client: Arc<dyn ChatClient>, store: SessionStore, status: StatusMessages) -> Self {
        Self {
            client,
            store,
            status,
            inner: Mutex::new(RelayInner {
                state: ConnectionState::Connecting,
                session: None,
                observers: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    /// Latest session observed from the client, kept usable in memory even
    /// when persisting it failed.
    pub fn session(&self) -> Option<SessionData> {
        self.inner.lock().unwrap().session.clone()
    }

    /// Register a new observer. It is greeted with the connecting status and
    /// then receives every future event; no history is replayed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ObserverEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        let _ = tx.send(ObserverEvent::Message {
            text: self.status.connecting.clone(),
        });
        inner.observers.push(tx);
        rx
    }

    /// Initialize the client and pump its events until the stream closes.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(64);
        self.client.initialize(tx).await?;
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        Ok(())
    }

    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Qr { code } => match render_qr_data_url(&code) {
                Ok(data_url) => {
                    self.set_state(ConnectionState::QrPending);
                    self.broadcast(ObserverEvent::Qr { data_url });
                    self.broadcast(ObserverEvent::Message {
                        text: self.status.qr_received.clone(),
                    });
                }
                Err(e) => tracing::warn!("failed to render pairing QR: {e}"),
            },
            ClientEvent::Authenticated { session } => {
                self.set_state(ConnectionState::Authenticated);
                self.broadcast(ObserverEvent::Authenticated {
                    text: self.status.authenticated.clone(),
                });
                self.broadcast(ObserverEvent::Message {
                    text: self.status.authenticated.clone(),
                });
                self.inner.lock().unwrap().session = Some(session.clone());
                // Best-effort: a failed write never retracts the notification
                // already delivered; the in-memory session stays usable for
                // the rest of the process lifetime.
                if let Err(e) = self.store.save(&session) {
                    tracing::error!(
                        "failed to persist session to {}: {e}",
                        self.store.path().display()
                    );
                }
            }
            ClientEvent::Ready => {
                self.set_state(ConnectionState::Ready);
                self.broadcast(ObserverEvent::Ready {
                    text: self.status.ready.clone(),
                });
                self.broadcast(ObserverEvent::Message {
                    text: self.status.ready.clone(),
                });
            }
            ClientEvent::Disconnected { reason } => {
                tracing::warn!("client disconnected: {reason}");
                self.broadcast(ObserverEvent::Disconnected {
                    text: self.status.disconnected.clone(),
                });
            }
            ClientEvent::Message { from, body } => {
                if body.trim() == PING_COMMAND {
                    let reply = OutboundMessage {
                        to: from,
                        payload: OutboundPayload::Text(PING_REPLY.to_string()),
                        caption: None,
                    };
                    if let Err(e) = self.client.send_message(reply).await {
                        tracing::warn!("ping reply failed: {e}");
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.lock().unwrap().state = state;
    }

    fn broadcast(&self, event: ObserverEvent) {
        let mut inner = self.inner.lock().unwrap();
        inner.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Render a pairing payload as an image the browser can drop into an `<img>`
/// tag.
fn render_qr_data_url(code: &str) -> Result<String> {
    let payload = code.trim();
    if payload.is_empty() {
        return Err(Error::External("QR payload is empty".to_string()));
    }
    let qr = QrCode::new(payload.as_bytes())
        .map_err(|e| Error::External(format!("failed to encode QR payload: {e}")))?;
    let image = qr.render::<svg::Color>().min_dimensions(256, 256).build();
    Ok(format!("data:image/svg+xml;base64,{}", BASE64.encode(image)))
}
