//! Per-connection session state machine and WebSocket endpoint

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::generation::{GenerationOrchestrator, RawGenerateRequest};
use crate::session::protocol::{ClientMessage, ServerMessage};
use crate::session::registry::{ConnectionRegistry, SessionState};
use crate::AppState;

/// One streaming session.
///
/// Outbound messages go through a single channel, so the client sees them
/// in the order they were produced. Generation runs on a spawned task; the
/// caller keeps receiving while it runs. Dropping the session closes it.
pub struct Session {
    id: String,
    orchestrator: Arc<GenerationOrchestrator>,
    registry: Arc<ConnectionRegistry>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    /// Register a new session; the receiver yields its outbound messages
    pub fn open(
        orchestrator: Arc<GenerationOrchestrator>,
        registry: Arc<ConnectionRegistry>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = uuid::Uuid::new_v4().to_string();
        let (outbound, rx) = mpsc::unbounded_channel();
        registry.register(&id);
        info!(session_id = %id, active = registry.len(), "Session opened");

        (
            Self {
                id,
                orchestrator,
                registry,
                outbound,
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.registry.state(&self.id)
    }

    /// Handle one inbound text frame. Never blocks on generation.
    pub fn handle_text(&self, text: &str) {
        match ClientMessage::parse(text) {
            Ok(ClientMessage::Ping) => self.send(ServerMessage::Pong),
            Ok(ClientMessage::Generate(raw)) => self.start_generation(raw),
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Rejected client message");
                self.send(ServerMessage::error(e.to_string()));
            }
        }
    }

    fn send(&self, message: ServerMessage) {
        // Fails only once the connection is gone
        let _ = self.outbound.send(message);
    }

    fn start_generation(&self, raw: RawGenerateRequest) {
        let Some(ticket) = self.registry.try_begin(&self.id) else {
            self.send(ServerMessage::error("A generation is already in progress for this session"));
            return;
        };

        self.send(ServerMessage::starting());

        let id = self.id.clone();
        let orchestrator = self.orchestrator.clone();
        let registry = self.registry.clone();
        let outbound = self.outbound.clone();

        let task = tokio::spawn(async move {
            let message = match orchestrator.prepare(&raw) {
                Ok(request) => {
                    if registry.is_current(&id, ticket) {
                        let _ = outbound.send(ServerMessage::generating());
                    }
                    match orchestrator.execute(request).await {
                        Ok(result) => ServerMessage::from_result(&result),
                        Err(e) => ServerMessage::error(e.to_string()),
                    }
                }
                Err(e) => ServerMessage::error(e.to_string()),
            };

            if let ServerMessage::Error { message } = &message {
                warn!(session_id = %id, error = %message, "Session generation failed");
            }

            // A closed session gets nothing more
            if registry.is_current(&id, ticket) {
                let _ = outbound.send(message);
                registry.finish(&id, ticket);
            }
        });

        self.registry.attach(&self.id, ticket, task.abort_handle());
    }

    /// Close the session, cancelling any in-flight generation. Idempotent.
    pub fn close(&self) {
        if self.registry.close(&self.id) {
            info!(session_id = %self.id, active = self.registry.len(), "Session closed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Upgrade to a streaming session
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.orchestrator.clone(), state.sessions.clone()))
}

async fn handle_socket(
    socket: WebSocket,
    orchestrator: Arc<GenerationOrchestrator>,
    registry: Arc<ConnectionRegistry>,
) {
    let (session, mut rx) = Session::open(orchestrator, registry);
    let (mut sink, mut stream) = socket.split();

    let sender_id = session.id().to_string();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(session_id = %sender_id, error = %e, "Failed to encode session message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!(session_id = %sender_id, "WebSocket sink closed");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(&text),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_text(text),
                Err(_) => session.handle_text(""),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session_id = %session.id(), error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    session.close();
    send_task.abort();
}
