//! Route handlers: request validation lives in the dispatcher; this module
//! only shapes HTTP in and out.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Multipart, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use zapgate_core::{dispatch::DispatchReply, domain::UploadedFile, Error};

use crate::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(observer_socket))
        .route("/envia-mensagem", post(send_text))
        .route("/envia-imagem", post(send_image))
        .route("/envia-arquivo", post(send_file))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(include_str!("../assets/index.html"))
}

async fn observer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| relay_to_observer(socket, state))
        .into_response()
}

/// Pump relay events into the socket. The per-observer channel means a slow
/// socket only delays itself, never the relay or its peers.
async fn relay_to_observer(mut socket: WebSocket, state: AppState) {
    let mut events = state.relay.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                // Observers only listen; a close or error tears the pump down.
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendTextRequest {
    #[serde(default)]
    numero: String,
    #[serde(default)]
    mensagem: String,
}

#[derive(Debug, Deserialize)]
struct SendImageRequest {
    #[serde(default)]
    numero: String,
    legenda: Option<String>,
}

async fn send_text(State(state): State<AppState>, Json(req): Json<SendTextRequest>) -> Response {
    envelope(state.dispatcher.send_text(&req.numero, &req.mensagem).await)
}

async fn send_image(State(state): State<AppState>, Json(req): Json<SendImageRequest>) -> Response {
    envelope(
        state
            .dispatcher
            .send_image(&req.numero, req.legenda.as_deref())
            .await,
    )
}

async fn send_file(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut numero = String::new();
    let mut legenda: Option<String> = None;
    let mut arquivo: Option<UploadedFile> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("invalid multipart body: {e}")),
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "numero" => numero = field.text().await.unwrap_or_default(),
            "legenda" => legenda = field.text().await.ok(),
            "arquivo" => {
                let filename = field.file_name().unwrap_or("arquivo").to_string();
                let mime_type = field.content_type().map(str::to_string).unwrap_or_else(|| {
                    mime_guess::from_path(&filename)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                });
                match field.bytes().await {
                    Ok(bytes) => {
                        arquivo = Some(UploadedFile {
                            name: filename,
                            mime_type,
                            data: bytes.to_vec(),
                        })
                    }
                    Err(e) => return bad_request(format!("failed to read upload: {e}")),
                }
            }
            _ => {}
        }
    }

    envelope(
        state
            .dispatcher
            .send_file(&numero, legenda.as_deref(), arquivo)
            .await,
    )
}

/// Map a dispatch outcome onto the wire contract: 200/500 envelopes with the
/// client's response passed through, 422 with per-field detail for rejected
/// input.
fn envelope(result: zapgate_core::Result<DispatchReply>) -> Response {
    match result {
        Ok(reply) => {
            let code = if reply.status {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                code,
                Json(json!({ "status": reply.status, "response": reply.response })),
            )
                .into_response()
        }
        Err(Error::Validation { fields }) => {
            let message: HashMap<String, &str> =
                fields.into_iter().map(|f| (f, "Invalid value")).collect();
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "status": false, "message": message })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": false, "response": e.to_string() })),
        )
            .into_response(),
    }
}

fn bad_request(reason: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": false, "response": reason })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use zapgate_core::{
        client::{ChatClient, ClientEvent},
        config::StatusMessages,
        dispatch::Dispatcher,
        domain::{OutboundMessage, OutboundPayload},
        relay::ConnectionRelay,
        session::SessionStore,
        Result as CoreResult,
    };

    struct FakeClient {
        fail_with: Option<String>,
        sends: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl ChatClient for FakeClient {
        async fn initialize(&self, _events: mpsc::Sender<ClientEvent>) -> CoreResult<()> {
            Ok(())
        }

        async fn send_message(&self, message: OutboundMessage) -> CoreResult<serde_json::Value> {
            if let Some(reason) = &self.fail_with {
                return Err(Error::Client(reason.clone()));
            }
            self.sends.lock().unwrap().push(message);
            Ok(json!({"ack": true}))
        }
    }

    fn test_state(dir: &tempfile::TempDir, fail_with: Option<String>) -> (AppState, Arc<FakeClient>) {
        let client = Arc::new(FakeClient {
            fail_with,
            sends: Mutex::new(Vec::new()),
        });
        let store = SessionStore::new(dir.path().join("session.json"));
        let relay = Arc::new(ConnectionRelay::new(
            client.clone(),
            store,
            StatusMessages::default(),
        ));
        let image = dir.path().join("imagem.png");
        std::fs::write(&image, b"png bytes").unwrap();
        let dispatcher = Arc::new(Dispatcher::new(client.clone(), image));
        (AppState { dispatcher, relay }, client)
    }

    async fn spawn_app(state: AppState) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn index_serves_the_pairing_page() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let res = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body = res.text().await.unwrap();
        assert!(body.contains("<html"));
        assert!(body.contains("qrcode"));
    }

    #[tokio::test]
    async fn text_route_returns_a_success_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let (state, client) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-mensagem"))
            .json(&json!({"numero": "0819999999", "mensagem": "olá"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], Value::Bool(true));
        assert_eq!(body["response"]["ack"], Value::Bool(true));

        let sends = client.sends.lock().unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].to.as_str(), "55819999999@c.us");
    }

    #[tokio::test]
    async fn missing_message_is_rejected_before_any_send() {
        let dir = tempfile::tempdir().unwrap();
        let (state, client) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-mensagem"))
            .json(&json!({"numero": "0819999999", "mensagem": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 422);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], Value::Bool(false));
        assert_eq!(body["message"]["mensagem"], "Invalid value");

        assert!(client.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_rejections_map_to_a_500_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir, Some("number is not registered".to_string()));
        let addr = spawn_app(state).await;

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-mensagem"))
            .json(&json!({"numero": "0819999999", "mensagem": "olá"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 500);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["status"], Value::Bool(false));
        assert!(body["response"]
            .as_str()
            .unwrap()
            .contains("number is not registered"));
    }

    #[tokio::test]
    async fn image_route_sends_the_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let (state, client) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-imagem"))
            .json(&json!({"numero": "5581999999999", "legenda": "segue a imagem"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);

        let sends = client.sends.lock().unwrap();
        assert_eq!(sends[0].caption.as_deref(), Some("segue a imagem"));
        assert!(matches!(
            &sends[0].payload,
            OutboundPayload::Media { mime_type, data, .. }
                if mime_type == "image/png" && data == b"png bytes"
        ));
    }

    #[tokio::test]
    async fn file_route_accepts_a_multipart_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (state, client) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let part = reqwest::multipart::Part::bytes(b"conteudo".to_vec())
            .file_name("nota.txt")
            .mime_str("text/plain")
            .unwrap();
        let form = reqwest::multipart::Form::new()
            .text("numero", "5581988887777")
            .text("legenda", "segue o arquivo")
            .part("arquivo", part);

        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-arquivo"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 200);

        let sends = client.sends.lock().unwrap();
        assert_eq!(sends[0].to.as_str(), "5581988887777@c.us");
        assert_eq!(sends[0].caption.as_deref(), Some("segue o arquivo"));
        assert!(matches!(
            &sends[0].payload,
            OutboundPayload::Media { mime_type, filename, data }
                if mime_type == "text/plain" && filename == "nota.txt" && data == b"conteudo"
        ));
    }

    #[tokio::test]
    async fn file_route_without_attachment_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (state, client) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let form = reqwest::multipart::Form::new().text("numero", "5581988887777");
        let res = reqwest::Client::new()
            .post(format!("http://{addr}/envia-arquivo"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status().as_u16(), 422);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["message"]["arquivo"], "Invalid value");

        assert!(client.sends.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_socket_greets_with_the_connecting_status() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _) = test_state(&dir, None);
        let addr = spawn_app(state).await;

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        let msg = ws.next().await.unwrap().unwrap();
        let text = msg.into_text().unwrap();
        let event: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(event["event"], "message");
        assert_eq!(event["text"], "Conectando...");
    }
}
