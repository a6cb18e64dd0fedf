//! Sidecar adapter for the chat-automation client.
//!
//! The actual protocol/browser implementation lives in an external process;
//! this crate drives it over newline-delimited JSON on stdin/stdout and
//! exposes it through the core `ChatClient` port.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    sync::{mpsc, oneshot, Mutex},
};
use tokio_util::sync::CancellationToken;

use zapgate_core::{
    client::{ChatClient, ClientEvent},
    domain::{ChatAddress, OutboundMessage, OutboundPayload, SessionData},
    errors::Error,
    Result,
};

/// How to launch the sidecar, plus the session it should resume from.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub session: Option<SessionData>,
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>;

/// `ChatClient` implementation backed by an external automation process.
///
/// Send replies are correlated with their requests by id; everything else on
/// the sidecar's stdout is a lifecycle event for the relay.
pub struct BridgeClient {
    cfg: BridgeConfig,
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl BridgeClient {
    pub fn new(cfg: BridgeConfig) -> Self {
        Self {
            cfg,
            child: Arc::new(Mutex::new(None)),
            stdin: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop the reader task and kill the sidecar. Pending sends fail.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.fail_pending("bridge shut down").await;

        let child = { self.child.lock().await.take() };
        let Some(mut child) = child else {
            return Ok(());
        };

        // If it already exited, `try_wait` reaps it.
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.kill().await?;
        let _ = child.wait().await?;
        Ok(())
    }

    async fn fail_pending(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(Error::Client(reason.to_string())));
        }
    }

    async fn write_line(&self, line: String) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return Err(Error::Client("bridge not initialized".to_string()));
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ChatClient for BridgeClient {
    async fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> Result<()> {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::External("bridge stdout was not captured".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::External("bridge stdin was not captured".to_string()))?;
        let stderr = child.stderr.take();

        {
            *self.child.lock().await = Some(child);
        }
        {
            *self.stdin.lock().await = Some(stdin);
        }

        // Drain stderr in background so a chatty sidecar cannot block on a
        // full pipe.
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("bridge stderr: {line}");
                }
            });
        }

        // Reader task: replies complete their pending send, everything else
        // is a lifecycle event.
        let pending = self.pending.clone();
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        match parse_line(&line) {
                            Ok(BridgeLine::Reply { id, result }) => {
                                match pending.lock().await.remove(&id) {
                                    Some(tx) => {
                                        let _ = tx.send(result);
                                    }
                                    None => tracing::warn!("bridge reply for unknown id {id}"),
                                }
                            }
                            Ok(BridgeLine::Event(event)) => {
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("unparseable bridge line: {e}"),
                        }
                    }
                }
            }
            tracing::info!("bridge event stream closed");
        });

        self.write_line(init_line(self.cfg.session.as_ref())).await
    }

    async fn send_message(&self, message: OutboundMessage) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(send_line(id, &message)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        // No timeout here: a hung sidecar hangs the request, matching the
        // upstream client's contract.
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Client("bridge closed before replying".to_string())),
        }
    }
}

enum BridgeLine {
    Event(ClientEvent),
    Reply { id: u64, result: Result<Value> },
}

fn parse_line(line: &str) -> Result<BridgeLine> {
    let value: Value = serde_json::from_str(line)?;

    if let Some(id) = value.get("reply").and_then(Value::as_u64) {
        let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let result = if ok {
            Ok(value.get("result").cloned().unwrap_or(Value::Null))
        } else {
            let err = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("bridge send failed");
            Err(Error::Client(err.to_string()))
        };
        return Ok(BridgeLine::Reply { id, result });
    }

    let Some(kind) = value.get("event").and_then(Value::as_str) else {
        return Err(Error::External(format!(
            "bridge line has neither event nor reply: {line}"
        )));
    };
    let str_field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let event = match kind {
        "qr" => ClientEvent::Qr {
            code: str_field("code"),
        },
        "authenticated" => ClientEvent::Authenticated {
            session: SessionData(value.get("session").cloned().unwrap_or(Value::Null)),
        },
        "ready" => ClientEvent::Ready,
        "disconnected" => ClientEvent::Disconnected {
            reason: str_field("reason"),
        },
        "message" => ClientEvent::Message {
            from: ChatAddress(str_field("from")),
            body: str_field("body"),
        },
        other => {
            return Err(Error::External(format!("unknown bridge event: {other}")));
        }
    };
    Ok(BridgeLine::Event(event))
}

fn init_line(session: Option<&SessionData>) -> String {
    json!({
        "op": "init",
        "session": session.map(|s| s.0.clone()),
    })
    .to_string()
}

fn send_line(id: u64, message: &OutboundMessage) -> String {
    let mut line = json!({
        "op": "send",
        "id": id,
        "to": message.to.as_str(),
    });
    match &message.payload {
        OutboundPayload::Text(body) => {
            line["message"] = json!(body);
        }
        OutboundPayload::Media {
            mime_type,
            filename,
            data,
        } => {
            line["media"] = json!({
                "mimetype": mime_type,
                "filename": filename,
                "data": BASE64.encode(data),
            });
        }
    }
    if let Some(caption) = &message.caption {
        line["caption"] = json!(caption);
    }
    line.to_string()
}
