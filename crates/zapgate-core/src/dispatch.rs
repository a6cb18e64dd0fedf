//! Outbound message dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::{
    client::ChatClient,
    domain::{OutboundMessage, OutboundPayload, UploadedFile},
    errors::Error,
    recipient, Result,
};

/// Uniform reply envelope for the three send operations.
///
/// `status` is false when the client rejected the send; the client's error is
/// passed through verbatim in `response`. No retry, no error classification:
/// resubmitting is the caller's call.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchReply {
    pub status: bool,
    pub response: Value,
}

/// Validates, normalizes and forwards send requests to the client.
pub struct Dispatcher {
    client: Arc<dyn ChatClient>,
    image_file: PathBuf,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn ChatClient>, image_file: PathBuf) -> Self {
        Self { client, image_file }
    }

    /// Send a plain text message. Requires `numero` and `mensagem`.
    pub async fn send_text(&self, numero: &str, mensagem: &str) -> Result<DispatchReply> {
        require(&[("numero", numero), ("mensagem", mensagem)])?;

        let message = OutboundMessage {
            to: recipient::normalize(numero),
            payload: OutboundPayload::Text(mensagem.to_string()),
            caption: None,
        };
        Ok(self.deliver(message).await)
    }

    /// Send the fixed server-side image, with an optional caption.
    pub async fn send_image(&self, numero: &str, legenda: Option<&str>) -> Result<DispatchReply> {
        require(&[("numero", numero)])?;

        let data = tokio::fs::read(&self.image_file).await?;
        let mime_type = mime_guess::from_path(&self.image_file)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let filename = self
            .image_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "imagem".to_string());

        let message = OutboundMessage {
            to: recipient::normalize(numero),
            payload: OutboundPayload::Media {
                mime_type,
                filename,
                data,
            },
            caption: legenda.map(str::to_string),
        };
        Ok(self.deliver(message).await)
    }

    /// Send an uploaded file, with an optional caption.
    pub async fn send_file(
        &self,
        numero: &str,
        legenda: Option<&str>,
        arquivo: Option<UploadedFile>,
    ) -> Result<DispatchReply> {
        let mut missing = missing_fields(&[("numero", numero)]);
        let Some(file) = arquivo else {
            missing.push("arquivo".to_string());
            return Err(Error::Validation { fields: missing });
        };
        if !missing.is_empty() {
            return Err(Error::Validation { fields: missing });
        }

        let message = OutboundMessage {
            to: recipient::normalize(numero),
            payload: OutboundPayload::Media {
                mime_type: file.mime_type,
                filename: file.name,
                data: file.data,
            },
            caption: legenda.map(str::to_string),
        };
        Ok(self.deliver(message).await)
    }

    /// Exactly one client call per request; its outcome becomes the envelope.
    async fn deliver(&self, message: OutboundMessage) -> DispatchReply {
        match self.client.send_message(message).await {
            Ok(response) => DispatchReply {
                status: true,
                response,
            },
            Err(e) => DispatchReply {
                status: false,
                response: Value::String(e.to_string()),
            },
        }
    }
}

/// Reject a request before any normalization or client call when required
/// fields are missing or empty.
fn require(fields: &[(&str, &str)]) -> Result<()> {
    let missing = missing_fields(fields);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { fields: missing })
    }
}

fn missing_fields(fields: &[(&str, &str)]) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| (*name).to_string())
        .collect()
}
