use serde::{Deserialize, Serialize};

/// Normalized chat address: international digits plus the chat domain suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatAddress(pub String);

impl ChatAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque credential bundle issued by the automation client after pairing.
///
/// The gateway persists and forwards it verbatim; none of its fields are
/// interpreted here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(pub serde_json::Value);

/// A file received from an upload, forwarded to the client as media.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Payload of a single outbound send.
#[derive(Clone, Debug)]
pub enum OutboundPayload {
    Text(String),
    Media {
        mime_type: String,
        filename: String,
        data: Vec<u8>,
    },
}

/// One send request, handed to the client exactly once and then discarded.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub to: ChatAddress,
    pub payload: OutboundPayload,
    pub caption: Option<String>,
}
