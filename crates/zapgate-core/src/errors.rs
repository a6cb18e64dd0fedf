/// Core error type for the gateway.
///
/// Adapter crates should map their specific errors into this type so the edge
/// can turn failures into uniform response envelopes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field(s): {}", .fields.join(", "))]
    Validation { fields: Vec<String> },

    #[error("client error: {0}")]
    Client(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
