//! Error taxonomy for the ingestion pipeline.
//!
//! Every error here is recoverable: the pipeline logs it, counts it and moves
//! on to the next frame, record or connection attempt.

use tokio_tungstenite::tungstenite;

/// A frame that could not be turned into a [`Command`](crate::protocol::Command).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame for command {cmd} is missing `{field}`")]
    MissingField { cmd: i64, field: &'static str },

    #[error("frame for command {cmd} has an unexpected body shape")]
    UnexpectedBody { cmd: i64 },
}

/// A raw chat record that could not be normalized into a [`Chat`](crate::Chat).
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("record has no profile")]
    MissingProfile,

    #[error("embedded `{field}` is not valid JSON: {source}")]
    EmbeddedJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile has no nickname")]
    MissingNickname,
}

/// Transport-level failure; always answered with a scheduled reconnect.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("could not encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("closed by server")]
    ClosedByServer,

    #[error("stream ended")]
    StreamEnded,

    #[error("no inbound traffic within {0:?} of a keepalive ping")]
    LivenessTimeout(std::time::Duration),
}

impl NormalizeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingProfile => "missing_profile",
            Self::EmbeddedJson { .. } => "embedded_json",
            Self::MissingNickname => "missing_nickname",
        }
    }
}
