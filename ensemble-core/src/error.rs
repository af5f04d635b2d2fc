use thiserror::Error;

/// A frame that could not be understood. The connection that produced it stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}
