//! Error type for the DIS transport core.
//!
//! # Design
//! Callers see a single `ClientError` for every failure. Transport failures
//! keep the underlying `ureq::Error` as their source, non-2xx responses carry
//! the status line and the server's error body, and operations outside the
//! binding table surface as `Unimplemented` before any I/O happens.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned by the transport and dispatcher.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout, DNS or TLS failure below the HTTP layer.
    #[error("transport failure: {source}")]
    Transport {
        #[source]
        source: ureq::Error,
    },

    /// The server answered with a non-2xx status.
    ///
    /// `reason` is the canonical phrase for `status`, not the text on the
    /// server's status line: ureq does not expose that text. It is empty for
    /// codes without a registered phrase.
    #[error("{}", status_line(.status, .reason, .body))]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    /// No binding exists for the requested operation.
    #[error("unimplemented operation: {0}")]
    Unimplemented(String),

    /// The request payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be decoded into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request could not be assembled (malformed URL or header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status code, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}

impl From<ureq::Error> for ClientError {
    fn from(source: ureq::Error) -> Self {
        ClientError::Transport { source }
    }
}

fn status_line(status: &u16, reason: &str, body: &str) -> String {
    if body.is_empty() {
        format!("{status} {reason}")
    } else {
        format!("{status} {reason} : {body}")
    }
}
