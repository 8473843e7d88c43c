//! Protocol Error Types

use thiserror::Error;

/// Gateway `Result` codes worth retrying
fn is_transient_code(code: i64) -> bool {
    matches!(code, 408 | 429 | 500..=599)
}

/// Ledger gateway and signing errors.
///
/// The failure class decides retry handling:
/// transport and decode faults are retryable, application errors only for
/// transient codes, cryptographic errors never.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway returned Result {code}: {message}")]
    Application { code: i64, message: String },

    #[error("Malformed gateway response: {0}")]
    Decode(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl ProtocolError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Transport(_) | ProtocolError::Decode(_) => true,
            ProtocolError::Application { code, .. } => is_transient_code(*code),
            ProtocolError::Crypto(_) => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Transport(_) => "GATEWAY_TRANSPORT",
            ProtocolError::Application { .. } => "GATEWAY_APPLICATION",
            ProtocolError::Decode(_) => "GATEWAY_DECODE",
            ProtocolError::Crypto(_) => "CRYPTO",
        }
    }
}

impl From<reqwest::Error> for ProtocolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProtocolError::Decode(e.to_string())
        } else {
            ProtocolError::Transport(e.to_string())
        }
    }
}
