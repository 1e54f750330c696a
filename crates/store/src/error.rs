use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A precondition failed: unknown target, bad membership, wrong module
    /// type, malformed argument. Surfaced to the client verbatim.
    #[error("{message}")]
    Invalid { message: String },

    /// An account with this email already exists.
    #[error("account already exists")]
    Duplicate,

    /// Backend failure; logged server-side, never shown to the client.
    #[error("{message}")]
    Internal { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
