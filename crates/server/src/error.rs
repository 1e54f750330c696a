//! Request-level error taxonomy.
//!
//! `Invalid` and `Unauthorized` are anticipated and caller-visible;
//! `Internal` is logged with full detail server-side while the client only
//! sees a generic message. `Unauthorized` additionally forces the
//! connection back to `LoggedOut` after the error reply.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{message}")]
    Invalid { message: String },

    #[error("not authorized")]
    Unauthorized,

    #[error("internal server error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl RequestError {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            source: source.into(),
        }
    }

    /// The message shown to the client.
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}

impl From<comcore_store::Error> for RequestError {
    fn from(err: comcore_store::Error) -> Self {
        match err {
            comcore_store::Error::Invalid { message } => Self::Invalid { message },
            comcore_store::Error::Duplicate => Self::invalid("account already exists"),
            comcore_store::Error::Internal { message } => Self::Internal {
                source: anyhow::anyhow!(message),
            },
        }
    }
}

impl From<comcore_mail::MailError> for RequestError {
    fn from(err: comcore_mail::MailError) -> Self {
        Self::Internal {
            source: err.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
