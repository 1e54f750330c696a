//! Confirmation-code delivery.
//!
//! The server only needs accepted-for-delivery semantics, so the interface
//! is a single `send_code`. `LogMailer` records deliveries through tracing
//! for standalone runs; `CaptureMailer` retains them in memory so tests can
//! read back the code that "arrived".

use {async_trait::async_trait, comcore_protocol::CodeKind, tokio::sync::Mutex};

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {message}")]
pub struct MailError {
    pub message: String,
}

impl MailError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outbound email, reduced to the one message the server sends.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `code` to `email`. Returns once the message is accepted for
    /// delivery.
    async fn send_code(&self, email: &str, kind: CodeKind, code: &str) -> Result<(), MailError>;
}

// ── Log mailer ───────────────────────────────────────────────────────────────

/// Delivery that only logs. Used when no real mail transport is configured;
/// the operator reads the code out of the server log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_code(&self, email: &str, kind: CodeKind, code: &str) -> Result<(), MailError> {
        tracing::info!(email, kind = kind.as_str(), code, "confirmation code issued");
        Ok(())
    }
}

// ── Capture mailer ───────────────────────────────────────────────────────────

/// A delivered message retained by [`CaptureMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub email: String,
    pub kind: CodeKind,
    pub code: String,
}

/// Test mailer that silences delivery and keeps every message for
/// inspection.
#[derive(Default)]
pub struct CaptureMailer {
    sent: Mutex<Vec<SentCode>>,
}

impl CaptureMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages delivered so far, oldest first.
    pub async fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().await.clone()
    }

    /// The most recent code delivered to `email`, if any.
    pub async fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|s| s.email == email)
            .map(|s| s.code.clone())
    }
}

#[async_trait]
impl Mailer for CaptureMailer {
    async fn send_code(&self, email: &str, kind: CodeKind, code: &str) -> Result<(), MailError> {
        self.sent.lock().await.push(SentCode {
            email: email.to_string(),
            kind,
            code: code.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_mailer_records_in_order() {
        let mailer = CaptureMailer::new();
        mailer
            .send_code("a@x", CodeKind::NewAccount, "111111")
            .await
            .unwrap();
        mailer
            .send_code("a@x", CodeKind::TwoFactor, "222222")
            .await
            .unwrap();

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].code, "111111");
        assert_eq!(mailer.last_code_for("a@x").await.as_deref(), Some("222222"));
        assert_eq!(mailer.last_code_for("b@x").await, None);
    }
}
