//! Pending confirmation codes and half-created accounts.
//!
//! One process-wide table, keyed by email. Codes are 6 digits, live for an
//! hour, and die after three wrong guesses or one right one. While a code
//! of a given kind is live, further sends of the same kind return the
//! existing entry instead of minting a new secret.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {comcore_mail::Mailer, comcore_protocol::CodeKind, comcore_store::UserId, tracing::debug};

use comcore_protocol::{CODE_DIGITS, CODE_LIFETIME_MS, CODE_MAX_FAILS};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// What a matched code proves; carried from `sendConfirmation` to
/// `checkCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeData {
    NewAccount,
    TwoFactor { user_id: UserId },
    ResetPassword { user_id: UserId },
}

struct PendingCode {
    kind: CodeKind,
    code: String,
    data: CodeData,
    expire_at: i64,
    fails: u32,
}

/// An account between `createAccount` and the completed `newAccount`
/// confirmation.
#[derive(Debug, Clone)]
pub struct PendingAccount {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Default)]
pub struct CodeManager {
    codes: Mutex<HashMap<String, PendingCode>>,
    pending: Mutex<HashMap<String, PendingAccount>>,
}

impl CodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue (or re-issue) a confirmation code for `email` and hand it to
    /// the mailer. A live entry of the same kind is returned unchanged, so
    /// resends within the lifetime do not rotate the secret.
    pub async fn send_confirmation(
        &self,
        mailer: &dyn Mailer,
        email: &str,
        kind: CodeKind,
        data: CodeData,
    ) -> Result<(), comcore_mail::MailError> {
        let code = {
            let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
            let now = now_ms();
            match codes.get(email) {
                Some(existing) if existing.kind == kind && now < existing.expire_at => {
                    existing.code.clone()
                },
                _ => {
                    let code = comcore_crypto::random_code(CODE_DIGITS);
                    codes.insert(email.to_string(), PendingCode {
                        kind,
                        code: code.clone(),
                        data,
                        expire_at: now + CODE_LIFETIME_MS as i64,
                        fails: 0,
                    });
                    code
                },
            }
        };
        mailer.send_code(email, kind, &code).await
    }

    /// Check a candidate code. Returns the bound data iff the kind matches,
    /// the entry is unexpired, and the trimmed candidate is an exact match;
    /// the entry is removed on success. A wrong guess counts toward the
    /// fail limit and the entry is dropped at the third.
    pub fn check_code(&self, email: &str, kind: CodeKind, candidate: &str) -> Option<CodeData> {
        let candidate = candidate.trim();
        if candidate.len() != CODE_DIGITS {
            return None;
        }
        let mut codes = self.codes.lock().unwrap_or_else(|e| e.into_inner());
        let entry = codes.get_mut(email)?;
        if entry.kind != kind || now_ms() >= entry.expire_at {
            return None;
        }
        if entry.code == candidate {
            let data = entry.data;
            codes.remove(email);
            return Some(data);
        }
        entry.fails += 1;
        if entry.fails >= CODE_MAX_FAILS {
            debug!(email, "confirmation code discarded after repeated failures");
            codes.remove(email);
        }
        None
    }

    /// Begin account creation: hash the password, remember the pending
    /// account, and mail a `newAccount` code. Returns false when a pending
    /// account for this email already exists.
    pub async fn start_creation(
        &self,
        mailer: &dyn Mailer,
        name: &str,
        email: &str,
        pass: &str,
    ) -> Result<bool, comcore_mail::MailError> {
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.contains_key(email) {
                return Ok(false);
            }
            pending.insert(email.to_string(), PendingAccount {
                email: email.to_string(),
                name: name.to_string(),
                password_hash: comcore_crypto::hash_password(pass),
            });
        }
        self.send_confirmation(mailer, email, CodeKind::NewAccount, CodeData::NewAccount)
            .await?;
        Ok(true)
    }

    /// True iff a pending account exists for `email` and `pass` matches its
    /// stored hash. On true the confirmation is re-sent, so a user whose
    /// first code expired gets a fresh email.
    pub async fn continue_creation(
        &self,
        mailer: &dyn Mailer,
        email: &str,
        pass: &str,
    ) -> Result<bool, comcore_mail::MailError> {
        let matches = {
            let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending
                .get(email)
                .is_some_and(|p| comcore_crypto::check_password(pass, &p.password_hash))
        };
        if matches {
            self.send_confirmation(mailer, email, CodeKind::NewAccount, CodeData::NewAccount)
                .await?;
        }
        Ok(matches)
    }

    /// Pop the pending account for `email`, if any. The caller finishes
    /// creation against the store.
    pub fn take_pending(&self, email: &str) -> Option<PendingAccount> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(email)
    }

    /// Drop expired codes. Called opportunistically; correctness does not
    /// depend on it since `check_code` re-checks expiry.
    pub fn evict_expired(&self) {
        let now = now_ms();
        self.codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, c| now < c.expire_at);
    }

    #[cfg(test)]
    fn force_expire(&self, email: &str) {
        if let Some(entry) = self
            .codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(email)
        {
            entry.expire_at = now_ms();
        }
    }

    #[cfg(test)]
    fn stored_code(&self, email: &str) -> Option<String> {
        self.codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(email)
            .map(|c| c.code.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use comcore_mail::CaptureMailer;

    use super::*;

    #[tokio::test]
    async fn code_is_single_use() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        let code = mailer.last_code_for("a@x").await.unwrap();

        assert_eq!(
            codes.check_code("a@x", CodeKind::NewAccount, &code),
            Some(CodeData::NewAccount)
        );
        assert_eq!(codes.check_code("a@x", CodeKind::NewAccount, &code), None);
    }

    #[tokio::test]
    async fn resend_of_same_kind_keeps_the_code() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        for _ in 0..2 {
            codes
                .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
                .await
                .unwrap();
        }
        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].code, sent[1].code);
    }

    #[tokio::test]
    async fn different_kind_overwrites() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        let first = mailer.last_code_for("a@x").await.unwrap();
        codes
            .send_confirmation(
                &mailer,
                "a@x",
                CodeKind::ResetPassword,
                CodeData::ResetPassword { user_id: 1 },
            )
            .await
            .unwrap();

        // The old kind no longer matches even with the right code.
        assert_eq!(codes.check_code("a@x", CodeKind::NewAccount, &first), None);
    }

    #[tokio::test]
    async fn three_failures_discard_the_entry() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::TwoFactor, CodeData::TwoFactor {
                user_id: 7,
            })
            .await
            .unwrap();
        let code = mailer.last_code_for("a@x").await.unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        for _ in 0..3 {
            assert_eq!(codes.check_code("a@x", CodeKind::TwoFactor, wrong), None);
        }
        // Even the correct code is now rejected.
        assert_eq!(codes.check_code("a@x", CodeKind::TwoFactor, &code), None);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_at_the_boundary() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        let code = mailer.last_code_for("a@x").await.unwrap();
        codes.force_expire("a@x");
        assert_eq!(codes.check_code("a@x", CodeKind::NewAccount, &code), None);
    }

    #[tokio::test]
    async fn candidate_is_trimmed_and_length_checked() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        let code = mailer.last_code_for("a@x").await.unwrap();

        // Over- and under-length candidates never reach the comparison and
        // never count as failures.
        assert_eq!(codes.check_code("a@x", CodeKind::NewAccount, "12345"), None);
        assert_eq!(
            codes.check_code("a@x", CodeKind::NewAccount, "1234567"),
            None
        );
        assert_eq!(
            codes.check_code("a@x", CodeKind::NewAccount, &format!("  {code}  ")),
            Some(CodeData::NewAccount)
        );
    }

    #[tokio::test]
    async fn creation_flow() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        assert!(
            codes
                .start_creation(&mailer, "Alice", "alice@x", "p")
                .await
                .unwrap()
        );
        // Second start for the same email is refused.
        assert!(
            !codes
                .start_creation(&mailer, "Alice", "alice@x", "p")
                .await
                .unwrap()
        );

        // Logging in again with the right password re-sends the code.
        assert!(codes.continue_creation(&mailer, "alice@x", "p").await.unwrap());
        assert!(!codes.continue_creation(&mailer, "alice@x", "nope").await.unwrap());

        let pending = codes.take_pending("alice@x").unwrap();
        assert_eq!(pending.name, "Alice");
        assert!(comcore_crypto::check_password("p", &pending.password_hash));
        assert!(codes.take_pending("alice@x").is_none());
    }

    #[tokio::test]
    async fn evict_expired_drops_only_dead_entries() {
        let codes = CodeManager::new();
        let mailer = CaptureMailer::new();
        codes
            .send_confirmation(&mailer, "a@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        codes
            .send_confirmation(&mailer, "b@x", CodeKind::NewAccount, CodeData::NewAccount)
            .await
            .unwrap();
        codes.force_expire("a@x");
        codes.evict_expired();
        assert!(codes.stored_code("a@x").is_none());
        assert!(codes.stored_code("b@x").is_some());
    }
}
