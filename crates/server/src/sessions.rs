//! Server-wide session registry.
//!
//! Maps a user id to every live logged-in connection so pushes reach all of
//! a user's devices. Membership changes only through
//! [`SessionRegistry::login_connection`] / [`SessionRegistry::logout_connection`],
//! driven by the login state machine.

use std::{collections::HashMap, sync::Arc};

use {serde_json::Value, tokio::sync::mpsc, tracing::debug};

use {
    comcore_protocol::{Frame, events},
    comcore_store::{GroupId, Store, UserId},
};

use crate::login::LoginState;

// ── Connection handle ────────────────────────────────────────────────────────

/// The shareable half of a connection: its outbound frame queue and its
/// login state. The state lock is never held across an await.
pub struct ConnHandle {
    pub conn_id: String,
    sender: mpsc::UnboundedSender<String>,
    state: std::sync::Mutex<LoginState>,
}

impl ConnHandle {
    pub fn new(conn_id: String, sender: mpsc::UnboundedSender<String>) -> Arc<Self> {
        Arc::new(Self {
            conn_id,
            sender,
            state: std::sync::Mutex::new(LoginState::LoggedOut),
        })
    }

    /// Queue a frame for this connection. Returns false when the write loop
    /// is gone (connection cancelled); the frame is silently dropped then.
    pub fn send(&self, frame: &Frame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.sender.send(json).is_ok(),
            Err(_) => false,
        }
    }

    pub fn state(&self) -> LoginState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_state(&self, state: LoginState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// The logged-in user, if any.
    pub fn user_id(&self) -> Option<UserId> {
        match &*self.state.lock().unwrap_or_else(|e| e.into_inner()) {
            LoginState::LoggedIn { user_id, .. } => Some(*user_id),
            _ => None,
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct SessionRegistry {
    inner: tokio::sync::Mutex<HashMap<UserId, Vec<Arc<ConnHandle>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `user`. Called on entering `LoggedIn`.
    pub async fn login_connection(&self, user: UserId, conn: Arc<ConnHandle>) {
        let mut inner = self.inner.lock().await;
        let conns = inner.entry(user).or_default();
        conns.retain(|c| c.conn_id != conn.conn_id);
        conns.push(conn);
    }

    /// Deregister a connection. Called on leaving `LoggedIn`. Empty entries
    /// are removed so the map tracks only online users.
    pub async fn logout_connection(&self, user: UserId, conn_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(conns) = inner.get_mut(&user) {
            conns.retain(|c| c.conn_id != conn_id);
            if conns.is_empty() {
                inner.remove(&user);
            }
        }
    }

    /// Push a frame to every session of `user` except `except`.
    pub async fn forward(&self, user: UserId, event: &str, data: &Value, except: Option<&str>) {
        let frame = Frame::push(event, data.clone());
        let inner = self.inner.lock().await;
        if let Some(conns) = inner.get(&user) {
            for conn in conns {
                if Some(conn.conn_id.as_str()) == except {
                    continue;
                }
                conn.send(&frame);
            }
        }
    }

    /// Push a frame to every session of every member of `group`, except the
    /// originating connection; that device reconciles from its direct
    /// reply. The member list is read after the triggering store write, so
    /// a recipient querying the store right away sees the new state.
    pub async fn forward_group(
        &self,
        store: &dyn Store,
        group: GroupId,
        event: &str,
        data: &Value,
        except: Option<&str>,
    ) {
        let users = match store.get_users(group).await {
            Ok(users) => users,
            Err(e) => {
                debug!(group, event, error = %e, "skipping group push");
                return;
            },
        };
        for user in users {
            self.forward(user, event, data, except).await;
        }
    }

    /// Transition every session of `user` except `except` back to
    /// `LoggedOut` and tell it so.
    pub async fn force_logout(&self, user: UserId, except: Option<&str>) {
        let mut inner = self.inner.lock().await;
        let Some(conns) = inner.get_mut(&user) else {
            return;
        };
        let logout = Frame::push(events::LOGOUT, serde_json::json!({}));
        conns.retain(|conn| {
            if Some(conn.conn_id.as_str()) == except {
                return true;
            }
            conn.set_state(LoginState::LoggedOut);
            conn.send(&logout);
            false
        });
        if conns.is_empty() {
            inner.remove(&user);
        }
    }

    /// Number of live sessions for `user`.
    pub async fn session_count(&self, user: UserId) -> usize {
        self.inner
            .lock()
            .await
            .get(&user)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn handle(id: &str) -> (Arc<ConnHandle>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnHandle::new(id.to_string(), tx), rx)
    }

    fn logged_in(conn: &ConnHandle, user: UserId) {
        conn.set_state(LoginState::LoggedIn {
            user_id: user,
            name: "u".into(),
            token: "t".into(),
        });
    }

    #[tokio::test]
    async fn forward_skips_excepted_connection() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a) = handle("a");
        let (b, mut rx_b) = handle("b");
        logged_in(&a, 1);
        logged_in(&b, 1);
        registry.login_connection(1, Arc::clone(&a)).await;
        registry.login_connection(1, Arc::clone(&b)).await;

        registry
            .forward(1, "message", &serde_json::json!({"id": 5}), Some("a"))
            .await;

        assert!(rx_a.try_recv().is_err());
        let frame: Frame = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(frame.kind, "message");
        assert_eq!(frame.data["id"], 5);
    }

    #[tokio::test]
    async fn force_logout_flips_state_and_notifies() {
        let registry = SessionRegistry::new();
        let (a, mut rx_a) = handle("a");
        let (b, mut rx_b) = handle("b");
        logged_in(&a, 1);
        logged_in(&b, 1);
        registry.login_connection(1, Arc::clone(&a)).await;
        registry.login_connection(1, Arc::clone(&b)).await;

        registry.force_logout(1, Some("a")).await;

        assert!(matches!(b.state(), LoginState::LoggedOut));
        let frame: Frame = serde_json::from_str(&rx_b.try_recv().unwrap()).unwrap();
        assert_eq!(frame.kind, "logout");
        // The excepted session keeps its state and gets nothing.
        assert!(matches!(a.state(), LoginState::LoggedIn { .. }));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(registry.session_count(1).await, 1);
    }

    #[tokio::test]
    async fn logout_connection_drops_empty_entries() {
        let registry = SessionRegistry::new();
        let (a, _rx) = handle("a");
        logged_in(&a, 1);
        registry.login_connection(1, Arc::clone(&a)).await;
        registry.logout_connection(1, "a").await;
        assert_eq!(registry.session_count(1).await, 0);
    }

    #[tokio::test]
    async fn send_to_closed_connection_is_dropped() {
        let (a, rx) = handle("a");
        drop(rx);
        assert!(!a.send(&Frame::push("logout", serde_json::json!({}))));
    }
}
