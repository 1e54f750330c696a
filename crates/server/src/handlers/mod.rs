//! Authenticated request handlers, grouped by area.

pub mod account;
pub mod chat;
pub mod event;
pub mod file;
pub mod group;
pub mod invite;
pub mod poll;
pub mod task;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use serde_json::Value;

use comcore_store::{GroupId, ModuleId, ModuleType, Role, Store, UserId};

use crate::{RequestError, Result, sessions::ConnHandle, state::ServerState};

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Per-request context for an authenticated handler.
pub struct Ctx<'a> {
    pub state: &'a Arc<ServerState>,
    pub conn: &'a Arc<ConnHandle>,
    pub user_id: UserId,
}

impl Ctx<'_> {
    pub fn store(&self) -> &dyn Store {
        self.state.store.as_ref()
    }

    pub async fn require_member(&self, group: GroupId) -> Result<()> {
        Ok(self.store().check_user_in_group(self.user_id, group).await?)
    }

    /// The actor's role in `group`, failing below `min`.
    pub async fn require_role(&self, group: GroupId, min: Role) -> Result<Role> {
        let role = self.store().get_role(group, self.user_id).await?;
        if role < min {
            return Err(RequestError::invalid("insufficient permissions"));
        }
        Ok(role)
    }

    /// Modifying another member requires strictly more authority than they
    /// hold, and members never modify themselves.
    pub async fn require_outranks(&self, group: GroupId, target: UserId) -> Result<()> {
        if target == self.user_id {
            return Err(RequestError::invalid("cannot modify yourself"));
        }
        let actor = self.store().get_role(group, self.user_id).await?;
        let target = self.store().get_role(group, target).await?;
        if actor <= target {
            return Err(RequestError::invalid("insufficient permissions"));
        }
        Ok(())
    }

    pub async fn require_not_muted(&self, group: GroupId) -> Result<()> {
        if self.store().get_muted(group, self.user_id).await? {
            return Err(RequestError::invalid("user is muted"));
        }
        Ok(())
    }

    /// Membership plus module existence/type/enabled in one check.
    pub async fn require_module(
        &self,
        kind: ModuleType,
        module: ModuleId,
        group: GroupId,
    ) -> Result<()> {
        self.require_member(group).await?;
        Ok(self.store().check_module_in_group(kind, module, group).await?)
    }

    /// Push to every member of `group` except this connection.
    pub async fn push_group(&self, group: GroupId, event: &str, data: Value) {
        self.state
            .sessions
            .forward_group(self.store(), group, event, &data, Some(&self.conn.conn_id))
            .await;
    }

    /// Push to every session of `user`.
    pub async fn push_user(&self, user: UserId, event: &str, data: Value) {
        self.state.sessions.forward(user, event, &data, None).await;
    }
}
