//! The persistence contract.

use async_trait::async_trait;

use crate::{
    ApproveOutcome, Account, Event, GroupId, GroupInfo, GroupSummary, Invite, InviteLink, ItemId,
    MemberInfo, Message, Module, ModuleId, ModuleType, Poll, Reaction, Result, Role, Task, UserId,
};

/// Asynchronous document store behind the protocol engine.
///
/// Every operation validates its own preconditions (existence, membership,
/// module type) and fails with [`crate::Error::Invalid`] when they do not
/// hold; the dispatcher surfaces those as `ERROR` frames. Implementations
/// must be safe for concurrent use.
#[async_trait]
pub trait Store: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    // ── Accounts ─────────────────────────────────────────────────────────

    async fn lookup_account(&self, email: &str) -> Result<Option<Account>>;
    /// Fails with [`crate::Error::Duplicate`] when the email is taken.
    async fn create_account(&self, name: &str, email: &str, hash: &str) -> Result<Account>;
    async fn reset_password(&self, user: UserId, hash: &str) -> Result<()>;
    async fn get_two_factor(&self, user: UserId) -> Result<bool>;
    async fn set_two_factor(&self, user: UserId, enabled: bool) -> Result<()>;
    async fn get_auth_token(&self, user: UserId) -> Result<Option<String>>;
    async fn set_auth_token(&self, user: UserId, token: &str) -> Result<()>;
    async fn get_user_name(&self, user: UserId) -> Result<String>;

    // ── Groups & membership ──────────────────────────────────────────────

    async fn create_group(&self, owner: UserId, name: &str) -> Result<GroupId>;
    /// New group under the same owner, inheriting `require_approval` from
    /// the parent and seeded with `users` (members of the parent).
    async fn create_sub_group(
        &self,
        owner: UserId,
        parent: GroupId,
        name: &str,
        users: &[UserId],
    ) -> Result<GroupId>;
    /// Two-member private group. Returns the existing group when the pair
    /// already has one; the flag is true when a group was created.
    async fn create_direct_message(&self, a: UserId, b: UserId) -> Result<(GroupId, bool)>;
    async fn get_groups(&self, user: UserId) -> Result<Vec<GroupSummary>>;
    /// Full detail for the requested groups the user belongs to, skipping
    /// groups not modified since `last_refresh`.
    async fn get_group_info(
        &self,
        user: UserId,
        groups: &[GroupId],
        last_refresh: i64,
    ) -> Result<Vec<GroupInfo>>;
    async fn get_group_name(&self, group: GroupId) -> Result<String>;
    async fn check_user_in_group(&self, user: UserId, group: GroupId) -> Result<()>;
    async fn get_role(&self, group: GroupId, user: UserId) -> Result<Role>;
    async fn get_muted(&self, group: GroupId, user: UserId) -> Result<bool>;
    async fn get_users(&self, group: GroupId) -> Result<Vec<UserId>>;
    async fn get_user_info(&self, group: GroupId, user: UserId) -> Result<MemberInfo>;
    async fn get_require_approval(&self, group: GroupId) -> Result<bool>;
    async fn set_require_approval(&self, group: GroupId, require: bool) -> Result<()>;
    async fn join_group(&self, user: UserId, group: GroupId) -> Result<()>;
    /// Removes the member. When the leaver was the last member the group,
    /// its modules, items, invites, and invite links are deleted in the
    /// same operation; returns true in that case.
    async fn leave_group(&self, user: UserId, group: GroupId) -> Result<bool>;
    async fn kick(&self, group: GroupId, target: UserId) -> Result<()>;
    /// Assigns `role` to `target`. Granting `owner` demotes the previous
    /// owner to moderator in the same operation and returns their id; the
    /// dispatcher only lets the current owner grant `owner`, so the
    /// demoted member is the actor.
    async fn set_role(&self, group: GroupId, target: UserId, role: Role)
    -> Result<Option<UserId>>;
    async fn set_muted(&self, group: GroupId, target: UserId, muted: bool) -> Result<()>;

    // ── Invites ──────────────────────────────────────────────────────────

    /// At most one invite per (user, group); returns false when one was
    /// already pending.
    async fn send_invite(&self, invite: Invite) -> Result<bool>;
    async fn get_invites(&self, user: UserId) -> Result<Vec<Invite>>;
    async fn reply_to_invite(&self, user: UserId, group: GroupId, accept: bool) -> Result<()>;
    async fn add_group_invite_code(
        &self,
        group: GroupId,
        code: &str,
        expire_at: i64,
    ) -> Result<()>;
    async fn check_invite_code(&self, code: &str) -> Result<Option<InviteLink>>;

    // ── Modules ──────────────────────────────────────────────────────────

    async fn create_module(
        &self,
        group: GroupId,
        name: &str,
        kind: ModuleType,
    ) -> Result<ModuleId>;
    async fn get_modules(&self, group: GroupId) -> Result<Vec<ModuleId>>;
    async fn get_module_info(&self, group: GroupId, modules: &[ModuleId]) -> Result<Vec<Module>>;
    async fn set_module_enabled(&self, group: GroupId, module: ModuleId, enabled: bool)
    -> Result<()>;
    /// Fails unless `module` exists, belongs to `group`, has type `kind`,
    /// and is enabled.
    async fn check_module_in_group(
        &self,
        kind: ModuleType,
        module: ModuleId,
        group: GroupId,
    ) -> Result<()>;

    // ── Messages ─────────────────────────────────────────────────────────

    /// Appends a message, assigning the module's next sequential id.
    async fn send_message(
        &self,
        module: ModuleId,
        sender: UserId,
        contents: &str,
        timestamp: i64,
    ) -> Result<Message>;
    /// Messages with `after < id < before`, ascending, at most `limit` and
    /// preferring the most recent.
    async fn get_messages(
        &self,
        module: ModuleId,
        after: ItemId,
        before: ItemId,
        limit: usize,
    ) -> Result<Vec<Message>>;
    /// `None` contents deletes the message. Fails on already-deleted.
    async fn edit_message(
        &self,
        module: ModuleId,
        id: ItemId,
        contents: Option<&str>,
    ) -> Result<Message>;
    async fn get_message_sender(&self, module: ModuleId, id: ItemId) -> Result<UserId>;
    async fn get_reactions(&self, module: ModuleId, id: ItemId) -> Result<Vec<Reaction>>;
    /// One reaction per user per message; `None` removes the user's.
    async fn set_reaction(
        &self,
        module: ModuleId,
        id: ItemId,
        user: UserId,
        reaction: Option<&str>,
    ) -> Result<Vec<Reaction>>;

    // ── Tasks ────────────────────────────────────────────────────────────

    async fn create_task(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        deadline: i64,
    ) -> Result<Task>;
    async fn get_tasks(&self, module: ModuleId) -> Result<Vec<Task>>;
    async fn update_task_status(&self, module: ModuleId, id: ItemId, done: bool) -> Result<Task>;
    async fn update_task_deadline(
        &self,
        module: ModuleId,
        id: ItemId,
        deadline: i64,
    ) -> Result<Task>;
    async fn delete_task(&self, module: ModuleId, id: ItemId) -> Result<()>;

    // ── Calendar ─────────────────────────────────────────────────────────

    async fn create_event(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        start: i64,
        end: i64,
        approved: bool,
    ) -> Result<Event>;
    async fn get_events(&self, module: ModuleId) -> Result<Vec<Event>>;
    /// approve=true approves an unapproved event; approve=false deletes an
    /// unapproved event and is a no-op on an approved one.
    async fn approve_event(
        &self,
        module: ModuleId,
        id: ItemId,
        approve: bool,
    ) -> Result<ApproveOutcome>;
    async fn edit_event(
        &self,
        module: ModuleId,
        id: ItemId,
        description: &str,
        start: i64,
        end: i64,
    ) -> Result<Event>;
    async fn delete_event(&self, module: ModuleId, id: ItemId) -> Result<()>;
    /// Marks `id` as the calendar's bulletin entry; `None` clears it.
    async fn set_bulletin_event(&self, module: ModuleId, id: Option<ItemId>) -> Result<()>;

    // ── Polls ────────────────────────────────────────────────────────────

    async fn create_poll(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        options: &[String],
    ) -> Result<Poll>;
    async fn get_polls(&self, module: ModuleId) -> Result<Vec<Poll>>;
    async fn vote(&self, module: ModuleId, id: ItemId, user: UserId, option: usize) -> Result<()>;
}
