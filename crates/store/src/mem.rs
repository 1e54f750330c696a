//! In-process [`Store`] implementation.
//!
//! One `RwLock` guards the whole document tree, so every trait operation is
//! atomic as observed by the protocol engine. This is the implementation
//! used by tests and standalone runs; a database-backed store implements
//! the same trait.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{
    ApproveOutcome, Account, Error, Event, Group, GroupId, GroupInfo, GroupMember, GroupSummary,
    Invite, InviteLink, ItemId, MemberInfo, Message, Module, ModuleId, ModuleType, Poll, Reaction,
    Result, Role, Store, Task, UserId,
};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ── Internal shape ───────────────────────────────────────────────────────────

/// Item collection of one module. The variant is fixed at module creation;
/// custom modules carry no items.
enum Items {
    Chat {
        messages: Vec<Message>,
        next_id: ItemId,
    },
    Tasks {
        tasks: Vec<Task>,
        next_id: ItemId,
    },
    Cal {
        events: Vec<Event>,
        next_id: ItemId,
    },
    Polls {
        polls: Vec<Poll>,
        next_id: ItemId,
    },
    None,
}

impl Items {
    fn for_type(kind: &ModuleType) -> Self {
        match kind {
            ModuleType::Chat => Self::Chat {
                messages: Vec::new(),
                next_id: 1,
            },
            ModuleType::Task => Self::Tasks {
                tasks: Vec::new(),
                next_id: 1,
            },
            ModuleType::Cal => Self::Cal {
                events: Vec::new(),
                next_id: 1,
            },
            ModuleType::Poll => Self::Polls {
                polls: Vec::new(),
                next_id: 1,
            },
            ModuleType::Custom(_) => Self::None,
        }
    }
}

struct ModuleRecord {
    module: Module,
    items: Items,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Account>,
    by_email: HashMap<String, UserId>,
    groups: HashMap<GroupId, Group>,
    modules: HashMap<ModuleId, ModuleRecord>,
    invites: Vec<Invite>,
    links: HashMap<String, InviteLink>,
    next_user: UserId,
    next_group: GroupId,
    next_module: ModuleId,
}

impl Inner {
    fn account(&self, user: UserId) -> Result<&Account> {
        self.accounts
            .get(&user)
            .ok_or_else(|| Error::invalid("no such user"))
    }

    fn account_mut(&mut self, user: UserId) -> Result<&mut Account> {
        self.accounts
            .get_mut(&user)
            .ok_or_else(|| Error::invalid("no such user"))
    }

    fn group(&self, group: GroupId) -> Result<&Group> {
        self.groups
            .get(&group)
            .ok_or_else(|| Error::invalid("no such group"))
    }

    fn group_mut(&mut self, group: GroupId) -> Result<&mut Group> {
        self.groups
            .get_mut(&group)
            .ok_or_else(|| Error::invalid("no such group"))
    }

    fn member(&self, group: GroupId, user: UserId) -> Result<&GroupMember> {
        self.group(group)?
            .members
            .iter()
            .find(|m| m.user_id == user)
            .ok_or_else(|| Error::invalid("not a member of this group"))
    }

    fn module(&self, module: ModuleId) -> Result<&ModuleRecord> {
        self.modules
            .get(&module)
            .ok_or_else(|| Error::invalid("no such module"))
    }

    fn module_mut(&mut self, module: ModuleId) -> Result<&mut ModuleRecord> {
        self.modules
            .get_mut(&module)
            .ok_or_else(|| Error::invalid("no such module"))
    }

    fn touch_group(&mut self, group: GroupId) {
        let now = now_ms();
        if let Some(g) = self.groups.get_mut(&group) {
            g.modified_at = now;
        }
    }

    fn insert_group(&mut self, mut group: Group) -> GroupId {
        self.next_group += 1;
        group.id = self.next_group;
        group.modified_at = now_ms();
        let id = group.id;
        self.groups.insert(id, group);
        id
    }

    fn insert_module(&mut self, group: GroupId, name: &str, kind: ModuleType) -> ModuleId {
        self.next_module += 1;
        let id = self.next_module;
        let items = Items::for_type(&kind);
        self.modules.insert(id, ModuleRecord {
            module: Module {
                id,
                group_id: group,
                kind,
                name: name.to_string(),
                enabled: true,
                modified_at: now_ms(),
            },
            items,
        });
        if let Some(g) = self.groups.get_mut(&group) {
            g.modules.push(id);
        }
        self.touch_group(group);
        id
    }

    /// Remove a group together with its modules, items, invites, and links.
    fn delete_group_cascade(&mut self, group: GroupId) {
        if let Some(g) = self.groups.remove(&group) {
            for m in g.modules {
                self.modules.remove(&m);
            }
        }
        self.invites.retain(|i| i.group_id != group);
        self.links.retain(|_, l| l.group_id != group);
    }

    fn member_info(&self, m: &GroupMember) -> MemberInfo {
        MemberInfo {
            id: m.user_id,
            name: self
                .accounts
                .get(&m.user_id)
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            role: m.role,
            muted: m.muted,
        }
    }
}

// ── Store implementation ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    // ── Accounts ─────────────────────────────────────────────────────────

    async fn lookup_account(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn create_account(&self, name: &str, email: &str, hash: &str) -> Result<Account> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(email) {
            return Err(Error::Duplicate);
        }
        inner.next_user += 1;
        let account = Account {
            id: inner.next_user,
            email: email.to_string(),
            name: name.to_string(),
            password_hash: hash.to_string(),
            two_factor_enabled: false,
            auth_token: None,
        };
        inner.by_email.insert(email.to_string(), account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn reset_password(&self, user: UserId, hash: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.account_mut(user)?.password_hash = hash.to_string();
        Ok(())
    }

    async fn get_two_factor(&self, user: UserId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.account(user)?.two_factor_enabled)
    }

    async fn set_two_factor(&self, user: UserId, enabled: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.account_mut(user)?.two_factor_enabled = enabled;
        Ok(())
    }

    async fn get_auth_token(&self, user: UserId) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.account(user)?.auth_token.clone())
    }

    async fn set_auth_token(&self, user: UserId, token: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.account_mut(user)?.auth_token = Some(token.to_string());
        Ok(())
    }

    async fn get_user_name(&self, user: UserId) -> Result<String> {
        let inner = self.inner.read().await;
        Ok(inner.account(user)?.name.clone())
    }

    // ── Groups & membership ──────────────────────────────────────────────

    async fn create_group(&self, owner: UserId, name: &str) -> Result<GroupId> {
        let mut inner = self.inner.write().await;
        inner.account(owner)?;
        Ok(inner.insert_group(Group {
            id: 0,
            name: name.to_string(),
            members: vec![GroupMember {
                user_id: owner,
                role: Role::Owner,
                muted: false,
            }],
            require_approval: false,
            direct: false,
            modules: Vec::new(),
            modified_at: 0,
        }))
    }

    async fn create_sub_group(
        &self,
        owner: UserId,
        parent: GroupId,
        name: &str,
        users: &[UserId],
    ) -> Result<GroupId> {
        let mut inner = self.inner.write().await;
        let parent_group = inner.group(parent)?;
        let require_approval = parent_group.require_approval;
        for u in users {
            if !parent_group.members.iter().any(|m| m.user_id == *u) {
                return Err(Error::invalid("user is not a member of the parent group"));
            }
        }
        let mut members = vec![GroupMember {
            user_id: owner,
            role: Role::Owner,
            muted: false,
        }];
        for u in users {
            if *u != owner {
                members.push(GroupMember {
                    user_id: *u,
                    role: Role::User,
                    muted: false,
                });
            }
        }
        Ok(inner.insert_group(Group {
            id: 0,
            name: name.to_string(),
            members,
            require_approval,
            direct: false,
            modules: Vec::new(),
            modified_at: 0,
        }))
    }

    async fn create_direct_message(&self, a: UserId, b: UserId) -> Result<(GroupId, bool)> {
        let mut inner = self.inner.write().await;
        inner.account(a)?;
        inner.account(b)?;
        if a == b {
            return Err(Error::invalid("cannot message yourself"));
        }
        let existing = inner.groups.values().find(|g| {
            g.direct
                && g.members.len() == 2
                && g.members.iter().any(|m| m.user_id == a)
                && g.members.iter().any(|m| m.user_id == b)
        });
        if let Some(g) = existing {
            return Ok((g.id, false));
        }
        let id = inner.insert_group(Group {
            id: 0,
            name: String::new(),
            members: vec![
                GroupMember {
                    user_id: a,
                    role: Role::Owner,
                    muted: false,
                },
                GroupMember {
                    user_id: b,
                    role: Role::User,
                    muted: false,
                },
            ],
            require_approval: false,
            direct: true,
            modules: Vec::new(),
            modified_at: 0,
        });
        inner.insert_module(id, "chat", ModuleType::Chat);
        Ok((id, true))
    }

    async fn get_groups(&self, user: UserId) -> Result<Vec<GroupSummary>> {
        let inner = self.inner.read().await;
        let mut out: Vec<GroupSummary> = inner
            .groups
            .values()
            .filter(|g| g.members.iter().any(|m| m.user_id == user))
            .map(|g| GroupSummary {
                id: g.id,
                name: g.name.clone(),
                direct: g.direct,
            })
            .collect();
        out.sort_by_key(|g| g.id);
        Ok(out)
    }

    async fn get_group_info(
        &self,
        user: UserId,
        groups: &[GroupId],
        last_refresh: i64,
    ) -> Result<Vec<GroupInfo>> {
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for id in groups {
            let Some(g) = inner.groups.get(id) else {
                continue;
            };
            if !g.members.iter().any(|m| m.user_id == user) {
                continue;
            }
            if g.modified_at <= last_refresh {
                continue;
            }
            let modules = g
                .modules
                .iter()
                .filter_map(|m| inner.modules.get(m))
                .map(|r| r.module.clone())
                .collect();
            out.push(GroupInfo {
                id: g.id,
                name: g.name.clone(),
                require_approval: g.require_approval,
                direct: g.direct,
                members: g.members.iter().map(|m| inner.member_info(m)).collect(),
                modules,
                modified_at: g.modified_at,
            });
        }
        Ok(out)
    }

    async fn get_group_name(&self, group: GroupId) -> Result<String> {
        let inner = self.inner.read().await;
        Ok(inner.group(group)?.name.clone())
    }

    async fn check_user_in_group(&self, user: UserId, group: GroupId) -> Result<()> {
        let inner = self.inner.read().await;
        inner.member(group, user).map(|_| ())
    }

    async fn get_role(&self, group: GroupId, user: UserId) -> Result<Role> {
        let inner = self.inner.read().await;
        Ok(inner.member(group, user)?.role)
    }

    async fn get_muted(&self, group: GroupId, user: UserId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.member(group, user)?.muted)
    }

    async fn get_users(&self, group: GroupId) -> Result<Vec<UserId>> {
        let inner = self.inner.read().await;
        Ok(inner.group(group)?.members.iter().map(|m| m.user_id).collect())
    }

    async fn get_user_info(&self, group: GroupId, user: UserId) -> Result<MemberInfo> {
        let inner = self.inner.read().await;
        let member = inner.member(group, user)?;
        Ok(inner.member_info(member))
    }

    async fn get_require_approval(&self, group: GroupId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.group(group)?.require_approval)
    }

    async fn set_require_approval(&self, group: GroupId, require: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.group_mut(group)?.require_approval = require;
        inner.touch_group(group);
        Ok(())
    }

    async fn join_group(&self, user: UserId, group: GroupId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.account(user)?;
        let g = inner.group_mut(group)?;
        if g.members.iter().any(|m| m.user_id == user) {
            return Ok(());
        }
        g.members.push(GroupMember {
            user_id: user,
            role: Role::User,
            muted: false,
        });
        inner.touch_group(group);
        Ok(())
    }

    async fn leave_group(&self, user: UserId, group: GroupId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let (sole_member, is_owner) = {
            let g = inner.group(group)?;
            let member = g
                .members
                .iter()
                .find(|m| m.user_id == user)
                .ok_or_else(|| Error::invalid("not a member of this group"))?;
            (g.members.len() == 1, member.role == Role::Owner)
        };
        if sole_member {
            inner.delete_group_cascade(group);
            return Ok(true);
        }
        if is_owner {
            return Err(Error::invalid("the owner cannot leave the group"));
        }
        inner.group_mut(group)?.members.retain(|m| m.user_id != user);
        inner.touch_group(group);
        Ok(false)
    }

    async fn kick(&self, group: GroupId, target: UserId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let g = inner.group_mut(group)?;
        if !g.members.iter().any(|m| m.user_id == target) {
            return Err(Error::invalid("not a member of this group"));
        }
        g.members.retain(|m| m.user_id != target);
        inner.touch_group(group);
        Ok(())
    }

    async fn set_role(
        &self,
        group: GroupId,
        target: UserId,
        role: Role,
    ) -> Result<Option<UserId>> {
        let mut inner = self.inner.write().await;
        let g = inner.group_mut(group)?;
        if !g.members.iter().any(|m| m.user_id == target) {
            return Err(Error::invalid("not a member of this group"));
        }
        // Ownership transfer demotes the previous owner in the same write
        // so the single-owner rule holds at every observable point.
        let mut demoted = None;
        if role == Role::Owner {
            for m in g.members.iter_mut() {
                if m.role == Role::Owner && m.user_id != target {
                    m.role = Role::Moderator;
                    demoted = Some(m.user_id);
                }
            }
        }
        for m in g.members.iter_mut() {
            if m.user_id == target {
                m.role = role;
            }
        }
        inner.touch_group(group);
        Ok(demoted)
    }

    async fn set_muted(&self, group: GroupId, target: UserId, muted: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let g = inner.group_mut(group)?;
        let member = g
            .members
            .iter_mut()
            .find(|m| m.user_id == target)
            .ok_or_else(|| Error::invalid("not a member of this group"))?;
        member.muted = muted;
        inner.touch_group(group);
        Ok(())
    }

    // ── Invites ──────────────────────────────────────────────────────────

    async fn send_invite(&self, invite: Invite) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let g = inner.group(invite.group_id)?;
        if g.members.iter().any(|m| m.user_id == invite.user_id) {
            return Err(Error::invalid("user is already a member"));
        }
        if inner
            .invites
            .iter()
            .any(|i| i.user_id == invite.user_id && i.group_id == invite.group_id)
        {
            return Ok(false);
        }
        inner.invites.push(invite);
        Ok(true)
    }

    async fn get_invites(&self, user: UserId) -> Result<Vec<Invite>> {
        let inner = self.inner.read().await;
        Ok(inner
            .invites
            .iter()
            .filter(|i| i.user_id == user)
            .cloned()
            .collect())
    }

    async fn reply_to_invite(&self, user: UserId, group: GroupId, accept: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let idx = inner
            .invites
            .iter()
            .position(|i| i.user_id == user && i.group_id == group)
            .ok_or_else(|| Error::invalid("no such invite"))?;
        inner.invites.remove(idx);
        if accept {
            let g = inner.group_mut(group)?;
            if !g.members.iter().any(|m| m.user_id == user) {
                g.members.push(GroupMember {
                    user_id: user,
                    role: Role::User,
                    muted: false,
                });
            }
            inner.touch_group(group);
        }
        Ok(())
    }

    async fn add_group_invite_code(
        &self,
        group: GroupId,
        code: &str,
        expire_at: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.group(group)?;
        inner.links.insert(code.to_string(), InviteLink {
            code: code.to_string(),
            group_id: group,
            expire_at,
        });
        Ok(())
    }

    async fn check_invite_code(&self, code: &str) -> Result<Option<InviteLink>> {
        let inner = self.inner.read().await;
        Ok(inner.links.get(code).cloned())
    }

    // ── Modules ──────────────────────────────────────────────────────────

    async fn create_module(
        &self,
        group: GroupId,
        name: &str,
        kind: ModuleType,
    ) -> Result<ModuleId> {
        let mut inner = self.inner.write().await;
        inner.group(group)?;
        Ok(inner.insert_module(group, name, kind))
    }

    async fn get_modules(&self, group: GroupId) -> Result<Vec<ModuleId>> {
        let inner = self.inner.read().await;
        Ok(inner.group(group)?.modules.clone())
    }

    async fn get_module_info(&self, group: GroupId, modules: &[ModuleId]) -> Result<Vec<Module>> {
        let inner = self.inner.read().await;
        let g = inner.group(group)?;
        let mut out = Vec::new();
        for id in modules {
            if !g.modules.contains(id) {
                return Err(Error::invalid("module is not in this group"));
            }
            out.push(inner.module(*id)?.module.clone());
        }
        Ok(out)
    }

    async fn set_module_enabled(
        &self,
        group: GroupId,
        module: ModuleId,
        enabled: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        if record.module.group_id != group {
            return Err(Error::invalid("module is not in this group"));
        }
        record.module.enabled = enabled;
        record.module.modified_at = now_ms();
        inner.touch_group(group);
        Ok(())
    }

    async fn check_module_in_group(
        &self,
        kind: ModuleType,
        module: ModuleId,
        group: GroupId,
    ) -> Result<()> {
        let inner = self.inner.read().await;
        let record = inner.module(module)?;
        if record.module.group_id != group {
            return Err(Error::invalid("module is not in this group"));
        }
        if record.module.kind != kind {
            return Err(Error::invalid("wrong module type"));
        }
        if !record.module.enabled {
            return Err(Error::invalid("module is disabled"));
        }
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    async fn send_message(
        &self,
        module: ModuleId,
        sender: UserId,
        contents: &str,
        timestamp: i64,
    ) -> Result<Message> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Chat { messages, next_id } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let message = Message {
            id: *next_id,
            sender,
            timestamp,
            contents: contents.to_string(),
            deleted: false,
            reactions: Vec::new(),
        };
        *next_id += 1;
        messages.push(message.clone());
        inner.touch_group(group);
        Ok(message)
    }

    async fn get_messages(
        &self,
        module: ModuleId,
        after: ItemId,
        before: ItemId,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        let record = inner.module(module)?;
        let Items::Chat { messages, .. } = &record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let matching: Vec<&Message> = messages
            .iter()
            .filter(|m| m.id > after && m.id < before)
            .collect();
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].iter().map(|m| (*m).clone()).collect())
    }

    async fn edit_message(
        &self,
        module: ModuleId,
        id: ItemId,
        contents: Option<&str>,
    ) -> Result<Message> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Chat { messages, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::invalid("no such message"))?;
        if message.deleted {
            return Err(Error::invalid("message has been deleted"));
        }
        match contents {
            Some(text) => message.contents = text.to_string(),
            None => {
                message.deleted = true;
                message.contents = String::new();
            },
        }
        let updated = message.clone();
        inner.touch_group(group);
        Ok(updated)
    }

    async fn get_message_sender(&self, module: ModuleId, id: ItemId) -> Result<UserId> {
        let inner = self.inner.read().await;
        let Items::Chat { messages, .. } = &inner.module(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.sender)
            .ok_or_else(|| Error::invalid("no such message"))
    }

    async fn get_reactions(&self, module: ModuleId, id: ItemId) -> Result<Vec<Reaction>> {
        let inner = self.inner.read().await;
        let Items::Chat { messages, .. } = &inner.module(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.reactions.clone())
            .ok_or_else(|| Error::invalid("no such message"))
    }

    async fn set_reaction(
        &self,
        module: ModuleId,
        id: ItemId,
        user: UserId,
        reaction: Option<&str>,
    ) -> Result<Vec<Reaction>> {
        let mut inner = self.inner.write().await;
        let Items::Chat { messages, .. } = &mut inner.module_mut(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::invalid("no such message"))?;
        if message.deleted {
            return Err(Error::invalid("message has been deleted"));
        }
        message.reactions.retain(|r| r.user_id != user);
        if let Some(reaction) = reaction {
            message.reactions.push(Reaction {
                user_id: user,
                reaction: reaction.to_string(),
            });
        }
        Ok(message.reactions.clone())
    }

    // ── Tasks ────────────────────────────────────────────────────────────

    async fn create_task(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        deadline: i64,
    ) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Tasks { tasks, next_id } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let task = Task {
            id: *next_id,
            creator,
            description: description.to_string(),
            deadline,
            done: false,
        };
        *next_id += 1;
        tasks.push(task.clone());
        inner.touch_group(group);
        Ok(task)
    }

    async fn get_tasks(&self, module: ModuleId) -> Result<Vec<Task>> {
        let inner = self.inner.read().await;
        let Items::Tasks { tasks, .. } = &inner.module(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        Ok(tasks.clone())
    }

    async fn update_task_status(&self, module: ModuleId, id: ItemId, done: bool) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Tasks { tasks, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::invalid("no such task"))?;
        task.done = done;
        let updated = task.clone();
        inner.touch_group(group);
        Ok(updated)
    }

    async fn update_task_deadline(
        &self,
        module: ModuleId,
        id: ItemId,
        deadline: i64,
    ) -> Result<Task> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Tasks { tasks, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::invalid("no such task"))?;
        task.deadline = deadline;
        let updated = task.clone();
        inner.touch_group(group);
        Ok(updated)
    }

    async fn delete_task(&self, module: ModuleId, id: ItemId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Tasks { tasks, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(Error::invalid("no such task"));
        }
        inner.touch_group(group);
        Ok(())
    }

    // ── Calendar ─────────────────────────────────────────────────────────

    async fn create_event(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        start: i64,
        end: i64,
        approved: bool,
    ) -> Result<Event> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Cal { events, next_id } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let event = Event {
            id: *next_id,
            creator,
            description: description.to_string(),
            start,
            end,
            approved,
            bulletin: false,
        };
        *next_id += 1;
        events.push(event.clone());
        inner.touch_group(group);
        Ok(event)
    }

    async fn get_events(&self, module: ModuleId) -> Result<Vec<Event>> {
        let inner = self.inner.read().await;
        let Items::Cal { events, .. } = &inner.module(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        Ok(events.clone())
    }

    async fn approve_event(
        &self,
        module: ModuleId,
        id: ItemId,
        approve: bool,
    ) -> Result<ApproveOutcome> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Cal { events, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let idx = events
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::invalid("no such event"))?;
        if events[idx].approved {
            return Ok(ApproveOutcome::Unchanged);
        }
        let outcome = if approve {
            events[idx].approved = true;
            ApproveOutcome::Approved(id)
        } else {
            events.remove(idx);
            ApproveOutcome::Deleted(id)
        };
        inner.touch_group(group);
        Ok(outcome)
    }

    async fn edit_event(
        &self,
        module: ModuleId,
        id: ItemId,
        description: &str,
        start: i64,
        end: i64,
    ) -> Result<Event> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Cal { events, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::invalid("no such event"))?;
        event.description = description.to_string();
        event.start = start;
        event.end = end;
        let updated = event.clone();
        inner.touch_group(group);
        Ok(updated)
    }

    async fn delete_event(&self, module: ModuleId, id: ItemId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Cal { events, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let before = events.len();
        events.retain(|e| e.id != id);
        if events.len() == before {
            return Err(Error::invalid("no such event"));
        }
        inner.touch_group(group);
        Ok(())
    }

    async fn set_bulletin_event(&self, module: ModuleId, id: Option<ItemId>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Cal { events, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        if let Some(id) = id
            && !events.iter().any(|e| e.id == id)
        {
            return Err(Error::invalid("no such event"));
        }
        for e in events.iter_mut() {
            e.bulletin = Some(e.id) == id;
        }
        inner.touch_group(group);
        Ok(())
    }

    // ── Polls ────────────────────────────────────────────────────────────

    async fn create_poll(
        &self,
        module: ModuleId,
        creator: UserId,
        description: &str,
        options: &[String],
    ) -> Result<Poll> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Polls { polls, next_id } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let poll = Poll {
            id: *next_id,
            creator,
            description: description.to_string(),
            options: options.to_vec(),
            votes: HashMap::new(),
        };
        *next_id += 1;
        polls.push(poll.clone());
        inner.touch_group(group);
        Ok(poll)
    }

    async fn get_polls(&self, module: ModuleId) -> Result<Vec<Poll>> {
        let inner = self.inner.read().await;
        let Items::Polls { polls, .. } = &inner.module(module)?.items else {
            return Err(Error::invalid("wrong module type"));
        };
        Ok(polls.clone())
    }

    async fn vote(&self, module: ModuleId, id: ItemId, user: UserId, option: usize) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.module_mut(module)?;
        let group = record.module.group_id;
        let Items::Polls { polls, .. } = &mut record.items else {
            return Err(Error::invalid("wrong module type"));
        };
        let poll = polls
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::invalid("no such poll"))?;
        if option >= poll.options.len() {
            return Err(Error::invalid("no such option"));
        }
        poll.votes.insert(user, option);
        inner.touch_group(group);
        Ok(())
    }
}
