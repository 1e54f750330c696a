//! Domain entities shared by the store and the protocol engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type GroupId = i64;
pub type ModuleId = i64;
/// Per-module sequential item id; dense on creation, never reused.
pub type ItemId = i64;

// ── Accounts ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub two_factor_enabled: bool,
    /// Rotated on every successful `login`; `connect` must present it.
    pub auth_token: Option<String>,
}

// ── Roles ────────────────────────────────────────────────────────────────────

/// Group roles, totally ordered. Variant order is the authority order, so
/// the derived `Ord` is the `owner > moderator > user` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "moderator" => Some(Self::Moderator),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

// ── Groups ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub role: Role,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<GroupMember>,
    pub require_approval: bool,
    /// Two-member private conversation created by `createDirectMessage`.
    pub direct: bool,
    pub modules: Vec<ModuleId>,
    pub modified_at: i64,
}

/// Lightweight listing entry for `getGroups`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    pub direct: bool,
}

/// Member entry as shown to other members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub muted: bool,
}

/// Full group detail for `getGroupInfo`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: GroupId,
    pub name: String,
    pub require_approval: bool,
    pub direct: bool,
    pub members: Vec<MemberInfo>,
    pub modules: Vec<Module>,
    pub modified_at: i64,
}

// ── Modules ──────────────────────────────────────────────────────────────────

/// Module type; decides which item collection the module carries. Unknown
/// strings are accepted as custom module types holding no items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModuleType {
    Chat,
    Task,
    Cal,
    Poll,
    Custom(String),
}

impl ModuleType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Chat => "chat",
            Self::Task => "task",
            Self::Cal => "cal",
            Self::Poll => "poll",
            Self::Custom(s) => s,
        }
    }
}

impl From<String> for ModuleType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "chat" => Self::Chat,
            "task" => Self::Task,
            "cal" => Self::Cal,
            "poll" => Self::Poll,
            _ => Self::Custom(s),
        }
    }
}

impl From<ModuleType> for String {
    fn from(t: ModuleType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: ModuleId,
    pub group_id: GroupId,
    #[serde(rename = "type")]
    pub kind: ModuleType,
    pub name: String,
    pub enabled: bool,
    pub modified_at: i64,
}

// ── Chat items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub reaction: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: ItemId,
    pub sender: UserId,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub contents: String,
    /// Internal tombstone marker, never serialized; on the wire a deleted
    /// message is the one with empty `contents` (live messages reject
    /// empty contents).
    #[serde(skip)]
    pub deleted: bool,
    pub reactions: Vec<Reaction>,
}

// ── Task items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: ItemId,
    pub creator: UserId,
    pub description: String,
    /// Milliseconds since the Unix epoch; 0 means no deadline.
    pub deadline: i64,
    pub done: bool,
}

// ── Calendar items ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: ItemId,
    pub creator: UserId,
    pub description: String,
    pub start: i64,
    pub end: i64,
    pub approved: bool,
    pub bulletin: bool,
}

/// What `approveEvent` did; decides which push the dispatcher emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApproveOutcome {
    Approved(ItemId),
    Deleted(ItemId),
    /// Already approved; approve=false is a no-op there.
    Unchanged,
}

// ── Poll items ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: ItemId,
    pub creator: UserId,
    pub description: String,
    pub options: Vec<String>,
    pub votes: HashMap<UserId, usize>,
}

impl Poll {
    /// Vote counts per option, in option order.
    pub fn tallies(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.options.len()];
        for &opt in self.votes.values() {
            if let Some(c) = counts.get_mut(opt) {
                *c += 1;
            }
        }
        counts
    }
}

// ── Invites ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub group_name: String,
    pub inviter_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteLink {
    pub code: String,
    pub group_id: GroupId,
    /// Milliseconds since the Unix epoch; 0 means never expires.
    pub expire_at: i64,
}
