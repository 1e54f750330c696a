//! Comcore wire protocol definitions.
//!
//! All communication is newline-delimited UTF-8 JSON over one TLS stream.
//!
//! Frame types:
//! - `RequestFrame` — client → server request
//! - `Frame`        — server → client reply (`REPLY`/`ERROR`) or push event
//!
//! A connection carries at most one in-flight request; the reply to a
//! request is always the next `REPLY` or `ERROR` frame the client sees,
//! though push events may interleave.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Hard cap on a single inbound line, in bytes.
pub const MAX_LINE_BYTES: usize = 262_144; // 256 KB
/// Digits in an emailed confirmation code.
pub const CODE_DIGITS: usize = 6;
/// Confirmation code lifetime in milliseconds.
pub const CODE_LIFETIME_MS: u64 = 3_600_000; // 1 h
/// Wrong guesses allowed before a confirmation code is discarded.
pub const CODE_MAX_FAILS: u32 = 3;
/// Grace period accepted past an invite link's expiry, in milliseconds.
pub const INVITE_GRACE_MS: u64 = 30_000; // 30 s
/// Minimum invite link lifetime, in milliseconds.
pub const INVITE_MIN_TTL_MS: u64 = 120_000; // 2 min
/// Characters in a human-readable invite code.
pub const INVITE_CODE_LEN: usize = 10;
/// Most messages a single `getMessages` reply may carry.
pub const MESSAGE_PAGE_LIMIT: usize = 50;
/// Largest accepted decoded upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10 MB

// ── Reply kinds ──────────────────────────────────────────────────────────────

pub const KIND_REPLY: &str = "REPLY";
pub const KIND_ERROR: &str = "ERROR";

// ── Request kinds ────────────────────────────────────────────────────────────

/// Names of every request the server understands. Unknown kinds get an
/// `ERROR` reply without touching the login state.
pub mod kinds {
    pub const PING: &str = "PING";
    pub const LOGIN: &str = "login";
    pub const CONNECT: &str = "connect";
    pub const LOGOUT: &str = "logout";
    pub const CREATE_ACCOUNT: &str = "createAccount";
    pub const REQUEST_RESET: &str = "requestReset";
    pub const ENTER_CODE: &str = "enterCode";
    pub const FINISH_RESET: &str = "finishReset";

    pub const GET_TWO_FACTOR: &str = "getTwoFactor";
    pub const SET_TWO_FACTOR: &str = "setTwoFactor";

    pub const CREATE_GROUP: &str = "createGroup";
    pub const CREATE_SUB_GROUP: &str = "createSubGroup";
    pub const GET_GROUPS: &str = "getGroups";
    pub const GET_GROUP_INFO: &str = "getGroupInfo";
    pub const LEAVE_GROUP: &str = "leaveGroup";
    pub const SET_REQUIRE_APPROVAL: &str = "setRequireApproval";

    pub const GET_USERS: &str = "getUsers";
    pub const GET_USER_INFO: &str = "getUserInfo";
    pub const KICK: &str = "kick";
    pub const SET_ROLE: &str = "setRole";
    pub const SET_MUTED: &str = "setMuted";

    pub const CREATE_MODULE: &str = "createModule";
    pub const GET_MODULES: &str = "getModules";
    pub const GET_MODULE_INFO: &str = "getModuleInfo";
    pub const SET_MODULE_ENABLED: &str = "setModuleEnabled";

    pub const CREATE_INVITE_LINK: &str = "createInviteLink";
    pub const CHECK_INVITE_LINK: &str = "checkInviteLink";
    pub const USE_INVITE_LINK: &str = "useInviteLink";
    pub const SEND_INVITE: &str = "sendInvite";
    pub const GET_INVITES: &str = "getInvites";
    pub const REPLY_TO_INVITE: &str = "replyToInvite";
    pub const CREATE_DIRECT_MESSAGE: &str = "createDirectMessage";

    pub const SEND_MESSAGE: &str = "sendMessage";
    pub const GET_MESSAGES: &str = "getMessages";
    pub const UPDATE_MESSAGE: &str = "updateMessage";
    pub const SET_REACTION: &str = "setReaction";

    pub const ADD_TASK: &str = "addTask";
    pub const GET_TASKS: &str = "getTasks";
    pub const UPDATE_TASK_STATUS: &str = "updateTaskStatus";
    pub const UPDATE_TASK_DEADLINE: &str = "updateTaskDeadline";
    pub const DELETE_TASK: &str = "deleteTask";

    pub const ADD_EVENT: &str = "addEvent";
    pub const GET_EVENTS: &str = "getEvents";
    pub const APPROVE_EVENT: &str = "approveEvent";
    pub const UPDATE_EVENT: &str = "updateEvent";
    pub const DELETE_EVENT: &str = "deleteEvent";
    pub const SET_BULLETIN: &str = "setBulletin";

    pub const ADD_POLL: &str = "addPoll";
    pub const GET_POLLS: &str = "getPolls";
    pub const VOTE_ON_POLL: &str = "voteOnPoll";

    pub const UPLOAD_FILE: &str = "uploadFile";
}

/// Requests that force a logout transition before they are handled, in any
/// login state.
pub const LOGOUT_FIRST: &[&str] = &[
    kinds::LOGIN,
    kinds::CREATE_ACCOUNT,
    kinds::REQUEST_RESET,
    kinds::LOGOUT,
];

// ── Push events ──────────────────────────────────────────────────────────────

pub mod events {
    pub const LOGIN: &str = "login";
    pub const LOGOUT: &str = "logout";
    pub const END: &str = "end";
    pub const INVITE: &str = "invite";
    pub const DM: &str = "dm";
    pub const KICKED: &str = "kicked";
    pub const ROLE_CHANGED: &str = "roleChanged";
    pub const MUTED_CHANGED: &str = "mutedChanged";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_UPDATED: &str = "messageUpdated";
    pub const REACTION: &str = "reaction";
    pub const TASK: &str = "task";
    pub const TASK_UPDATED: &str = "taskUpdated";
    pub const TASK_DELETED: &str = "taskDeleted";
    pub const EVENT: &str = "event";
    pub const EVENT_UPDATED: &str = "eventUpdated";
    pub const EVENT_DELETED: &str = "eventDeleted";
    pub const EVENT_APPROVED: &str = "eventApproved";
    pub const SET_BULLETIN: &str = "setBulletin";
    pub const POLL: &str = "poll";
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → server request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Server → client frame: a reply, an error, or a push event. The `kind`
/// distinguishes the three; replies and errors are always in lockstep with
/// the client's own requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub kind: String,
    pub data: serde_json::Value,
}

impl Frame {
    pub fn reply(data: serde_json::Value) -> Self {
        Self {
            kind: KIND_REPLY.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: KIND_ERROR.into(),
            data: serde_json::json!({ "message": message.into() }),
        }
    }

    pub fn push(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: event.into(),
            data,
        }
    }
}

// ── Login status ─────────────────────────────────────────────────────────────

/// Status codes returned by the `login` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginStatus {
    Success,
    EnterCode,
    DoesNotExist,
    InvalidPassword,
}

// ── Confirmation code kinds ──────────────────────────────────────────────────

/// What an emailed confirmation code authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeKind {
    NewAccount,
    TwoFactor,
    ResetPassword,
}

impl CodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewAccount => "newAccount",
            Self::TwoFactor => "twoFactor",
            Self::ResetPassword => "resetPassword",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_default_data() {
        let req: RequestFrame = serde_json::from_str(r#"{"kind":"PING"}"#).unwrap();
        assert_eq!(req.kind, "PING");
        assert!(req.data.is_null());
    }

    #[test]
    fn reply_frame_shape() {
        let frame = Frame::reply(serde_json::json!({ "id": 7 }));
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"kind":"REPLY","data":{"id":7}}"#);
    }

    #[test]
    fn error_frame_shape() {
        let frame = Frame::error("unknown request");
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"kind":"ERROR","data":{"message":"unknown request"}}"#);
    }

    #[test]
    fn login_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&LoginStatus::EnterCode).unwrap(),
            r#""ENTER_CODE""#
        );
        assert_eq!(
            serde_json::to_string(&LoginStatus::DoesNotExist).unwrap(),
            r#""DOES_NOT_EXIST""#
        );
    }

    #[test]
    fn code_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&CodeKind::ResetPassword).unwrap(),
            r#""resetPassword""#
        );
        assert_eq!(CodeKind::TwoFactor.as_str(), "twoFactor");
    }

    #[test]
    fn logout_first_covers_reauth_kinds() {
        for kind in [kinds::LOGIN, kinds::CREATE_ACCOUNT, kinds::REQUEST_RESET, kinds::LOGOUT] {
            assert!(LOGOUT_FIRST.contains(&kind));
        }
        assert!(!LOGOUT_FIRST.contains(&kinds::ENTER_CODE));
    }
}
