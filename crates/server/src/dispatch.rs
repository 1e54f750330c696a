//! Request routing.
//!
//! One entry point per received line: parse the frame, route by (login
//! state, kind), emit exactly one `REPLY` or `ERROR`, then any frames the
//! handler queued for after the reply. Errors never kill the connection;
//! `Unauthorized` additionally forces it back to `LoggedOut` with a
//! `logout` push after the error frame.

use std::sync::Arc;

use {
    serde::de::DeserializeOwned,
    serde_json::{Value, json},
    tracing::{debug, error, warn},
};

use comcore_protocol::{Frame, LOGOUT_FIRST, RequestFrame, events, kinds};

use crate::{
    RequestError, Result,
    handlers::{self, Ctx},
    login::{self, LoginState},
    sessions::ConnHandle,
    state::ServerState,
};

// ── Handler outcome ──────────────────────────────────────────────────────────

/// A handler's reply plus any frames to deliver to the same connection
/// right after it (e.g. the `login` push on entering `LoggedIn`).
pub struct Outcome {
    pub reply: Value,
    pub after: Vec<Frame>,
}

impl From<Value> for Outcome {
    fn from(reply: Value) -> Self {
        Self {
            reply,
            after: Vec::new(),
        }
    }
}

/// Deserialize request data, mapping malformed input to a caller-visible
/// error.
pub fn params<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| RequestError::invalid(format!("bad request data: {e}")))
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Handle one complete inbound line through parse, dispatch, and reply.
pub async fn handle_line(state: &Arc<ServerState>, conn: &Arc<ConnHandle>, line: &str) {
    let req: RequestFrame = match serde_json::from_str(line) {
        Ok(req) => req,
        Err(e) => {
            debug!(conn_id = %conn.conn_id, error = %e, "malformed request frame");
            conn.send(&Frame::error("malformed request"));
            return;
        },
    };
    if req.kind.is_empty() {
        conn.send(&Frame::error("missing request kind"));
        return;
    }

    debug!(conn_id = %conn.conn_id, kind = %req.kind, "dispatching request");
    match route(state, conn, &req.kind, req.data).await {
        Ok(outcome) => {
            conn.send(&Frame::reply(outcome.reply));
            for frame in outcome.after {
                conn.send(&frame);
            }
        },
        Err(err @ RequestError::Unauthorized) => {
            warn!(conn_id = %conn.conn_id, kind = %req.kind, "unauthorized request");
            conn.send(&Frame::error(err.client_message()));
            // Drop the connection back to LoggedOut and tell it so.
            if let Some(user_id) = conn.user_id() {
                state
                    .sessions
                    .logout_connection(user_id, &conn.conn_id)
                    .await;
            }
            conn.set_state(LoginState::LoggedOut);
            conn.send(&Frame::push(events::LOGOUT, json!({})));
        },
        Err(err @ RequestError::Invalid { .. }) => {
            debug!(conn_id = %conn.conn_id, kind = %req.kind, error = %err, "request rejected");
            conn.send(&Frame::error(err.client_message()));
        },
        Err(err @ RequestError::Internal { .. }) => {
            error!(conn_id = %conn.conn_id, kind = %req.kind, error = ?err, "internal error");
            conn.send(&Frame::error(err.client_message()));
        },
    }
}

// ── Routing ──────────────────────────────────────────────────────────────────

async fn route(
    state: &Arc<ServerState>,
    conn: &Arc<ConnHandle>,
    kind: &str,
    data: Value,
) -> Result<Outcome> {
    // State-independent requests never touch the login state.
    match kind {
        kinds::PING => return Ok(data.into()),
        kinds::CHECK_INVITE_LINK => {
            return handlers::invite::check_invite_link(state, data)
                .await
                .map(Into::into);
        },
        _ => {},
    }

    // Re-authentication requests force the logout transition first.
    if LOGOUT_FIRST.contains(&kind) {
        if let LoginState::LoggedIn { user_id, .. } = conn.state() {
            state
                .sessions
                .logout_connection(user_id, &conn.conn_id)
                .await;
        }
        conn.set_state(LoginState::LoggedOut);
    }

    match conn.state() {
        LoginState::LoggedOut => match kind {
            kinds::LOGIN => login::login(state, conn, data).await,
            kinds::CONNECT => login::connect(state, conn, data).await,
            kinds::CREATE_ACCOUNT => login::create_account(state, conn, data).await,
            kinds::REQUEST_RESET => login::request_reset(state, conn, data).await,
            kinds::LOGOUT => Ok(json!({}).into()),
            _ => Err(RequestError::Unauthorized),
        },
        LoginState::ConfirmEmail { email, kind: code_kind } => match kind {
            kinds::ENTER_CODE => login::enter_code(state, conn, &email, code_kind, data).await,
            _ => Err(RequestError::Unauthorized),
        },
        LoginState::ResetPassword { user_id } => match kind {
            kinds::FINISH_RESET => login::finish_reset(state, conn, user_id, data).await,
            _ => Err(RequestError::Unauthorized),
        },
        LoginState::LoggedIn { user_id, .. } => {
            let ctx = Ctx {
                state,
                conn,
                user_id,
            };
            authenticated(&ctx, kind, data).await.map(Into::into)
        },
    }
}

/// The authenticated request vocabulary. An unrecognized kind is an error
/// reply but does not force logout; a known kind belonging to another
/// state does.
async fn authenticated(ctx: &Ctx<'_>, kind: &str, data: Value) -> Result<Value> {
    match kind {
        kinds::GET_TWO_FACTOR => handlers::account::get_two_factor(ctx).await,
        kinds::SET_TWO_FACTOR => handlers::account::set_two_factor(ctx, data).await,
        kinds::UPLOAD_FILE => handlers::file::upload_file(ctx, data).await,

        kinds::CREATE_GROUP => handlers::group::create_group(ctx, data).await,
        kinds::CREATE_SUB_GROUP => handlers::group::create_sub_group(ctx, data).await,
        kinds::GET_GROUPS => handlers::group::get_groups(ctx).await,
        kinds::GET_GROUP_INFO => handlers::group::get_group_info(ctx, data).await,
        kinds::LEAVE_GROUP => handlers::group::leave_group(ctx, data).await,
        kinds::SET_REQUIRE_APPROVAL => handlers::group::set_require_approval(ctx, data).await,
        kinds::GET_USERS => handlers::group::get_users(ctx, data).await,
        kinds::GET_USER_INFO => handlers::group::get_user_info(ctx, data).await,
        kinds::KICK => handlers::group::kick(ctx, data).await,
        kinds::SET_ROLE => handlers::group::set_role(ctx, data).await,
        kinds::SET_MUTED => handlers::group::set_muted(ctx, data).await,

        kinds::CREATE_MODULE => handlers::group::create_module(ctx, data).await,
        kinds::GET_MODULES => handlers::group::get_modules(ctx, data).await,
        kinds::GET_MODULE_INFO => handlers::group::get_module_info(ctx, data).await,
        kinds::SET_MODULE_ENABLED => handlers::group::set_module_enabled(ctx, data).await,

        kinds::CREATE_INVITE_LINK => handlers::invite::create_invite_link(ctx, data).await,
        kinds::USE_INVITE_LINK => handlers::invite::use_invite_link(ctx, data).await,
        kinds::SEND_INVITE => handlers::invite::send_invite(ctx, data).await,
        kinds::GET_INVITES => handlers::invite::get_invites(ctx).await,
        kinds::REPLY_TO_INVITE => handlers::invite::reply_to_invite(ctx, data).await,
        kinds::CREATE_DIRECT_MESSAGE => handlers::invite::create_direct_message(ctx, data).await,

        kinds::SEND_MESSAGE => handlers::chat::send_message(ctx, data).await,
        kinds::GET_MESSAGES => handlers::chat::get_messages(ctx, data).await,
        kinds::UPDATE_MESSAGE => handlers::chat::update_message(ctx, data).await,
        kinds::SET_REACTION => handlers::chat::set_reaction(ctx, data).await,

        kinds::ADD_TASK => handlers::task::add_task(ctx, data).await,
        kinds::GET_TASKS => handlers::task::get_tasks(ctx, data).await,
        kinds::UPDATE_TASK_STATUS => handlers::task::update_task_status(ctx, data).await,
        kinds::UPDATE_TASK_DEADLINE => handlers::task::update_task_deadline(ctx, data).await,
        kinds::DELETE_TASK => handlers::task::delete_task(ctx, data).await,

        kinds::ADD_EVENT => handlers::event::add_event(ctx, data).await,
        kinds::GET_EVENTS => handlers::event::get_events(ctx, data).await,
        kinds::APPROVE_EVENT => handlers::event::approve_event(ctx, data).await,
        kinds::UPDATE_EVENT => handlers::event::update_event(ctx, data).await,
        kinds::DELETE_EVENT => handlers::event::delete_event(ctx, data).await,
        kinds::SET_BULLETIN => handlers::event::set_bulletin(ctx, data).await,

        kinds::ADD_POLL => handlers::poll::add_poll(ctx, data).await,
        kinds::GET_POLLS => handlers::poll::get_polls(ctx, data).await,
        kinds::VOTE_ON_POLL => handlers::poll::vote_on_poll(ctx, data).await,

        // Known kinds that belong to other login states force a logout.
        kinds::ENTER_CODE | kinds::FINISH_RESET | kinds::CONNECT => {
            Err(RequestError::Unauthorized)
        },
        _ => Err(RequestError::invalid(format!("unknown request kind: {kind}"))),
    }
}
