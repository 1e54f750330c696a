//! Per-connection login state machine and the unauthenticated request
//! handlers that drive it.

use std::sync::Arc;

use {
    serde::Deserialize,
    serde_json::{Value, json},
    tracing::info,
};

use {
    comcore_protocol::{CodeKind, Frame, LoginStatus, events},
    comcore_store::UserId,
};

use crate::{
    RequestError, Result,
    codes::CodeData,
    dispatch::{Outcome, params},
    sessions::ConnHandle,
    state::ServerState,
};

// ── State ────────────────────────────────────────────────────────────────────

/// Authoritative per-connection state. Only state-appropriate requests are
/// accepted; everything else raises `Unauthorized` and drops the connection
/// back to `LoggedOut`.
#[derive(Debug, Clone)]
pub enum LoginState {
    LoggedOut,
    /// Waiting for an emailed confirmation code.
    ConfirmEmail { email: String, kind: CodeKind },
    /// Code accepted; waiting for the replacement password.
    ResetPassword { user_id: UserId },
    LoggedIn {
        user_id: UserId,
        name: String,
        token: String,
    },
}

/// Enter `LoggedIn`: update the connection state, register it for pushes,
/// and produce the `login` push the client receives right after the reply.
async fn enter_logged_in(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    user_id: UserId,
    name: String,
    token: String,
) -> Frame {
    conn.set_state(LoginState::LoggedIn {
        user_id,
        name: name.clone(),
        token: token.clone(),
    });
    state
        .sessions
        .login_connection(user_id, Arc::clone(conn))
        .await;
    info!(conn_id = %conn.conn_id, user_id, "session established");
    Frame::push(events::LOGIN, json!({ "id": user_id, "name": name, "token": token }))
}

/// Issue a fresh auth token for `user_id` and enter `LoggedIn` with it.
async fn fresh_login(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    user_id: UserId,
    name: String,
) -> Result<Frame> {
    let token = comcore_crypto::random_token();
    state.store.set_auth_token(user_id, &token).await?;
    Ok(enter_logged_in(state, conn, user_id, name, token).await)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginParams {
    email: String,
    pass: String,
}

pub async fn login(state: &ServerState, conn: &Arc<ConnHandle>, data: Value) -> Result<Outcome> {
    let p: LoginParams = params(data)?;
    if p.email.is_empty() {
        return Err(RequestError::invalid("email must not be empty"));
    }

    // A live pending creation takes priority: the user is re-entering the
    // flow before their first code was confirmed.
    if state
        .codes
        .continue_creation(state.mailer.as_ref(), &p.email, &p.pass)
        .await?
    {
        conn.set_state(LoginState::ConfirmEmail {
            email: p.email,
            kind: CodeKind::NewAccount,
        });
        return Ok(json!({ "status": LoginStatus::EnterCode }).into());
    }

    let Some(account) = state.store.lookup_account(&p.email).await? else {
        return Ok(json!({ "status": LoginStatus::DoesNotExist }).into());
    };
    if !comcore_crypto::check_password(&p.pass, &account.password_hash) {
        return Ok(json!({ "status": LoginStatus::InvalidPassword }).into());
    }

    if account.two_factor_enabled {
        state
            .codes
            .send_confirmation(
                state.mailer.as_ref(),
                &p.email,
                CodeKind::TwoFactor,
                CodeData::TwoFactor {
                    user_id: account.id,
                },
            )
            .await?;
        conn.set_state(LoginState::ConfirmEmail {
            email: p.email,
            kind: CodeKind::TwoFactor,
        });
        return Ok(json!({ "status": LoginStatus::EnterCode }).into());
    }

    let push = fresh_login(state, conn, account.id, account.name).await?;
    Ok(Outcome {
        reply: json!({ "status": LoginStatus::Success }),
        after: vec![push],
    })
}

#[derive(Deserialize)]
struct ConnectParams {
    id: UserId,
    token: String,
}

/// Re-establish a session from a stored auth token without rotating it.
pub async fn connect(state: &ServerState, conn: &Arc<ConnHandle>, data: Value) -> Result<Outcome> {
    let p: ConnectParams = params(data)?;
    let stored = match state.store.get_auth_token(p.id).await {
        Ok(token) => token,
        Err(comcore_store::Error::Invalid { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    match stored {
        Some(token) if !p.token.is_empty() && token == p.token => {
            let name = state.store.get_user_name(p.id).await?;
            let push = enter_logged_in(state, conn, p.id, name, token).await;
            Ok(Outcome {
                reply: json!({ "connected": true }),
                after: vec![push],
            })
        },
        _ => Ok(Outcome {
            reply: json!({ "connected": false }),
            after: vec![Frame::push(events::LOGOUT, json!({}))],
        }),
    }
}

#[derive(Deserialize)]
struct CreateAccountParams {
    name: String,
    email: String,
    pass: String,
}

pub async fn create_account(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    data: Value,
) -> Result<Outcome> {
    let p: CreateAccountParams = params(data)?;
    if p.name.is_empty() || p.email.is_empty() || p.pass.is_empty() {
        return Err(RequestError::invalid("name, email, and password are required"));
    }
    if state.store.lookup_account(&p.email).await?.is_some() {
        return Ok(json!({ "created": false }).into());
    }
    if !state
        .codes
        .start_creation(state.mailer.as_ref(), &p.name, &p.email, &p.pass)
        .await?
    {
        return Ok(json!({ "created": false }).into());
    }
    conn.set_state(LoginState::ConfirmEmail {
        email: p.email,
        kind: CodeKind::NewAccount,
    });
    Ok(json!({ "created": true }).into())
}

#[derive(Deserialize)]
struct RequestResetParams {
    email: String,
}

pub async fn request_reset(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    data: Value,
) -> Result<Outcome> {
    let p: RequestResetParams = params(data)?;
    let Some(account) = state.store.lookup_account(&p.email).await? else {
        return Ok(json!({ "sent": false }).into());
    };
    state
        .codes
        .send_confirmation(
            state.mailer.as_ref(),
            &p.email,
            CodeKind::ResetPassword,
            CodeData::ResetPassword {
                user_id: account.id,
            },
        )
        .await?;
    conn.set_state(LoginState::ConfirmEmail {
        email: p.email,
        kind: CodeKind::ResetPassword,
    });
    Ok(json!({ "sent": true }).into())
}

#[derive(Deserialize)]
struct EnterCodeParams {
    code: String,
}

/// Handle `enterCode` in a `ConfirmEmail` state. A correct code completes
/// the flow the state was opened for; a wrong one replies `correct: false`
/// and stays (the code manager tracks the fail count).
pub async fn enter_code(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    email: &str,
    kind: CodeKind,
    data: Value,
) -> Result<Outcome> {
    let p: EnterCodeParams = params(data)?;
    let Some(code_data) = state.codes.check_code(email, kind, &p.code) else {
        return Ok(json!({ "correct": false }).into());
    };

    match code_data {
        CodeData::NewAccount => {
            let pending = state
                .codes
                .take_pending(email)
                .ok_or_else(|| RequestError::invalid("no pending account"))?;
            let account = state
                .store
                .create_account(&pending.name, &pending.email, &pending.password_hash)
                .await?;
            let push = fresh_login(state, conn, account.id, account.name).await?;
            Ok(Outcome {
                reply: json!({ "correct": true }),
                after: vec![push],
            })
        },
        CodeData::TwoFactor { user_id } => {
            let name = state.store.get_user_name(user_id).await?;
            let push = fresh_login(state, conn, user_id, name).await?;
            Ok(Outcome {
                reply: json!({ "correct": true }),
                after: vec![push],
            })
        },
        CodeData::ResetPassword { user_id } => {
            conn.set_state(LoginState::ResetPassword { user_id });
            Ok(json!({ "correct": true }).into())
        },
    }
}

#[derive(Deserialize)]
struct FinishResetParams {
    pass: String,
}

/// Handle `finishReset` in the `ResetPassword` state. Stores the new hash,
/// force-logs-out every other session of the user, and logs this one in.
pub async fn finish_reset(
    state: &ServerState,
    conn: &Arc<ConnHandle>,
    user_id: UserId,
    data: Value,
) -> Result<Outcome> {
    let p: FinishResetParams = params(data)?;
    if p.pass.is_empty() {
        return Err(RequestError::invalid("password must not be empty"));
    }
    let hash = comcore_crypto::hash_password(&p.pass);
    state.store.reset_password(user_id, &hash).await?;
    state
        .sessions
        .force_logout(user_id, Some(&conn.conn_id))
        .await;

    let name = state.store.get_user_name(user_id).await?;
    let push = fresh_login(state, conn, user_id, name).await?;
    Ok(Outcome {
        reply: json!({ "reset": true }),
        after: vec![push],
    })
}
