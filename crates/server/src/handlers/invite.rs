//! Invitations: direct invites, shareable invite links, direct messages.

use std::sync::Arc;

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::{INVITE_CODE_LEN, INVITE_GRACE_MS, INVITE_MIN_TTL_MS, events},
    comcore_store::{GroupId, Invite, InviteLink, Role},
};

use crate::{
    RequestError, Result,
    dispatch::params,
    handlers::{Ctx, now_ms},
    state::ServerState,
};

/// A link is accepted for a short grace window past its expiry to tolerate
/// clock skew between server and clients.
fn link_usable(link: &InviteLink, now: i64) -> bool {
    link.expire_at == 0 || now <= link.expire_at + INVITE_GRACE_MS as i64
}

#[derive(Deserialize)]
struct CreateInviteLinkParams {
    group: GroupId,
    #[serde(default)]
    expire: i64,
}

pub async fn create_invite_link(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CreateInviteLinkParams = params(data)?;
    if p.expire < 0 {
        return Err(RequestError::invalid("expire must not be negative"));
    }
    ctx.require_role(p.group, Role::Moderator).await?;

    // expire=0 never expires; anything else gets at least the minimum TTL.
    let expire_at = match p.expire {
        0 => 0,
        t => t.max(now_ms() + INVITE_MIN_TTL_MS as i64),
    };
    let code = comcore_crypto::human_code(INVITE_CODE_LEN);
    ctx.store()
        .add_group_invite_code(p.group, &code, expire_at)
        .await?;
    Ok(json!({ "link": code }))
}

#[derive(Deserialize)]
struct LinkParams {
    link: String,
}

/// State-independent: report whether a link is usable without joining.
pub async fn check_invite_link(state: &Arc<ServerState>, data: Value) -> Result<Value> {
    let p: LinkParams = params(data)?;
    let Some(link) = state.store.check_invite_code(p.link.trim()).await? else {
        return Ok(json!({ "valid": false }));
    };
    if !link_usable(&link, now_ms()) {
        return Ok(json!({ "valid": false }));
    }
    let name = state.store.get_group_name(link.group_id).await?;
    Ok(json!({ "valid": true, "name": name, "expire": link.expire_at }))
}

pub async fn use_invite_link(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: LinkParams = params(data)?;
    let Some(link) = ctx.store().check_invite_code(p.link.trim()).await? else {
        return Ok(json!({ "id": Value::Null }));
    };
    if !link_usable(&link, now_ms()) {
        return Ok(json!({ "id": Value::Null }));
    }
    ctx.store().join_group(ctx.user_id, link.group_id).await?;
    Ok(json!({ "id": link.group_id }))
}

#[derive(Deserialize)]
struct SendInviteParams {
    group: GroupId,
    email: String,
}

pub async fn send_invite(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SendInviteParams = params(data)?;
    ctx.require_role(p.group, Role::Moderator).await?;
    let target = ctx
        .store()
        .lookup_account(&p.email)
        .await?
        .ok_or_else(|| RequestError::invalid("no account with that email"))?;

    let invite = Invite {
        user_id: target.id,
        group_id: p.group,
        group_name: ctx.store().get_group_name(p.group).await?,
        inviter_name: ctx.store().get_user_name(ctx.user_id).await?,
    };
    let newly_sent = ctx.store().send_invite(invite.clone()).await?;
    // A repeat invite succeeds quietly: no second push.
    if newly_sent {
        ctx.push_user(
            target.id,
            events::INVITE,
            serde_json::to_value(&invite).unwrap_or_default(),
        )
        .await;
    }
    Ok(json!({ "sent": true }))
}

pub async fn get_invites(ctx: &Ctx<'_>) -> Result<Value> {
    let invites = ctx.store().get_invites(ctx.user_id).await?;
    Ok(serde_json::to_value(invites).unwrap_or_default())
}

#[derive(Deserialize)]
struct ReplyToInviteParams {
    group: GroupId,
    accept: bool,
}

pub async fn reply_to_invite(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: ReplyToInviteParams = params(data)?;
    ctx.store()
        .reply_to_invite(ctx.user_id, p.group, p.accept)
        .await?;
    Ok(json!({}))
}

#[derive(Deserialize)]
struct CreateDirectMessageParams {
    email: String,
}

pub async fn create_direct_message(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CreateDirectMessageParams = params(data)?;
    let target = ctx
        .store()
        .lookup_account(&p.email)
        .await?
        .ok_or_else(|| RequestError::invalid("no account with that email"))?;
    let (id, created) = ctx
        .store()
        .create_direct_message(ctx.user_id, target.id)
        .await?;
    if created {
        let name = ctx.store().get_user_name(ctx.user_id).await?;
        ctx.push_user(target.id, events::DM, json!({ "id": id, "name": name }))
            .await;
    }
    Ok(json!({ "id": id }))
}
