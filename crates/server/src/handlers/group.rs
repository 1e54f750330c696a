//! Groups, membership, and modules.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::events,
    comcore_store::{GroupId, ModuleId, ModuleType, Role, UserId},
};

use crate::{RequestError, Result, dispatch::params, handlers::Ctx};

#[derive(Deserialize)]
struct CreateGroupParams {
    name: String,
}

pub async fn create_group(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CreateGroupParams = params(data)?;
    if p.name.trim().is_empty() {
        return Err(RequestError::invalid("group name must not be empty"));
    }
    let id = ctx.store().create_group(ctx.user_id, &p.name).await?;
    Ok(json!({ "id": id }))
}

#[derive(Deserialize)]
struct CreateSubGroupParams {
    group: GroupId,
    name: String,
    users: Vec<UserId>,
}

pub async fn create_sub_group(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CreateSubGroupParams = params(data)?;
    if p.name.trim().is_empty() {
        return Err(RequestError::invalid("group name must not be empty"));
    }
    ctx.require_role(p.group, Role::Owner).await?;
    let id = ctx
        .store()
        .create_sub_group(ctx.user_id, p.group, &p.name, &p.users)
        .await?;
    Ok(json!({ "id": id }))
}

pub async fn get_groups(ctx: &Ctx<'_>) -> Result<Value> {
    let groups = ctx.store().get_groups(ctx.user_id).await?;
    Ok(serde_json::to_value(groups).unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetGroupInfoParams {
    groups: Vec<GroupId>,
    #[serde(default)]
    last_refresh: i64,
}

pub async fn get_group_info(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GetGroupInfoParams = params(data)?;
    let info = ctx
        .store()
        .get_group_info(ctx.user_id, &p.groups, p.last_refresh)
        .await?;
    Ok(serde_json::to_value(info).unwrap_or_default())
}

#[derive(Deserialize)]
struct GroupParams {
    group: GroupId,
}

pub async fn leave_group(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GroupParams = params(data)?;
    ctx.store().leave_group(ctx.user_id, p.group).await?;
    Ok(json!({}))
}

#[derive(Deserialize)]
struct SetRequireApprovalParams {
    group: GroupId,
    require: bool,
}

pub async fn set_require_approval(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetRequireApprovalParams = params(data)?;
    ctx.require_role(p.group, Role::Moderator).await?;
    ctx.store().set_require_approval(p.group, p.require).await?;
    Ok(json!({}))
}

pub async fn get_users(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GroupParams = params(data)?;
    ctx.require_member(p.group).await?;
    let users = ctx.store().get_users(p.group).await?;
    Ok(serde_json::to_value(users).unwrap_or_default())
}

#[derive(Deserialize)]
struct GetUserInfoParams {
    group: GroupId,
    user: UserId,
}

pub async fn get_user_info(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GetUserInfoParams = params(data)?;
    ctx.require_member(p.group).await?;
    let info = ctx.store().get_user_info(p.group, p.user).await?;
    Ok(serde_json::to_value(info).unwrap_or_default())
}

#[derive(Deserialize)]
struct KickParams {
    group: GroupId,
    target: UserId,
}

pub async fn kick(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: KickParams = params(data)?;
    ctx.require_outranks(p.group, p.target).await?;
    ctx.store().kick(p.group, p.target).await?;
    ctx.push_user(p.target, events::KICKED, json!({ "group": p.group }))
        .await;
    Ok(json!({}))
}

#[derive(Deserialize)]
struct SetRoleParams {
    group: GroupId,
    target: UserId,
    role: String,
}

pub async fn set_role(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetRoleParams = params(data)?;
    let role = Role::parse(&p.role)
        .ok_or_else(|| RequestError::invalid(format!("unknown role: {}", p.role)))?;
    if p.target == ctx.user_id {
        return Err(RequestError::invalid("cannot modify yourself"));
    }
    if role == Role::Owner {
        // Ownership can only be handed away by the owner; the grant
        // demotes the actor to moderator in the same update.
        ctx.require_role(p.group, Role::Owner).await?;
    } else {
        ctx.require_outranks(p.group, p.target).await?;
    }

    // Pushes go out only after the whole update committed.
    let transferred = ctx
        .store()
        .set_role(p.group, p.target, role)
        .await?
        .is_some();
    ctx.push_user(
        p.target,
        events::ROLE_CHANGED,
        json!({ "group": p.group, "role": role.as_str() }),
    )
    .await;
    if transferred {
        ctx.push_user(
            ctx.user_id,
            events::ROLE_CHANGED,
            json!({ "group": p.group, "role": Role::Moderator.as_str() }),
        )
        .await;
    }
    Ok(json!({}))
}

#[derive(Deserialize)]
struct SetMutedParams {
    group: GroupId,
    target: UserId,
    muted: bool,
}

pub async fn set_muted(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetMutedParams = params(data)?;
    ctx.require_outranks(p.group, p.target).await?;
    ctx.store().set_muted(p.group, p.target, p.muted).await?;
    ctx.push_user(
        p.target,
        events::MUTED_CHANGED,
        json!({ "group": p.group, "muted": p.muted }),
    )
    .await;
    Ok(json!({}))
}

// ── Modules ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateModuleParams {
    group: GroupId,
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

pub async fn create_module(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CreateModuleParams = params(data)?;
    if p.name.trim().is_empty() {
        return Err(RequestError::invalid("module name must not be empty"));
    }
    if p.kind.trim().is_empty() {
        return Err(RequestError::invalid("module type must not be empty"));
    }
    ctx.require_role(p.group, Role::Moderator).await?;
    let id = ctx
        .store()
        .create_module(p.group, &p.name, ModuleType::from(p.kind))
        .await?;
    Ok(json!({ "id": id }))
}

pub async fn get_modules(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GroupParams = params(data)?;
    ctx.require_member(p.group).await?;
    let modules = ctx.store().get_modules(p.group).await?;
    Ok(serde_json::to_value(modules).unwrap_or_default())
}

#[derive(Deserialize)]
struct GetModuleInfoParams {
    group: GroupId,
    modules: Vec<ModuleId>,
}

pub async fn get_module_info(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GetModuleInfoParams = params(data)?;
    ctx.require_member(p.group).await?;
    let info = ctx.store().get_module_info(p.group, &p.modules).await?;
    Ok(serde_json::to_value(info).unwrap_or_default())
}

#[derive(Deserialize)]
struct SetModuleEnabledParams {
    group: GroupId,
    module: ModuleId,
    enabled: bool,
}

pub async fn set_module_enabled(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetModuleEnabledParams = params(data)?;
    ctx.require_role(p.group, Role::Moderator).await?;
    ctx.store()
        .set_module_enabled(p.group, p.module, p.enabled)
        .await?;
    Ok(json!({}))
}
