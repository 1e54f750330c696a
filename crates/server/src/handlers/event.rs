//! Calendar modules.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::events,
    comcore_store::{ApproveOutcome, GroupId, ItemId, ModuleId, ModuleType, Role},
};

use crate::{RequestError, Result, dispatch::params, handlers::Ctx};

fn validate_times(start: i64, end: i64) -> Result<()> {
    if start < 1 {
        return Err(RequestError::invalid("start must be positive"));
    }
    if end < start {
        return Err(RequestError::invalid("end must not precede start"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct AddEventParams {
    group: GroupId,
    calendar: ModuleId,
    description: String,
    start: i64,
    end: i64,
}

pub async fn add_event(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: AddEventParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    ctx.require_not_muted(p.group).await?;
    if p.description.is_empty() {
        return Err(RequestError::invalid("description must not be empty"));
    }
    validate_times(p.start, p.end)?;

    // Plain users' events start unapproved when the group gates them.
    let role = ctx.store().get_role(p.group, ctx.user_id).await?;
    let approved =
        role > Role::User || !ctx.store().get_require_approval(p.group).await?;
    let event = ctx
        .store()
        .create_event(p.calendar, ctx.user_id, &p.description, p.start, p.end, approved)
        .await?;
    let entry = serde_json::to_value(&event).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::EVENT,
        json!({ "group": p.group, "calendar": p.calendar, "event": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
struct CalendarParams {
    group: GroupId,
    calendar: ModuleId,
}

pub async fn get_events(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: CalendarParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    let events = ctx.store().get_events(p.calendar).await?;
    Ok(serde_json::to_value(events).unwrap_or_default())
}

#[derive(Deserialize)]
struct ApproveEventParams {
    group: GroupId,
    calendar: ModuleId,
    id: ItemId,
    approve: bool,
}

pub async fn approve_event(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: ApproveEventParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    ctx.require_role(p.group, Role::Moderator).await?;

    match ctx.store().approve_event(p.calendar, p.id, p.approve).await? {
        ApproveOutcome::Approved(id) => {
            ctx.push_group(
                p.group,
                events::EVENT_APPROVED,
                json!({ "group": p.group, "calendar": p.calendar, "id": id }),
            )
            .await;
        },
        ApproveOutcome::Deleted(id) => {
            ctx.push_group(
                p.group,
                events::EVENT_DELETED,
                json!({ "group": p.group, "calendar": p.calendar, "id": id }),
            )
            .await;
        },
        ApproveOutcome::Unchanged => {},
    }
    Ok(json!({}))
}

#[derive(Deserialize)]
struct UpdateEventParams {
    group: GroupId,
    calendar: ModuleId,
    id: ItemId,
    description: String,
    start: i64,
    end: i64,
}

pub async fn update_event(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: UpdateEventParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    if p.description.is_empty() {
        return Err(RequestError::invalid("description must not be empty"));
    }
    validate_times(p.start, p.end)?;
    require_author_or_outranks(ctx, p.group, p.calendar, p.id).await?;

    let event = ctx
        .store()
        .edit_event(p.calendar, p.id, &p.description, p.start, p.end)
        .await?;
    let entry = serde_json::to_value(&event).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::EVENT_UPDATED,
        json!({ "group": p.group, "calendar": p.calendar, "event": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
struct DeleteEventParams {
    group: GroupId,
    calendar: ModuleId,
    id: ItemId,
}

pub async fn delete_event(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: DeleteEventParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    require_author_or_outranks(ctx, p.group, p.calendar, p.id).await?;

    ctx.store().delete_event(p.calendar, p.id).await?;
    ctx.push_group(
        p.group,
        events::EVENT_DELETED,
        json!({ "group": p.group, "calendar": p.calendar, "id": p.id }),
    )
    .await;
    Ok(json!({}))
}

#[derive(Deserialize)]
struct SetBulletinParams {
    group: GroupId,
    calendar: ModuleId,
    #[serde(default)]
    id: Option<ItemId>,
}

pub async fn set_bulletin(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetBulletinParams = params(data)?;
    ctx.require_module(ModuleType::Cal, p.calendar, p.group)
        .await?;
    ctx.require_role(p.group, Role::Moderator).await?;

    ctx.store().set_bulletin_event(p.calendar, p.id).await?;
    ctx.push_group(
        p.group,
        events::SET_BULLETIN,
        json!({ "group": p.group, "calendar": p.calendar, "id": p.id }),
    )
    .await;
    Ok(json!({}))
}

/// Touching someone else's event requires strictly more authority than its
/// creator holds.
async fn require_author_or_outranks(
    ctx: &Ctx<'_>,
    group: GroupId,
    calendar: ModuleId,
    id: ItemId,
) -> Result<()> {
    let creator = ctx
        .store()
        .get_events(calendar)
        .await?
        .into_iter()
        .find(|e| e.id == id)
        .map(|e| e.creator)
        .ok_or_else(|| RequestError::invalid("no such event"))?;
    if creator == ctx.user_id {
        return Ok(());
    }
    ctx.require_outranks(group, creator).await
}
