//! Chat modules: messages and reactions.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::{MESSAGE_PAGE_LIMIT, events},
    comcore_store::{GroupId, ItemId, ModuleId, ModuleType},
};

use crate::{
    RequestError, Result,
    dispatch::params,
    handlers::{Ctx, now_ms},
};

/// Upper id bound substituted when the client passes `before < 1`.
const MAX_ITEM_ID: i64 = 1 << 53;

#[derive(Deserialize)]
struct SendMessageParams {
    group: GroupId,
    chat: ModuleId,
    contents: String,
}

pub async fn send_message(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SendMessageParams = params(data)?;
    ctx.require_module(ModuleType::Chat, p.chat, p.group).await?;
    ctx.require_not_muted(p.group).await?;
    if p.contents.is_empty() {
        return Err(RequestError::invalid("message must not be empty"));
    }

    let message = ctx
        .store()
        .send_message(p.chat, ctx.user_id, &p.contents, now_ms())
        .await?;
    let entry = serde_json::to_value(&message).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::MESSAGE,
        json!({ "group": p.group, "chat": p.chat, "message": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
struct GetMessagesParams {
    group: GroupId,
    chat: ModuleId,
    #[serde(default)]
    after: i64,
    #[serde(default)]
    before: i64,
}

pub async fn get_messages(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: GetMessagesParams = params(data)?;
    ctx.require_module(ModuleType::Chat, p.chat, p.group).await?;

    let after = p.after.max(0);
    let before = if p.before < 1 { MAX_ITEM_ID } else { p.before };
    let messages = ctx
        .store()
        .get_messages(p.chat, after, before, MESSAGE_PAGE_LIMIT)
        .await?;
    Ok(json!({ "messages": messages }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMessageParams {
    group: GroupId,
    chat: ModuleId,
    id: ItemId,
    #[serde(default)]
    new_contents: String,
}

/// Edit or delete a message. Authors may edit and delete their own; empty
/// contents means delete, which others may do only with strictly more
/// authority than the author.
pub async fn update_message(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: UpdateMessageParams = params(data)?;
    ctx.require_module(ModuleType::Chat, p.chat, p.group).await?;

    let sender = ctx.store().get_message_sender(p.chat, p.id).await?;
    let deleting = p.new_contents.is_empty();
    if sender != ctx.user_id {
        if !deleting {
            return Err(RequestError::invalid("only the author can edit a message"));
        }
        ctx.require_outranks(p.group, sender).await?;
    }

    let contents = if deleting {
        None
    } else {
        Some(p.new_contents.as_str())
    };
    let message = ctx.store().edit_message(p.chat, p.id, contents).await?;
    let entry = serde_json::to_value(&message).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::MESSAGE_UPDATED,
        json!({ "group": p.group, "chat": p.chat, "message": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
struct SetReactionParams {
    group: GroupId,
    chat: ModuleId,
    id: ItemId,
    #[serde(default)]
    reaction: Option<String>,
}

pub async fn set_reaction(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetReactionParams = params(data)?;
    ctx.require_module(ModuleType::Chat, p.chat, p.group).await?;

    let reactions = ctx
        .store()
        .set_reaction(p.chat, p.id, ctx.user_id, p.reaction.as_deref())
        .await?;
    ctx.push_group(
        p.group,
        events::REACTION,
        json!({ "group": p.group, "chat": p.chat, "id": p.id, "reactions": reactions.clone() }),
    )
    .await;
    Ok(json!({ "reactions": reactions }))
}
