//! Poll modules.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::events,
    comcore_store::{GroupId, ItemId, ModuleId, ModuleType, Poll, UserId},
};

use crate::{RequestError, Result, dispatch::params, handlers::Ctx};

/// Wire shape of a poll: per-option tallies plus the viewer's own vote.
fn poll_entry(poll: &Poll, viewer: UserId) -> Value {
    json!({
        "id": poll.id,
        "creator": poll.creator,
        "description": poll.description,
        "options": poll.options,
        "votes": poll.tallies(),
        "myVote": poll.votes.get(&viewer),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddPollParams {
    group: GroupId,
    poll_list: ModuleId,
    description: String,
    options: Vec<String>,
}

pub async fn add_poll(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: AddPollParams = params(data)?;
    ctx.require_module(ModuleType::Poll, p.poll_list, p.group)
        .await?;
    if p.description.is_empty() {
        return Err(RequestError::invalid("description must not be empty"));
    }
    if p.options.is_empty() {
        return Err(RequestError::invalid("a poll needs at least one option"));
    }

    let poll = ctx
        .store()
        .create_poll(p.poll_list, ctx.user_id, &p.description, &p.options)
        .await?;
    let entry = poll_entry(&poll, ctx.user_id);
    ctx.push_group(
        p.group,
        events::POLL,
        json!({ "group": p.group, "pollList": p.poll_list, "poll": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollListParams {
    group: GroupId,
    poll_list: ModuleId,
}

pub async fn get_polls(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: PollListParams = params(data)?;
    ctx.require_module(ModuleType::Poll, p.poll_list, p.group)
        .await?;
    let polls = ctx.store().get_polls(p.poll_list).await?;
    let entries: Vec<Value> = polls.iter().map(|p| poll_entry(p, ctx.user_id)).collect();
    Ok(Value::Array(entries))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteParams {
    group: GroupId,
    poll_list: ModuleId,
    id: ItemId,
    option: usize,
}

pub async fn vote_on_poll(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: VoteParams = params(data)?;
    ctx.require_module(ModuleType::Poll, p.poll_list, p.group)
        .await?;
    ctx.store()
        .vote(p.poll_list, p.id, ctx.user_id, p.option)
        .await?;
    Ok(json!({}))
}
