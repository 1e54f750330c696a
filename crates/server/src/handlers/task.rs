//! Task modules.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use {
    comcore_protocol::events,
    comcore_store::{GroupId, ItemId, ModuleId, ModuleType},
};

use crate::{RequestError, Result, dispatch::params, handlers::Ctx};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskParams {
    group: GroupId,
    task_list: ModuleId,
    description: String,
    #[serde(default)]
    deadline: i64,
}

pub async fn add_task(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: AddTaskParams = params(data)?;
    ctx.require_module(ModuleType::Task, p.task_list, p.group)
        .await?;
    ctx.require_not_muted(p.group).await?;
    if p.description.is_empty() {
        return Err(RequestError::invalid("description must not be empty"));
    }
    if p.deadline < 0 {
        return Err(RequestError::invalid("deadline must not be negative"));
    }

    let task = ctx
        .store()
        .create_task(p.task_list, ctx.user_id, &p.description, p.deadline)
        .await?;
    let entry = serde_json::to_value(&task).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::TASK,
        json!({ "group": p.group, "taskList": p.task_list, "task": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskListParams {
    group: GroupId,
    task_list: ModuleId,
}

pub async fn get_tasks(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: TaskListParams = params(data)?;
    ctx.require_module(ModuleType::Task, p.task_list, p.group)
        .await?;
    let tasks = ctx.store().get_tasks(p.task_list).await?;
    Ok(serde_json::to_value(tasks).unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskStatusParams {
    group: GroupId,
    task_list: ModuleId,
    id: ItemId,
    done: bool,
}

pub async fn update_task_status(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: UpdateTaskStatusParams = params(data)?;
    ctx.require_module(ModuleType::Task, p.task_list, p.group)
        .await?;
    ctx.require_not_muted(p.group).await?;

    let task = ctx
        .store()
        .update_task_status(p.task_list, p.id, p.done)
        .await?;
    let entry = serde_json::to_value(&task).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::TASK_UPDATED,
        json!({ "group": p.group, "taskList": p.task_list, "task": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskDeadlineParams {
    group: GroupId,
    task_list: ModuleId,
    id: ItemId,
    deadline: i64,
}

pub async fn update_task_deadline(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: UpdateTaskDeadlineParams = params(data)?;
    ctx.require_module(ModuleType::Task, p.task_list, p.group)
        .await?;
    ctx.require_not_muted(p.group).await?;
    if p.deadline < 0 {
        return Err(RequestError::invalid("deadline must not be negative"));
    }

    let task = ctx
        .store()
        .update_task_deadline(p.task_list, p.id, p.deadline)
        .await?;
    let entry = serde_json::to_value(&task).unwrap_or_default();
    ctx.push_group(
        p.group,
        events::TASK_UPDATED,
        json!({ "group": p.group, "taskList": p.task_list, "task": entry.clone() }),
    )
    .await;
    Ok(entry)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteTaskParams {
    group: GroupId,
    task_list: ModuleId,
    id: ItemId,
}

pub async fn delete_task(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: DeleteTaskParams = params(data)?;
    ctx.require_module(ModuleType::Task, p.task_list, p.group)
        .await?;
    ctx.require_not_muted(p.group).await?;

    ctx.store().delete_task(p.task_list, p.id).await?;
    ctx.push_group(
        p.group,
        events::TASK_DELETED,
        json!({ "group": p.group, "taskList": p.task_list, "id": p.id }),
    )
    .await;
    Ok(json!({}))
}
