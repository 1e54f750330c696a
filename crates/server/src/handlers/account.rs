//! Account settings.

use {
    serde::Deserialize,
    serde_json::{Value, json},
};

use crate::{Result, dispatch::params, handlers::Ctx};

pub async fn get_two_factor(ctx: &Ctx<'_>) -> Result<Value> {
    let enabled = ctx.store().get_two_factor(ctx.user_id).await?;
    Ok(json!({ "enabled": enabled }))
}

#[derive(Deserialize)]
struct SetTwoFactorParams {
    enabled: bool,
}

pub async fn set_two_factor(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: SetTwoFactorParams = params(data)?;
    ctx.store().set_two_factor(ctx.user_id, p.enabled).await?;
    Ok(json!({}))
}
