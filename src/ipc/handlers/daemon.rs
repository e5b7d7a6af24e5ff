use crate::error::TodoError;
use crate::AppContext;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value, TodoError> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value, TodoError> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let todo_count = ctx.storage.count_todos().await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "port": ctx.config.port,
        "todoCount": todo_count
    }))
}
