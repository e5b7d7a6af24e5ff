//! Handlers for the four todo procedures.
//!
//! Typed pass-through: decode params, validate, one store call, encode.
//! No business logic lives here.

use crate::error::TodoError;
use crate::ipc::event;
use crate::ipc::params::{self, CreateTodoParams, DeleteTodoParams, UpdateTodoParams};
use crate::store::TodoPatch;
use crate::AppContext;
use serde_json::{json, Value};

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value, TodoError> {
    let req = params::parse::<CreateTodoParams>(params)?.validate()?;

    let todo = ctx
        .storage
        .create_todo(&req.title, req.description.as_deref())
        .await?;

    ctx.broadcaster.broadcast_todo(event::TODO_CREATED, todo.id);
    Ok(json!({ "todo": todo }))
}

pub async fn list(_params: Value, ctx: &AppContext) -> Result<Value, TodoError> {
    let todos = ctx.storage.list_todos().await?;
    Ok(json!({ "todos": todos }))
}

pub async fn update(params: Value, ctx: &AppContext) -> Result<Value, TodoError> {
    let req = params::parse::<UpdateTodoParams>(params)?.validate()?;

    let patch = TodoPatch {
        title: req.title,
        description: req.description,
        completed: req.completed,
    };
    let todo = ctx.storage.update_todo(req.id, &patch).await?;

    ctx.broadcaster.broadcast_todo(event::TODO_UPDATED, todo.id);
    Ok(json!({ "todo": todo }))
}

pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value, TodoError> {
    let req: DeleteTodoParams = params::parse(params)?;

    ctx.storage.delete_todo(req.id).await?;

    ctx.broadcaster.broadcast_todo(event::TODO_DELETED, req.id);
    Ok(json!({ "success": true }))
}
