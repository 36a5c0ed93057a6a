//! User controller: list, read, create, update and delete over `UserService`.

use crate::error::AppError;
use crate::http::{RequestContext, Routes};
use crate::model::EntityInstance;
use crate::provider::Page;
use crate::service::{Crud, RecordId, UserService};
use serde_json::Value;

fn service(ctx: &RequestContext) -> Result<UserService, AppError> {
    Ok(UserService::new(ctx.state.provider.clone())?)
}

/// Numeric path ids are looked up as integers, anything else as text.
fn record_id(raw: &str) -> RecordId {
    match raw.parse::<i64>() {
        Ok(n) => RecordId::from(n),
        Err(_) => RecordId::from(raw),
    }
}

async fn list(ctx: RequestContext) -> Result<Page, AppError> {
    service(&ctx)?.list_and_count(&ctx.query).await
}

async fn read(ctx: RequestContext) -> Result<EntityInstance, AppError> {
    let id = record_id(ctx.param("id")?);
    service(&ctx)?.read(&id).await
}

async fn create(ctx: RequestContext) -> Result<EntityInstance, AppError> {
    let fields = ctx.body_object()?;
    service(&ctx)?.save(fields).await
}

async fn update(ctx: RequestContext) -> Result<EntityInstance, AppError> {
    let id = record_id(ctx.param("id")?);
    let fields = ctx.body_object()?;
    service(&ctx)?.update(&id, fields).await
}

async fn delete(ctx: RequestContext) -> Result<Value, AppError> {
    let id = record_id(ctx.param("id")?);
    service(&ctx)?.delete(&id).await?;
    Ok(Value::Null)
}

/// GET/POST /user, GET/PUT/DELETE /user/:id
pub fn routes(routes: Routes) -> Routes {
    routes
        .get("/user", list)
        .post("/user", create)
        .get("/user/:id", read)
        .put("/user/:id", update)
        .delete("/user/:id", delete)
}
