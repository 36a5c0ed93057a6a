//! Liveness endpoint.

use crate::error::AppError;
use crate::http::{RequestContext, Routes};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub message: &'static str,
    pub date: DateTime<Utc>,
}

async fn status(_ctx: RequestContext) -> Result<StatusBody, AppError> {
    Ok(StatusBody {
        message: "Online",
        date: Utc::now(),
    })
}

/// GET /status
pub fn routes(routes: Routes) -> Routes {
    routes.get("/status", status)
}
