// handlers/mod.rs - handler tiers
//
// Public (no auth) → Protected (JWT + active profile) → Elevated (sales_ops / admin)
//
// Tier gating lives in the router (see app.rs); handlers only receive the
// already validated caller and hand the work to the service layer.
pub mod elevated;
pub mod protected;
pub mod public;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Json, Path, Query};
use uuid::Uuid;

use crate::error::ApiError;

/// Unwraps a `:id` path segment, turning a malformed uuid into a 400 envelope.
pub(crate) fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    let Path(id) = path?;
    Ok(id)
}

pub(crate) fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    let Query(q) = query?;
    Ok(q)
}

pub(crate) fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    let Json(b) = body?;
    Ok(b)
}
