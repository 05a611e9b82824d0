use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::access::{Caller, Role};
use crate::app::AppState;
use crate::error::ApiError;

/// The caller after checking the token against the stored profile
#[derive(Clone, Debug)]
pub struct ValidatedUser {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
}

impl ValidatedUser {
    pub fn caller(&self) -> Caller {
        Caller::new(self.id, self.role)
    }
}

/// Loads the profile named by the token. Missing profile is 401; an inactive
/// profile or a token role that no longer matches the stored role is 403.
pub async fn validate_user_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before user validation"))?;

    let profile = state
        .services
        .profiles
        .find_for_auth(auth_user.id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| {
            tracing::warn!("User validation failed: profile {} not found", auth_user.id);
            ApiError::unauthorized("Profile not found")
        })?;

    if !profile.is_active {
        tracing::warn!("User validation failed: profile {} is inactive", profile.id);
        return Err(ApiError::forbidden("Profile is inactive"));
    }

    if profile.role != auth_user.role {
        tracing::warn!(
            "User validation failed: token role '{}' doesn't match stored role '{}' for {}",
            auth_user.role,
            profile.role,
            profile.id
        );
        return Err(ApiError::forbidden("Role has changed, please sign in again"));
    }

    let validated_user = ValidatedUser {
        id: profile.id,
        name: profile.name,
        role: profile.role,
    };
    tracing::debug!("User validation successful: {} ({}) as {}", validated_user.name, validated_user.id, validated_user.role);

    request.extensions_mut().insert(validated_user);

    Ok(next.run(request).await)
}

/// Route tier for `/api/sales-ops/*`
pub async fn require_staff(request: Request, next: Next) -> Result<Response, ApiError> {
    require(request, next, |role| role.is_staff(), "This action requires a sales_ops or admin role").await
}

/// Route tier for `/api/admin/*`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require(request, next, |role| role == Role::Admin, "This action requires an admin role").await
}

async fn require(request: Request, next: Next, allowed: impl Fn(Role) -> bool, denial: &'static str) -> Result<Response, ApiError> {
    let role = request
        .extensions()
        .get::<ValidatedUser>()
        .map(|u| u.role)
        .ok_or_else(|| ApiError::unauthorized("User validation required before role check"))?;

    if !allowed(role) {
        return Err(ApiError::forbidden(denial));
    }
    Ok(next.run(request).await)
}
