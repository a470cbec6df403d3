use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use crate::eta::EtaEngine;
use crate::ingest::Pipeline;
use crate::network::{Network, Role, RoleRegistry};

use super::config::{Config, Permission};

#[derive(Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    pub permissions: HashSet<Permission>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub network: Arc<Network>,
    pub roles: Arc<RoleRegistry>,
    pub pipeline: Pipeline,
    pub eta: EtaEngine,
}

pub enum AuthError {
    MissingAuth,
    InvalidFormat,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Missing authorization header"),
            AuthError::InvalidFormat => (StatusCode::UNAUTHORIZED, "Invalid authorization format"),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "Invalid authorization token"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub struct PermissionError;

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Insufficient permissions" })),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthError::MissingAuth)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        let key = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::InvalidFormat)?;

        let identity = state
            .config
            .find_identity(key)
            .ok_or(AuthError::InvalidKey)?;

        let initial = identity
            .role
            .unwrap_or_else(|| default_role(&state.network, &identity.user_id));
        let role = state.roles.ensure_role(&identity.user_id, initial);

        Ok(AuthenticatedUser {
            user_id: identity.user_id.clone(),
            name: identity.name.clone(),
            role,
            permissions: permissions_for(role),
        })
    }
}

fn default_role(network: &Network, user_id: &str) -> Role {
    if network.is_driver(user_id) {
        Role::Driver
    } else {
        Role::Student
    }
}

pub fn permissions_for(role: Role) -> HashSet<Permission> {
    match role {
        Role::Driver => HashSet::from([Permission::Ingest, Permission::ReadPositions]),
        Role::Admin | Role::Student => HashSet::from([Permission::ReadPositions]),
    }
}

pub fn require_permission(
    user: &AuthenticatedUser,
    permission: Permission,
) -> Result<(), PermissionError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(PermissionError)
    }
}
