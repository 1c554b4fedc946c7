//! Model permissions checked before serving a request.

use std::collections::HashSet;

use axum::http::Method;

use crate::error::{Result, ServerError};
use crate::user::User;

/// Kind of operation performed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    /// Map an HTTP method. Unknown methods have no action and are denied.
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET | Method::HEAD => Some(Action::View),
            Method::POST => Some(Action::Add),
            Method::PUT | Method::PATCH => Some(Action::Change),
            Method::DELETE => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

/// Model guarded by permissions, named `<app>.<action>_<model>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub app: &'static str,
    pub model: &'static str,
}

impl Resource {
    pub const USERS: Resource = Resource {
        app: "users",
        model: "user",
    };

    pub fn permission(&self, action: Action) -> String {
        format!("{}.{}_{}", self.app, action.as_str(), self.model)
    }
}

/// Permission needed to call `method` on `resource`.
pub fn required_permission(method: &Method, resource: Resource) -> Option<String> {
    Action::from_method(method).map(|action| resource.permission(action))
}

/// Authenticated user and every permission it holds.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: User,
    pub permissions: HashSet<String>,
}

impl Identity {
    pub fn new(user: User, permissions: HashSet<String>) -> Self {
        Self { user, permissions }
    }

    /// Active superusers hold every permission.
    pub fn has_perm(&self, permission: &str) -> bool {
        self.user.is_active
            && (self.user.is_superuser || self.permissions.contains(permission))
    }
}

/// Whether `identity` may call `method` on `resource`.
pub fn is_allowed(
    identity: Option<&Identity>,
    method: &Method,
    resource: Resource,
) -> bool {
    match (identity, required_permission(method, resource)) {
        (Some(identity), Some(permission)) => identity.has_perm(&permission),
        _ => false,
    }
}

/// Same as [`is_allowed`], failing with the error sent to the client.
pub fn authorize(
    identity: Option<&Identity>,
    method: &Method,
    resource: Resource,
) -> Result<()> {
    match identity {
        None => Err(ServerError::Unauthenticated),
        Some(_) if is_allowed(identity, method, resource) => Ok(()),
        Some(identity) => {
            tracing::debug!(
                user_id = identity.user.id,
                %method,
                "permission denied"
            );
            Err(ServerError::Forbidden)
        },
    }
}
