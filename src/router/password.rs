//! Let a user replace its own password.

use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use validator::{ValidationError, ValidationErrors};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::permission::Identity;
use crate::router::{JsonBody, required};
use crate::user::validation::{Text, check_new_password};
use crate::AppState;

#[derive(Debug, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[serde(default)]
    old_password: Text,
    #[serde(default)]
    new_password: Text,
}

fn error(message: &'static str) -> ValidationError {
    ValidationError::new("invalid").with_message(message.into())
}

pub async fn handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(body): JsonBody<Body>,
) -> Result<StatusCode> {
    let mut errors = match check_new_password(
        &state.catalog,
        "new_password",
        &body.new_password,
    ) {
        Ok(_) => ValidationErrors::new(),
        Err(errors) => errors,
    };

    if let Some(old) = required(&mut errors, "old_password", &body.old_password) {
        if !state.users.check_password(&identity.user, old) {
            errors.add("old_password", error("Invalid password."));
        }
    }

    if !errors.is_empty() {
        return Err(errors.into());
    }

    let password = body.new_password.as_deref().unwrap_or_default();
    let user = state
        .users
        .set_password(identity.user.id, password, false)
        .await?;
    tracing::info!(user_id = user.id, "password changed");

    Ok(StatusCode::NO_CONTENT)
}
