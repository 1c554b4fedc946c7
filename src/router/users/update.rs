//! Partially update an account.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::JsonBody;
use crate::user::validation::{Mode, UserForm, Validator};
use crate::user::{Lookup, User};

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    JsonBody(form): JsonBody<UserForm>,
) -> Result<Json<User>> {
    let user_id = super::parse_id(&user_id)?;
    if state.users.find_by(Lookup::Id(user_id)).await?.is_none() {
        return Err(ServerError::NotFound);
    }

    let cleaned = Validator::new(&state.users, &state.catalog)
        .validate(form, Mode::Update { user_id })
        .await?;

    Ok(Json(state.users.update(user_id, cleaned.patch).await?))
}
