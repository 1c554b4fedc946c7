//! Permanently delete an account.

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode> {
    let user_id = super::parse_id(&user_id)?;
    state.users.delete(user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
