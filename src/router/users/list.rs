//! List every account.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::Result;
use crate::user::User;

pub async fn handler(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.users.list().await?))
}
