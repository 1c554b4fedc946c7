//! Users-related HTTP API.
mod create;
mod delete;
mod get;
mod list;
mod update;

use axum::extract::{Request, State};
use axum::http::header;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Router, middleware};

use crate::error::{Result, ServerError};
use crate::permission::{Identity, Resource, authorize};
use crate::token::TokenType;
use crate::user::Lookup;
use crate::{AppState, router};

const BEARER: &str = "Bearer ";

/// Custom middleware for authentification.
///
/// Puts the [`Identity`] of the caller in request extensions.
async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ServerError::Unauthenticated)?;

    let claims = state.token.decode(token, TokenType::Access)?;
    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| ServerError::InvalidToken)?;

    let user = state
        .users
        .find_by(Lookup::Id(user_id))
        .await?
        .ok_or(ServerError::UserNotFound)?;
    if !user.is_active {
        return Err(ServerError::InactiveUser);
    }

    let permissions = state.users.permissions(&user).await?;
    req.extensions_mut()
        .insert(Identity::new(user, permissions));

    Ok(next.run(req).await)
}

/// Check model permissions of the authenticated caller.
async fn require_permission(req: Request, next: middleware::Next) -> Result<Response> {
    authorize(
        req.extensions().get::<Identity>(),
        req.method(),
        Resource::USERS,
    )?;

    Ok(next.run(req).await)
}

/// Path IDs that are not numbers match no user.
fn parse_id(user_id: &str) -> Result<i64> {
    user_id.parse().map_err(|_| ServerError::NotFound)
}

pub fn router(state: AppState) -> Router<AppState> {
    let accounts = Router::new()
        // `GET /users/` goes to `list`, `POST /users/` to `create`.
        .route("/users/", get(list::handler).post(create::handler))
        .route(
            "/users/{user_id}/",
            get(get::handler)
                .patch(update::handler)
                .delete(delete::handler),
        )
        .route_layer(middleware::from_fn(require_permission));

    Router::new()
        // `POST /users/password/` only needs a valid token.
        .route("/users/password/", post(router::password::handler))
        .merge(accounts)
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}
