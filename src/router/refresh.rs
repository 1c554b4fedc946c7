//! Get a new access token with a refresh token.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use crate::error::{Result, ServerError};
use crate::router::{JsonBody, required};
use crate::token::TokenType;
use crate::user::Lookup;
use crate::user::validation::Text;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Body {
    refresh_token: Text,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub access_token: String,
}

pub async fn handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Body>,
) -> Result<Json<Response>> {
    let mut errors = ValidationErrors::new();
    let Some(token) = required(&mut errors, "refresh_token", &body.refresh_token) else {
        return Err(errors.into());
    };
    let claims = state
        .token
        .decode(token, TokenType::Refresh)
        .map_err(|_| ServerError::InvalidRefreshToken)?;

    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| ServerError::InvalidRefreshToken)?;
    match state.users.find_by(Lookup::Id(user_id)).await? {
        Some(user) if user.is_active => (),
        _ => return Err(ServerError::InvalidRefreshToken),
    }

    Ok(Json(Response {
        access_token: state.token.derive_access(&claims)?,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use super::Response;
    use crate::token::TokenType;
    use crate::*;

    #[tokio::test]
    async fn test_refresh_handler() {
        let state = router::state();
        let (user, _) = router::account(&state, "jane@example.com", &[]).await;
        let pair = state.token.pair(&user.id.to_string()).unwrap();
        let app = app(state.clone());

        let response = make_request(
            None,
            app,
            Method::POST,
            "/users/login/refresh/",
            json!({"refresh_token": pair.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Response = serde_json::from_slice(&body).unwrap();
        let claims = state
            .token
            .decode(&body.access_token, TokenType::Access)
            .unwrap();
        assert_eq!(claims.sub, user.id.to_string());
    }

    #[tokio::test]
    async fn test_access_token_is_refused() {
        let state = router::state();
        let (user, access_token) = router::account(&state, "jane@example.com", &[]).await;
        let app = app(state.clone());

        for token in [access_token.as_str(), "garbage"] {
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/users/login/refresh/",
                json!({"refresh_token": token}).to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["detail"], "Token is invalid or expired");
        }

        // Deleted users cannot refresh.
        let pair = state.token.pair(&user.id.to_string()).unwrap();
        state.users.delete(user.id).await.unwrap();
        let response = make_request(
            None,
            app,
            Method::POST,
            "/users/login/refresh/",
            json!({"refresh_token": pair.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unusable_body() {
        let app = app(router::state());

        for (body, message) in [
            (json!({}), "This field is required."),
            (json!({"refresh_token": ""}), "This field may not be blank."),
            (json!({"refresh_token": 7}), "Not a valid string."),
        ] {
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/users/login/refresh/",
                body.to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body, json!({"refresh_token": [message]}));
        }
    }
}
