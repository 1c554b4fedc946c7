//! Exchange credentials for a token pair.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::ValidationErrors;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::Result;
use crate::router::{JsonBody, required};
use crate::telemetry::{self, LoginOutcome};
use crate::user::User;
use crate::user::validation::Text;
use crate::AppState;

#[derive(Debug, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Body {
    #[serde(default)]
    email: Text,
    #[serde(default)]
    password: Text,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

pub async fn handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Body>,
) -> Result<Json<Response>> {
    let mut errors = ValidationErrors::new();
    let email = required(&mut errors, "email", &body.email);
    let password = required(&mut errors, "password", &body.password);
    let (Some(email), Some(password)) = (email, password) else {
        return Err(errors.into());
    };

    let user = match state.users.authenticate(email, password).await {
        Ok(user) => user,
        Err(err) => {
            telemetry::login(LoginOutcome::Failure);
            return Err(err);
        },
    };

    let pair = state.token.pair(&user.id.to_string())?;
    let user = state.users.record_login(user.id).await?;

    telemetry::login(LoginOutcome::Success);
    tracing::info!(user_id = user.id, "user logged in");

    Ok(Json(Response {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::router::PASSWORD;
    use crate::token::TokenType;
    use crate::user::{Lookup, User};
    use crate::*;

    async fn body(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_login_handler() {
        let state = router::state();
        let (user, _) = router::account(&state, "jane@example.com", &[]).await;
        let app = app(state.clone());

        let response = make_request(
            None,
            app,
            Method::POST,
            "/users/login/",
            json!({"email": "jane@example.com", "password": PASSWORD}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body(response).await;
        assert_eq!(body["user"]["id"], user.id);
        assert_eq!(body["user"]["email"], "jane@example.com");
        assert!(body["user"].get("password").is_none());

        let access = state
            .token
            .decode(body["access_token"].as_str().unwrap(), TokenType::Access)
            .unwrap();
        let refresh = state
            .token
            .decode(body["refresh_token"].as_str().unwrap(), TokenType::Refresh)
            .unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.sub, refresh.sub);

        let user = state.users.find_by(Lookup::Id(user.id)).await.unwrap().unwrap();
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_missing_and_blank_fields() {
        let app = app(router::state());

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/users/login/",
            json!({}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await,
            json!({
                "email": ["This field is required."],
                "password": ["This field is required."],
            })
        );

        let response = make_request(
            None,
            app,
            Method::POST,
            "/users/login/",
            json!({"email": "", "password": PASSWORD}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await,
            json!({"email": ["This field may not be blank."]})
        );
    }

    #[tokio::test]
    async fn test_fields_of_wrong_type() {
        let app = app(router::state());

        let response = make_request(
            None,
            app,
            Method::POST,
            "/users/login/",
            json!({"email": 42, "password": ["secret"]}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body(response).await,
            json!({
                "email": ["Not a valid string."],
                "password": ["Not a valid string."],
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_credentials_look_the_same() {
        let state = router::state();
        router::account(&state, "jane@example.com", &[]).await;
        let (inactive, _) = router::account(&state, "off@example.com", &[]).await;
        state
            .users
            .save(&User {
                is_active: false,
                ..inactive
            })
            .await
            .unwrap();
        state
            .users
            .create_user("nopass@example.com", None, Default::default())
            .await
            .unwrap();
        let app = app(state);

        let attempts = [
            ("jane@example.com", "wrong password"),
            ("unknown@example.com", PASSWORD),
            ("off@example.com", PASSWORD),
            ("nopass@example.com", PASSWORD),
        ];
        for (email, password) in attempts {
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/users/login/",
                json!({"email": email, "password": password}).to_string(),
            )
            .await;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{email}");
            assert_eq!(
                body(response).await,
                json!({"detail": "No active account found with the given credentials"})
            );
        }
    }
}
