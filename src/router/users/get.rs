//! Get a single account.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::user::{Lookup, User};

pub async fn handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>> {
    let user_id = super::parse_id(&user_id)?;

    state
        .users
        .find_by(Lookup::Id(user_id))
        .await?
        .map(Json)
        .ok_or(ServerError::NotFound)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::*;

    #[tokio::test]
    async fn test_get_user_handler() {
        let state = router::state();
        let (user, token) =
            router::account(&state, "jane@example.com", &["users.view_user"]).await;
        let app = app(state);

        let path = format!("/users/{}/", user.id);
        let response =
            make_request(Some(&token), app, Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["id"], user.id);
        assert_eq!(body["email"], "jane@example.com");
        assert_eq!(body["is_active"], true);
        assert_eq!(body["groups"], json!([]));
        for hidden in ["password", "is_admin", "last_login", "should_set_password"] {
            assert!(body.get(hidden).is_none(), "{hidden}");
        }
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let state = router::state();
        let (_, token) = router::account(&state, "jane@example.com", &["users.view_user"]).await;
        let app = app(state);

        for path in ["/users/999/", "/users/abc/"] {
            let response =
                make_request(Some(&token), app.clone(), Method::GET, path, String::default())
                    .await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body, json!({"detail": "Not found."}));
        }
    }
}
