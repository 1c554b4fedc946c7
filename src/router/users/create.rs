//! Register an account on behalf of its owner.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;
use crate::crypto::initial_password;
use crate::error::Result;
use crate::router::JsonBody;
use crate::telemetry;
use crate::user::User;
use crate::user::validation::{Mode, UserForm, Validator};

#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(flatten)]
    pub user: User,
    pub initial_password: String,
    pub should_set_password: bool,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<UserForm>,
) -> Result<(StatusCode, Json<Response>)> {
    let mut cleaned = Validator::new(&state.users, &state.catalog)
        .validate(form, Mode::Create)
        .await?;
    let profile = cleaned.profile();
    let email = cleaned.email.take().unwrap_or_default();

    let user = state.users.create_user(&email, None, profile).await?;

    let password = initial_password();
    let user = state.users.set_password(user.id, &password, true).await?;
    telemetry::account_created();

    match state.mail.welcome(&user, &password) {
        Ok(message) => {
            state.mail.dispatch(message);
        },
        Err(err) => {
            tracing::error!(user_id = user.id, error = %err, "welcome mail not rendered")
        },
    }

    Ok((
        StatusCode::CREATED,
        Json(Response {
            should_set_password: user.should_set_password,
            initial_password: password.as_str().to_owned(),
            user,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::mail::{JobQueue, MailManager, RecordingQueue};
    use crate::user::Lookup;
    use crate::*;

    fn body(groups: Value) -> String {
        json!({
            "first_name": "John",
            "last_name": "Doe",
            "email": "John.Doe@Example.com",
            "phone_number": "+33 6 12 34 56 78",
            "id_number": "AB123",
            "groups": groups,
        })
        .to_string()
    }

    async fn json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_handler() {
        let mut state = router::state();
        let queue = Arc::new(RecordingQueue::default());
        state.mail = MailManager::new(
            "activo",
            None,
            Some(Arc::clone(&queue) as Arc<dyn JobQueue>),
        )
        .unwrap();
        let group = state.users.create_group("staff", &[]).await.unwrap();
        let (_, token) = router::account(&state, "admin@example.com", &["users.add_user"]).await;
        let app = app(state.clone());

        let response = make_request(
            Some(&token),
            app,
            Method::POST,
            "/users/",
            body(json!([group.id])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json(response).await;
        let password = body["initial_password"].as_str().unwrap().to_owned();
        assert_eq!(password.len(), 8);
        assert!(password.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(body["should_set_password"], true);
        assert_eq!(body["email"], "john.doe@example.com");
        assert_eq!(body["groups"], json!([{"id": group.id, "name": "staff"}]));
        assert_eq!(body["is_active"], true);
        assert_eq!(body["is_staff"], false);
        assert_eq!(body["is_superuser"], false);

        let user = state
            .users
            .find_by(Lookup::Email("john.doe@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert!(user.should_set_password);
        assert!(state.users.check_password(&user, &password));

        // Welcome mail is sent in background.
        for _ in 0..100 {
            if !queue.payloads.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let payloads = queue.payloads.lock().unwrap();
        assert_eq!(payloads[0]["data"]["to"], "john.doe@example.com");
        assert!(
            payloads[0]["data"]["body"]
                .as_str()
                .unwrap()
                .contains(&password)
        );
    }

    #[tokio::test]
    async fn test_queue_failure_keeps_account() {
        let mut state = router::state();
        let queue = Arc::new(RecordingQueue {
            fail: true,
            ..Default::default()
        });
        state.mail = MailManager::new("activo", None, Some(queue as Arc<dyn JobQueue>)).unwrap();
        let (_, token) = router::account(&state, "admin@example.com", &["users.add_user"]).await;
        let app = app(state.clone());

        let response =
            make_request(Some(&token), app, Method::POST, "/users/", body(json!([]))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(
            state
                .users
                .exists_by(Lookup::Email("john.doe@example.com"), None)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_initial_passwords_differ() {
        let state = router::state();
        let (_, token) = router::account(&state, "admin@example.com", &["users.add_user"]).await;
        let app = app(state);

        let first = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/users/",
            body(json!([])),
        )
        .await;
        let first = json(first).await;

        let second = json!({
            "first_name": "Jane",
            "last_name": "Doe",
            "email": "jane@example.com",
            "phone_number": "+33700000000",
            "id_number": "CD456",
            "groups": [],
        });
        let second =
            make_request(Some(&token), app, Method::POST, "/users/", second.to_string()).await;
        assert_eq!(second.status(), StatusCode::CREATED);
        let second = json(second).await;

        assert_ne!(first["id"], second["id"]);
        // Collisions are possible but one in 10^8.
        assert_ne!(first["initial_password"], second["initial_password"]);
    }

    #[tokio::test]
    async fn test_invalid_body_writes_nothing() {
        let state = router::state();
        let (_, token) = router::account(&state, "admin@example.com", &["users.add_user"]).await;
        let app = app(state.clone());

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/users/",
            json!({"email": "admin@example.com", "phone_number": "12"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await,
            json!({
                "first_name": ["First name is required"],
                "last_name": ["Last name is required"],
                "email": ["The provided email already exists"],
                "phone_number": ["The provided phone number is invalid"],
                "id_number": ["ID number is required"],
                "groups": ["Groups are required"],
            })
        );
        assert_eq!(state.users.list().await.unwrap().len(), 1);

        let response = make_request(
            Some(&token),
            app,
            Method::POST,
            "/users/",
            body(json!([42])),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await,
            json!({"groups": ["The provided group does not exist"]})
        );
    }

    #[tokio::test]
    async fn test_wrong_type_is_a_field_error() {
        let state = router::state();
        let (_, token) = router::account(&state, "admin@example.com", &["users.add_user"]).await;
        let app = app(state.clone());

        let mut value: Value = serde_json::from_str(&body(json!([]))).unwrap();
        value["first_name"] = json!(123);
        value["phone_number"] = json!("12");
        let response =
            make_request(Some(&token), app, Method::POST, "/users/", value.to_string()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json(response).await,
            json!({
                "first_name": ["The provided first name is invalid"],
                "phone_number": ["The provided phone number is invalid"],
            })
        );
        assert_eq!(state.users.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_requires_add_permission() {
        let state = router::state();
        let (_, token) = router::account(&state, "admin@example.com", &["users.view_user"]).await;
        let app = app(state.clone());

        let response =
            make_request(Some(&token), app, Method::POST, "/users/", body(json!([]))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.users.list().await.unwrap().len(), 1);
    }
}
