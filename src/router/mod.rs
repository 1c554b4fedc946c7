//! HTTP handlers.
pub mod login;
pub mod password;
pub mod refresh;
pub mod status;
pub mod users;

use axum::extract::FromRequest;
use validator::{ValidationError, ValidationErrors};

use crate::ServerError;
use crate::user::validation::Text;

/// JSON body whose rejection is rendered as a [`ServerError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct JsonBody<T>(pub T);

/// Read a mandatory string of a request body.
///
/// An unusable value is recorded under `key` and `None` is returned.
pub fn required<'a>(
    errors: &mut ValidationErrors,
    key: &'static str,
    value: &'a Text,
) -> Option<&'a str> {
    let (code, message) = match value {
        Text::Value(value) if !value.is_empty() => return Some(value.as_str()),
        Text::Value(_) => ("blank", "This field may not be blank."),
        Text::Missing => ("required", "This field is required."),
        Text::Invalid => ("invalid", "Not a valid string."),
    };

    errors.add(key, ValidationError::new(code).with_message(message.into()));
    None
}

#[cfg(test)]
pub(crate) const PASSWORD: &str = "StRong_PaÂ§$W0rD";

/// Application state backed by memory.
#[cfg(test)]
pub(crate) fn state() -> crate::AppState {
    use std::sync::Arc;

    use crate::config::Configuration;
    use crate::mail::MailManager;
    use crate::messages::ErrorCatalog;
    use crate::token::TokenManager;

    let mut config = Configuration::default();
    config.name = "activo".into();
    config.url = "https://accounts.example.com/".into();

    crate::AppState {
        users: crate::user::test_service(),
        token: TokenManager::new(&config.url, "secret"),
        mail: MailManager::new(&config.name, None, None).unwrap(),
        catalog: Arc::new(ErrorCatalog::default()),
        metrics: None,
        config: Arc::new(config),
    }
}

/// Create an active account holding `permissions`, returning an access token.
#[cfg(test)]
pub(crate) async fn account(
    state: &crate::AppState,
    email: &str,
    permissions: &[&str],
) -> (crate::user::User, String) {
    let user = state
        .users
        .create_user(email, Some(PASSWORD), Default::default())
        .await
        .unwrap();
    for permission in permissions {
        state.users.grant(&user, permission).await.unwrap();
    }

    let token = state.token.pair(&user.id.to_string()).unwrap();
    (user, token.access_token)
}
