//! Activo is an account manager: registration, token authentication and
//! permission-gated user administration.

#![forbid(unsafe_code)]
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod mail;
pub mod messages;
pub mod permission;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

const SECRET_KEY: &str = "SECRET_KEY";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: user::UserService,
    pub token: token::TokenManager,
    pub mail: mail::MailManager,
    pub catalog: Arc<messages::ErrorCatalog>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        // `POST /users/login/` goes to `login`.
        .route("/users/login/", post(router::login::handler))
        .route("/users/login/refresh/", post(router::refresh::handler))
        .merge(router::users::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    path: Option<PathBuf>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let config = config::Configuration::default()
        .path(path.unwrap_or_default())
        .read()?;

    let Some(postgres) = &config.postgres else {
        tracing::error!("missing `postgres` entry on `config.yaml` file");
        return Err(ServerError::Internal {
            details: "missing `postgres` configuration".into(),
            source: None,
        }
        .into());
    };
    let db = database::Database::from_config(postgres).await?;

    let crypto = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let catalog = Arc::new(messages::ErrorCatalog::with_overrides(
        config.messages.as_ref(),
    ));
    let users = user::UserService::new(
        Arc::new(user::PostgresUserRepository::new(db.postgres.clone())),
        crypto,
        Arc::clone(&catalog),
    );

    // handle jwt.
    let secret = std::env::var(SECRET_KEY)
        .ok()
        .or_else(|| config.token.as_ref().and_then(|t| t.secret.clone()))
        .filter(|secret| !secret.is_empty());
    let Some(secret) = secret else {
        tracing::error!("missing `token.secret` entry or `SECRET_KEY` variable");
        return Err(ServerError::Internal {
            details: "missing token secret".into(),
            source: None,
        }
        .into());
    };
    let mut token = token::TokenManager::new(&config.url, &secret);
    if let Some(cfg) = &config.token {
        if let Some(audience) = &cfg.audience {
            token.audience(audience);
        }
        token.lifetimes(cfg.access_lifetime, cfg.refresh_lifetime);
    }

    // handle mail sender.
    let (queue, sender) = match &config.mail {
        Some(cfg) => {
            let queue: Arc<dyn mail::JobQueue> =
                Arc::new(mail::RabbitMqQueue::new(cfg).await?);
            (Some(queue), cfg.sender.clone())
        },
        None => {
            tracing::warn!("missing `mail` entry on `config.yaml` file, mails are disabled");
            (None, None)
        },
    };
    let mail = mail::MailManager::new(&config.name, sender, queue)?;

    let metrics = if config.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(AppState {
        config,
        users,
        token,
        mail,
        catalog,
        metrics,
    })
}
