use crate::{
    auth::{session::spawn_session_sweeper, AuthConfig, AuthService},
    store::{
        memory::{MemoryCredentialStore, MemorySessionStore},
        postgres::{PgCredentialStore, PgSessionStore},
        CredentialStore, SessionStore,
    },
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, warn, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{admin, health, injection, login, members, root, session, signup};

/// Where users and sessions live.
#[derive(Debug)]
pub enum StoreBackend {
    /// Process-local maps; everything is lost on restart.
    Memory,
    Postgres { dsn: String, max_connections: u32 },
}

/// Build the application router around `service`.
#[must_use]
pub fn router(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
        .route("/logout", get(session::logout))
        .route("/members", get(members::members))
        .route("/admin", get(admin::list_users).post(admin::change_role))
        .route("/nosql-injection", get(injection::nosql_injection))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(service)),
        )
}

async fn connect_stores(
    backend: StoreBackend,
) -> Result<(Arc<dyn CredentialStore>, Arc<dyn SessionStore>)> {
    match backend {
        StoreBackend::Memory => {
            warn!("Using in-memory stores, users and sessions are lost on restart");
            let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
            let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            Ok((credentials, sessions))
        }
        StoreBackend::Postgres {
            dsn,
            max_connections,
        } => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(max_connections)
                .max_lifetime(Duration::from_secs(60 * 2))
                .acquire_timeout(Duration::from_secs(5))
                .test_before_acquire(true)
                .connect(&dsn)
                .await
                .context("Failed to connect to database")?;
            let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));
            let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
            Ok((credentials, sessions))
        }
    }
}

/// Start the server
/// # Errors
/// Return error if the stores cannot be reached or the server fails to start
pub async fn new(
    port: u16,
    backend: StoreBackend,
    auth_config: AuthConfig,
    session_secret: SecretString,
) -> Result<()> {
    let (credentials, sessions) = connect_stores(backend).await?;
    let service = Arc::new(AuthService::new(
        credentials,
        sessions,
        auth_config,
        session_secret,
    )?);

    if let Some(interval) = service.config().session_sweep_interval() {
        spawn_session_sweeper(service.sessions().clone(), interval);
    }

    let app = router(service);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_connects() -> anyhow::Result<()> {
        let (credentials, _sessions) = connect_stores(StoreBackend::Memory).await?;
        credentials.ping().await?;
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_database_fails_fast() {
        let backend = StoreBackend::Postgres {
            dsn: "postgres://invalid@127.0.0.1:1/invalid?sslmode=disable".to_string(),
            max_connections: 1,
        };
        let result = connect_stores(backend).await;
        assert!(result.is_err());
    }
}
