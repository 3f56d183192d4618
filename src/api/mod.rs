use anyhow::{Context, Result};
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
};
use secrecy::SecretString;
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::PropagateRequestIdLayer,
    set_header::{SetRequestHeaderLayer, SetResponseHeaderLayer},
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;

use crate::{
    auth::{
        ClaimsIssuer, HashParams, PasswordHasher, authenticate, require_authentication,
        users::{Credentials, PgUserStore, UserStore},
    },
    csrf::{CsrfConfig, csrf_protect},
    db::{self, PoolConfig},
    session::{self, PgSessionStore, SessionConfig, SessionManager, SessionStore, load_and_save},
};

mod error;
pub mod handlers;
mod openapi;
mod recover;

pub use self::{error::ApiError, openapi::openapi};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_SESSION_CLEANUP_SECONDS: u64 = 300;
const DEFAULT_CLAIMS_TTL_SECONDS: i64 = 3600;

/// Server settings assembled by the CLI.
#[derive(Clone, Debug)]
pub struct AppConfig {
    port: u16,
    pool: PoolConfig,
    store_timeout: Duration,
    session: SessionConfig,
    session_cleanup_interval: Duration,
    hash_params: HashParams,
    hash_concurrency: Option<NonZeroUsize>,
    claims_ttl_seconds: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            pool: PoolConfig::default(),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
            session: SessionConfig::default(),
            session_cleanup_interval: Duration::from_secs(DEFAULT_SESSION_CLEANUP_SECONDS),
            hash_params: HashParams::default(),
            hash_concurrency: None,
            claims_ttl_seconds: DEFAULT_CLAIMS_TTL_SECONDS,
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Zero disables the sweeper.
    #[must_use]
    pub fn with_session_cleanup_interval(mut self, interval: Duration) -> Self {
        self.session_cleanup_interval = interval;
        self
    }

    #[must_use]
    pub fn with_hash_params(mut self, params: HashParams) -> Self {
        self.hash_params = params;
        self
    }

    #[must_use]
    pub fn with_hash_concurrency(mut self, concurrency: Option<NonZeroUsize>) -> Self {
        self.hash_concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_claims_ttl_seconds(mut self, seconds: i64) -> Self {
        self.claims_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Hashing, claims and timeout settings for a user store.
    ///
    /// # Errors
    /// Returns an error if the argon2 parameters are invalid.
    pub fn credentials(&self) -> Result<Credentials> {
        let hasher = PasswordHasher::new(self.hash_params.clone(), self.hash_concurrency)
            .context("Invalid password hashing parameters")?;
        Ok(Credentials::new(hasher)
            .with_issuer(ClaimsIssuer::default().with_ttl_seconds(self.claims_ttl_seconds))
            .with_timeout(self.store_timeout))
    }
}

/// Build the application router around the given stores.
///
/// Page routes run inside the session, CSRF and authentication layers (in
/// that order); protected pages additionally pass the authentication gate.
/// Health checks and the `OpenAPI` document bypass the session machinery.
pub fn app(users: Arc<dyn UserStore>, sessions: SessionManager, csrf: CsrfConfig) -> Router {
    let (protected, _) = openapi::protected_routes().split_for_parts();
    let (public, _) = openapi::public_routes().split_for_parts();
    let (health, _) = openapi::health_routes().split_for_parts();

    let pages = public
        .merge(protected.route_layer(from_fn(require_authentication)))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(sessions, load_and_save))
                .layer(from_fn_with_state(csrf, csrf_protect))
                .layer(from_fn_with_state(users.clone(), authenticate)),
        );

    pages
        .merge(health.route("/openapi.json", get(|| async { Json(openapi()) })))
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
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-xss-protection"),
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-frame-options"),
                    HeaderValue::from_static("deny"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    HeaderName::from_static("referrer-policy"),
                    HeaderValue::from_static("origin-when-cross-origin"),
                ))
                .layer(CatchPanicLayer::custom(recover::handle_panic))
                .layer(Extension(users)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(dsn: SecretString, config: AppConfig) -> Result<()> {
    recover::install_panic_hook();

    let pool = db::connect(&dsn, &config.pool).await?;

    // Building the hasher spends one full argon2 hash.
    let credentials = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || config.credentials()).await??
    };
    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone(), credentials));
    let session_store: Arc<dyn SessionStore> =
        Arc::new(PgSessionStore::new(pool).with_timeout(config.store_timeout));

    let sweeper = (!config.session_cleanup_interval.is_zero()).then(|| {
        session::spawn_sweeper(session_store.clone(), config.session_cleanup_interval)
    });

    let csrf = CsrfConfig::default().with_cookie_secure(config.session.cookie_secure());
    let sessions = SessionManager::new(session_store, config.session.clone());
    let app = app(users, sessions, csrf);

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

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
