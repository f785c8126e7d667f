use anyhow::{anyhow, Context, Result};
use argon2::Params;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;

use crate::{
    auth::{
        cleanup::spawn_ledger_cleanup, AuthConfig, Authenticator, CredentialVerifier, SystemClock,
    },
    store::{PgStore, StoreHealth},
};

pub mod handlers;
pub mod openapi;

pub use handlers::ProxyPolicy;
pub use openapi::openapi;

/// HTTP-facing settings that do not belong to the login core.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub frontend_base_url: String,
    pub trust_proxy_headers: bool,
}

/// Build the routes with request id and tracing layers.
///
/// CORS is added by the server so tests can drive the bare router.
pub fn router(
    auth: Arc<Authenticator>,
    store: Arc<dyn StoreHealth>,
    policy: ProxyPolicy,
) -> Router {
    use handlers::{audit, auth as login};

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/v1/auth/login", post(login::login))
        .route("/v1/auth/logout", post(login::logout))
        .route("/v1/auth/me", get(login::me))
        .route("/v1/auth/password", post(login::change_password))
        .route("/v1/audit", get(audit::list_audit).delete(audit::clear_audit))
        .route("/v1/login-attempts", get(audit::list_login_attempts))
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
                .layer(Extension(auth))
                .layer(Extension(store))
                .layer(Extension(policy)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, auth_config: AuthConfig, http: HttpConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool));
    let verifier = CredentialVerifier::new(Params::default())
        .map_err(|err| anyhow!("Failed to initialize password hashing: {err}"))?;
    let auth = Arc::new(Authenticator::new(
        store.clone(),
        Arc::new(SystemClock),
        verifier,
        auth_config,
    ));

    // Prunes the attempt ledger on `ledger_cleanup_interval`.
    let cleanup = spawn_ledger_cleanup(auth.clone());

    let frontend_origin = frontend_origin(&http.frontend_base_url)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let policy = ProxyPolicy {
        trust_forwarded_headers: http.trust_proxy_headers,
    };
    let app = router(auth, store, policy).layer(cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    cleanup.abort();

    Ok(())
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

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
