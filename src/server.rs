//! OAI-PMH HTTP endpoint.
//!
//! Serves the protocol over GET and POST on a single route, selecting the
//! institution from the `Host` header.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `{server.path}` | Request with query-string arguments |
//! | `POST` | `{server.path}` | Request with `application/x-www-form-urlencoded` body |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Status codes
//!
//! Every protocol outcome, including OAI errors such as `badVerb`, is an
//! HTTP 200 with `Content-Type: text/xml; charset=UTF-8`. Non-200 statuses
//! are reserved for failures that prevent a response document:
//!
//! | Status | Cause |
//! |--------|-------|
//! | 404 | host matches no institution and no default is configured |
//! | 500 | response rendering failed |
//! | 503 | catalog unavailable |
//! | 504 | request exceeded `harvest.request_timeout_secs` |

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::catalog_sqlite::SqliteCatalog;
use crate::config::Config;
use crate::error::ResponderError;
use crate::formats::MetadataFormatRegistry;
use crate::institution::{ConfiguredInstitutions, InstitutionResolver};
use crate::models::InstitutionScope;
use crate::protocol::{Arguments, ProtocolError, CONTENT_TYPE};
use crate::responder::Responder;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    responder: Arc<Responder>,
    institutions: Arc<dyn InstitutionResolver>,
}

/// Starts the HTTP server on `[server].bind` against the SQLite catalog.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let catalog = SqliteCatalog::connect(config).await?;
    let app = router(config, Arc::new(catalog));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, path = %config.server.path, "listening");
    println!(
        "OAI-PMH endpoint listening on http://{}{}",
        config.server.bind, config.server.path
    );
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds a responder over `catalog` using the `[harvest]` settings.
pub fn build_responder(config: &Config, catalog: Arc<dyn Catalog>) -> Responder {
    Responder::new(
        catalog,
        Arc::new(MetadataFormatRegistry::with_builtins()),
        config.harvest.page_size,
        Duration::from_secs(config.harvest.request_timeout_secs),
    )
}

/// The application router, without a listener. Integration tests bind it to
/// an ephemeral port.
pub fn router(config: &Config, catalog: Arc<dyn Catalog>) -> Router {
    let state = AppState {
        responder: Arc::new(build_responder(config, catalog)),
        institutions: Arc::new(ConfiguredInstitutions::from_config(config)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&config.server.path, get(handle_get).post(handle_post))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answers one request without a server and prints the XML.
///
/// `host` selects the institution the same way the `Host` header does;
/// without it the default institution answers, or the first configured one.
pub async fn run_request(config: &Config, query: &str, host: Option<&str>) -> anyhow::Result<()> {
    let institutions = ConfiguredInstitutions::from_config(config);
    let scope = match host {
        Some(host) => institutions.resolve(host),
        None => config
            .server
            .default_institution
            .as_deref()
            .or_else(|| config.institutions.keys().next().map(String::as_str))
            .and_then(|key| institutions.by_key(key)),
    }
    .ok_or_else(|| ResponderError::UnknownInstitution(host.unwrap_or_default().to_string()))?;

    let catalog = SqliteCatalog::connect(config).await?;
    let responder = build_responder(config, Arc::new(catalog));
    let query = query.trim_start_matches('?');
    let xml = responder
        .respond(&scope, &Arguments::parse_form(query.as_bytes()))
        .await?;
    println!("{}", xml);
    Ok(())
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response.
struct AppError(ResponderError);

impl From<ResponderError> for AppError {
    fn from(err: ResponderError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", self.0);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
            self.0.to_string(),
        )
            .into_response()
    }
}

fn xml_response(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

fn resolve_scope(state: &AppState, headers: &HeaderMap) -> Result<InstitutionScope, AppError> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    state
        .institutions
        .resolve(host)
        .ok_or_else(|| ResponderError::UnknownInstitution(host.to_string()).into())
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET|POST {server.path} ============

async fn handle_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let scope = resolve_scope(&state, &headers)?;
    let arguments = Arguments::parse_form(query.unwrap_or_default().as_bytes());
    let xml = state.responder.respond(&scope, &arguments).await?;
    Ok(xml_response(xml))
}

/// POST arguments must be form-encoded; any other body is answered with a
/// `badArgument` document rather than parsed.
async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let scope = resolve_scope(&state, &headers)?;

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));
    if !is_form {
        let xml = state.responder.reject(
            &scope,
            &[ProtocolError::unsupported_content_type()],
            &Arguments::new(),
        )?;
        return Ok(xml_response(xml));
    }

    let arguments = Arguments::parse_form(&body);
    let xml = state.responder.respond(&scope, &arguments).await?;
    Ok(xml_response(xml))
}
