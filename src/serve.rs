//! Purpose: Provide the HTTP/JSON surface for decoding and history.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum server wrapping the pure decoder and the SQLite history log.
//! Invariants: Successful decodes return a bare JSON array; errors use one envelope.
//! Invariants: A failed history write never changes a successful decode response.
//! Notes: SQLite access runs on the blocking pool; the decoder runs inline.

use axum::Json;
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use alchemist::api::{DEFAULT_HISTORY_LIMIT, Error, ErrorKind, HistoryStore, decode};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DB_PATH: &str = "alchemist.sqlite3";
pub const DEFAULT_MAX_INPUT_LEN: usize = 2000;
pub const DEFAULT_MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub max_input_len: usize,
    pub max_history_limit: usize,
}

#[derive(Clone)]
struct AppState {
    store: HistoryStore,
    max_input_len: usize,
    max_history_limit: usize,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let store = HistoryStore::open(&config.db_path)?;
    let state = Arc::new(AppState {
        store,
        max_input_len: config.max_input_len,
        max_history_limit: config.max_history_limit,
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_hint("Choose a free address with --bind.")
                .with_source(err)
        })?;
    let local_addr = listener.local_addr().unwrap_or(config.bind);
    info!(
        bind = %local_addr,
        db = %config.db_path.display(),
        "alchemist server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("server failed")
                .with_source(err)
        })?;
    info!("alchemist server stopped");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/convert-measurements", get(convert_measurements))
        .route("/history", get(history))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if config.max_input_len == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-input-len must be greater than zero")
            .with_hint("Use a positive value like 2000."));
    }
    if config.max_history_limit == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-history-limit must be greater than zero")
            .with_hint("Use a positive value like 1000."));
    }
    if config.db_path.as_os_str().is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--db must not be empty")
            .with_hint("Pass a file path for the history database."));
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct ConvertQuery {
    input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
}

async fn convert_measurements(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(query_error(rejection)),
    };
    let input = match query.input {
        Some(input) if !input.is_empty() => input,
        _ => {
            return error_response(
                Error::new(ErrorKind::Usage)
                    .with_message("input parameter is required")
                    .with_hint("Call /convert-measurements?input=<letters>."),
            );
        }
    };
    if input.chars().count() > state.max_input_len {
        return error_response(
            Error::new(ErrorKind::Usage)
                .with_message("input exceeds server limit")
                .with_hint(format!("Use at most {} characters.", state.max_input_len)),
        );
    }

    let packages = match decode(&input) {
        Ok(packages) => packages,
        Err(err) => return error_response(err),
    };

    let store = state.store.clone();
    let output = packages.clone();
    let recorded = tokio::task::spawn_blocking(move || store.record(&input, &output)).await;
    match recorded {
        Ok(Ok(entry)) => debug!(id = entry.id, packages = packages.len(), "recorded conversion"),
        Ok(Err(err)) => error!(error = %err, "failed to record conversion"),
        Err(err) => error!(error = %err, "history write task failed"),
    }

    (StatusCode::OK, Json(packages)).into_response()
}

async fn history(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return error_response(query_error(rejection)),
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(state.max_history_limit);

    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || store.recent(limit)).await;
    match result {
        Ok(Ok(entries)) => Json(json!({
            "total_records": entries.len(),
            "history": entries,
        }))
        .into_response(),
        Ok(Err(err)) => {
            error!(error = %err, "failed to read history");
            error_response(err)
        }
        Err(err) => error_response(
            Error::new(ErrorKind::Internal)
                .with_message("history read task failed")
                .with_source(err),
        ),
    }
}

async fn health() -> Response {
    match OffsetDateTime::now_utc().format(&Rfc3339) {
        Ok(timestamp) => Json(json!({ "status": "healthy", "timestamp": timestamp })).into_response(),
        Err(err) => error_response(
            Error::new(ErrorKind::Internal)
                .with_message("timestamp format failed")
                .with_source(err),
        ),
    }
}

async fn not_found() -> Response {
    error_response(Error::new(ErrorKind::NotFound).with_message("endpoint not found"))
}

fn query_error(rejection: QueryRejection) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(rejection.body_text())
        .with_hint("Check query parameter names and types.")
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Storage | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            offset: err.offset(),
        },
    };
    (status, Json(body)).into_response()
}
