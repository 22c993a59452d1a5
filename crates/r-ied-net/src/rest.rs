//! ---
//! ied_section: "05-networking-external-interfaces"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "HTTP transport for the query port."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::TextEncoder;
use r_ied_model::{ErrorCode, QueryPort, QueryResult};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::metrics::IedMetrics;

/// HTTP status returned for each query error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::NotALeaf => StatusCode::CONFLICT,
        ErrorCode::WrongDepth => StatusCode::BAD_REQUEST,
        ErrorCode::BadValue => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

struct RestState {
    port: QueryPort,
    scope: Option<String>,
    metrics: Option<IedMetrics>,
}

impl RestState {
    /// Request path with the configured IED prepended.
    fn scoped(&self, path: &str) -> String {
        match &self.scope {
            Some(ied) => {
                let rest = path.trim_matches(|c| c == '/' || c == '.');
                if rest.is_empty() {
                    ied.clone()
                } else {
                    format!("{ied}/{rest}")
                }
            }
            None => path.to_owned(),
        }
    }

    fn reply<T: Serialize>(&self, op: &'static str, result: QueryResult<T>) -> Response {
        match result {
            Ok(body) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_query(op, None);
                }
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_query(op, Some(err.code));
                }
                (status_for(err.code), Json(err)).into_response()
            }
        }
    }
}

/// Builder used to configure and spawn the REST API server.
#[derive(Clone)]
pub struct RestApiBuilder {
    listen: SocketAddr,
    port: QueryPort,
    scope: Option<String>,
    metrics: Option<IedMetrics>,
}

impl RestApiBuilder {
    pub fn new(listen: SocketAddr, port: QueryPort) -> Self {
        Self {
            listen,
            port,
            scope: None,
            metrics: None,
        }
    }

    /// Resolve request paths below `ied` so clients address `/C1/LN0...`.
    pub fn with_scope(mut self, ied: Option<String>) -> Self {
        self.scope = ied;
        self
    }

    /// Count queries and expose the registry at `/metrics`.
    pub fn with_metrics(mut self, metrics: IedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn router(self) -> Router {
        let state = RestState {
            port: self.port,
            scope: self.scope,
            metrics: self.metrics,
        };
        Router::new()
            .route("/", get(get_values_root))
            .route("/values", get(get_values_root))
            .route("/values/", get(get_values_root))
            .route("/values/*path", get(get_values))
            .route("/value/*path", get(get_value).post(post_value))
            .route("/definition", get(get_definition_root))
            .route("/definition/", get(get_definition_root))
            .route("/definition/*path", get(get_definition))
            .route("/directory", get(get_directory_root))
            .route("/directory/", get(get_directory_root))
            .route("/directory/*path", get(get_directory))
            .route("/metrics", get(get_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::new(state))
    }

    /// Spawn the REST API server and return a handle that can be awaited for shutdown.
    pub async fn spawn(self) -> anyhow::Result<RestApiHandle> {
        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, scope = ?self.scope, "rest api listening");

        let router = self.router();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "rest api server exited with error");
            }
        });

        Ok(RestApiHandle {
            address: local_addr,
            task,
            shutdown: shutdown_tx,
        })
    }
}

/// Handle returned from [`RestApiBuilder::spawn`].
pub struct RestApiHandle {
    address: SocketAddr,
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl RestApiHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Request graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(()) => Ok(()),
            Err(join) => Err(anyhow::anyhow!(join)),
        }
    }
}

async fn get_values_root(State(state): State<Arc<RestState>>) -> Response {
    let path = state.scoped("");
    state.reply("values", state.port.handle_values(&path))
}

async fn get_values(State(state): State<Arc<RestState>>, Path(path): Path<String>) -> Response {
    let path = state.scoped(&path);
    state.reply("values", state.port.handle_values(&path))
}

async fn get_value(State(state): State<Arc<RestState>>, Path(path): Path<String>) -> Response {
    let path = state.scoped(&path);
    state.reply("get", state.port.handle_get(&path))
}

async fn post_value(
    State(state): State<Arc<RestState>>,
    Path(path): Path<String>,
    body: String,
) -> Response {
    let path = state.scoped(&path);
    state.reply("set", state.port.handle_set(&path, &body))
}

async fn get_definition_root(State(state): State<Arc<RestState>>) -> Response {
    let path = state.scoped("");
    state.reply("definition", state.port.handle_definition(&path))
}

async fn get_definition(
    State(state): State<Arc<RestState>>,
    Path(path): Path<String>,
) -> Response {
    let path = state.scoped(&path);
    state.reply("definition", state.port.handle_definition(&path))
}

async fn get_directory_root(State(state): State<Arc<RestState>>) -> Response {
    let path = state.scoped("");
    state.reply("directory", state.port.handle_directory(&path))
}

async fn get_directory(State(state): State<Arc<RestState>>, Path(path): Path<String>) -> Response {
    let path = state.scoped(&path);
    state.reply("directory", state.port.handle_directory(&path))
}

async fn get_metrics(State(state): State<Arc<RestState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
