use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::body::{to_bytes, Body as AxumBody};
use axum::extract::{Request as AxumRequest, State};
use axum::response::Response as AxumResponse;
use axum::Router;
use lambda_http::http::StatusCode;
use lambda_http::{Body, Response};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::app_error::AppError;
use crate::runtime_context::RuntimeContext;
use crate::slack_requests::{body_bytes, error_response, SlackRequestHandler};

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct ServerState {
    request_handler: Arc<SlackRequestHandler>,
    read_timeout: Duration,
}

/// Standalone HTTP server forwarding every request to the shared handler chain.
pub struct LocalServer {
    runtime_context: Arc<RuntimeContext>,
    request_handler: Arc<SlackRequestHandler>,
}

impl LocalServer {
    pub fn new(runtime_context: &Arc<RuntimeContext>, request_handler: &Arc<SlackRequestHandler>) -> Arc<Self> {
        let server = Self {
            runtime_context: Arc::clone(runtime_context),
            request_handler: Arc::clone(request_handler),
        };
        Arc::new(server)
    }

    fn router(&self) -> Router {
        let local = &self.runtime_context.config().local;
        let state = ServerState {
            request_handler: Arc::clone(&self.request_handler),
            read_timeout: local.read_timeout(),
        };
        Router::new()
            .fallback(forward)
            .with_state(state)
            .layer(TimeoutLayer::new(local.write_timeout()))
    }

    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let local = &self.runtime_context.config().local;
        let addr = SocketAddr::from(([0, 0, 0, 0], local.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {addr}"))?;
        info!(%addr, "local server listening");

        let shutdown = CancellationToken::new();
        let server = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());
        let mut server_task = tokio::spawn(async move { server.await });

        tokio::select! {
            result = &mut server_task => {
                return result.context("server task failed")?.context("local server failure");
            }
            signal = shutdown_signal() => signal?,
        }

        shutdown.cancel();
        let deadline = local.shutdown_timeout();
        match timeout(deadline, server_task).await {
            Ok(result) => result.context("server task failed")?.context("local server failure")?,
            Err(_) => bail!("graceful shutdown did not finish within {:?}", deadline),
        }
        info!("local server stopped");
        Ok(())
    }
}

async fn forward(State(state): State<ServerState>, request: AxumRequest) -> AxumResponse {
    let (parts, body) = request.into_parts();
    let bytes = match timeout(state.read_timeout, to_bytes(body, MAX_BODY_BYTES)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(error)) => {
            warn!(error = %error, path = %parts.uri.path(), "failed to read request body");
            return into_axum_response(error_response(&AppError::bad_request("Invalid request body")));
        }
        Err(_) => {
            warn!(path = %parts.uri.path(), "timed out reading request body");
            let error = AppError::client(StatusCode::REQUEST_TIMEOUT, "Request timeout");
            return into_axum_response(error_response(&error));
        }
    };
    let body = match String::from_utf8(bytes.to_vec()) {
        Ok(text) if text.is_empty() => Body::Empty,
        Ok(text) => Body::Text(text),
        Err(error) => Body::Binary(error.into_bytes()),
    };
    let request = lambda_http::http::Request::from_parts(parts, body);
    let response = state.request_handler.handle_slack_request(request).await;
    into_axum_response(response)
}

fn into_axum_response(response: Response<Body>) -> AxumResponse {
    let (parts, body) = response.into_parts();
    AxumResponse::from_parts(parts, AxumBody::from(body_bytes(&body).to_vec()))
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to install Ctrl+C handler")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl+C handler")?;

    info!("shutdown signal received");
    Ok(())
}
