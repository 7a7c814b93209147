use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use futures_util::FutureExt;
use lambda_http::http::header::CONTENT_TYPE;
use lambda_http::http::{HeaderMap, HeaderValue, Method, StatusCode};
use lambda_http::{Body, Request, Response};
use tracing::{error, info, warn};

use crate::app_error::{AppError, ErrorCategory};
use crate::runtime_context::RuntimeContext;
use crate::slack_incidents::SlackIncidentHandler;

pub const NOT_FOUND_MESSAGE: &str = "Endpoint not found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SlackCommand,
    SlackModalParser,
}

/// The handler chain shared by the local server and the Lambda adapter:
/// panic recovery, request logging, routing, signature check, then the incident handler.
pub struct SlackRequestHandler {
    runtime_context: Arc<RuntimeContext>,
    incident_handler: Arc<SlackIncidentHandler>,
}

impl SlackRequestHandler {
    pub fn new(runtime_context: &Arc<RuntimeContext>) -> Arc<Self> {
        let incident_handler = SlackIncidentHandler::new(runtime_context);
        let handler = Self {
            runtime_context: Arc::clone(runtime_context),
            incident_handler,
        };
        Arc::new(handler)
    }

    pub fn route(&self, path: &str) -> Option<Route> {
        let endpoints = &self.runtime_context.config().endpoints;
        if path == endpoints.slack_command {
            Some(Route::SlackCommand)
        } else if path == endpoints.slack_modal_parser {
            Some(Route::SlackModalParser)
        } else {
            None
        }
    }

    pub async fn handle_slack_request(&self, request: Request) -> Response<Body> {
        let started = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let response = AssertUnwindSafe(self.dispatch(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!(method = %method, path = %path, "panic recovered in request handler");
                panic_response(panic)
            });
        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration = ?started.elapsed(),
            "request processed"
        );
        response
    }

    async fn dispatch(&self, request: Request) -> Response<Body> {
        match self.process(request).await {
            Ok(response) => response,
            Err(error) => {
                log_error(&error);
                error_response(&error)
            }
        }
    }

    async fn process(&self, request: Request) -> Result<Response<Body>, AppError> {
        let route = self
            .route(request.uri().path())
            .ok_or_else(|| AppError::not_found(NOT_FOUND_MESSAGE))?;
        if request.method() != Method::POST {
            return Err(AppError::client(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
        }
        self.runtime_context.verifier().verify_request(&request)?;
        match route {
            Route::SlackCommand => self.incident_handler.handle_command(&request).await,
            Route::SlackModalParser => self.incident_handler.handle_modal_submission(&request).await,
        }
    }
}

fn log_error(error: &AppError) {
    let cause = error.cause().map(|cause| cause.to_string()).unwrap_or_default();
    match error.category() {
        ErrorCategory::Client => warn!(status = error.status().as_u16(), cause = %cause, "{}", error.message()),
        ErrorCategory::Server => error!(status = error.status().as_u16(), cause = %cause, "{}", error.message()),
    }
}

pub fn error_response(error: &AppError) -> Response<Body> {
    let mut response = Response::new(Body::from(error.message()));
    *response.status_mut() = error.status();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn panic_response(panic: Box<dyn Any + Send>) -> Response<Body> {
    let error = AppError::internal("Internal server error")
        .with_cause(anyhow!("panic recovered: {}", panic_message(panic.as_ref())));
    log_error(&error);
    error_response(&error)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub fn body_bytes(body: &Body) -> &[u8] {
    match body {
        Body::Empty => &[],
        Body::Text(text) => text.as_bytes(),
        Body::Binary(data) => data.as_slice(),
    }
}

/// Header value as text; missing, empty or non-ASCII values count as absent.
pub fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}
