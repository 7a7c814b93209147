use std::env;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app_config;
mod app_error;
mod datadog_client;
mod lambda_adapter;
mod local_server;
mod runtime_app;
mod runtime_context;
mod slack_client;
mod slack_incidents;
mod slack_modal;
mod slack_requests;
mod slack_verification;
#[cfg(test)]
mod test_support;

use app_config::AppConfig;
use runtime_app::RuntimeApp;
use runtime_context::RuntimeContext;

fn init_tracing() {
    let level = env::var("LOG_LEVEL").ok().filter(|level| !level.is_empty()).unwrap_or_else(|| {
        match env::var("DEBUG").as_deref() {
            Ok("true") => "debug".to_string(),
            _ => "info".to_string(),
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info")))
        // disable printing the name of the module in every log line.
        .with_target(false)
        // CloudWatch adds the ingestion time.
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = AppConfig::load()?;
    tracing::debug!(
        command = %config.endpoints.slack_command,
        modal = %config.endpoints.slack_modal_parser,
        title = %config.modal.title,
        "configuration loaded"
    );
    let runtime_context = RuntimeContext::new(config);
    let runtime_app = RuntimeApp::new(&runtime_context);
    if let Err(error) = runtime_app.launch().await {
        tracing::error!("runtime stopped with error: {:#}", error);
        return Err(error);
    }
    Ok(())
}
