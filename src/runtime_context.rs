use std::env;
use std::sync::Arc;

use crate::app_config::AppConfig;
use crate::datadog_client::{DatadogClient, EventClient};
use crate::slack_client::{ChatClient, SlackClient};
use crate::slack_verification::SignatureVerifier;

const LOCAL_EVENT_SOURCE: &str = "local_execution";

/// Everything a request needs, built once at startup and never mutated.
pub struct RuntimeContext {
    config: AppConfig,
    verifier: SignatureVerifier,
    chat_client: Arc<dyn ChatClient>,
    event_client: Arc<dyn EventClient>,
    event_source: String,
}

impl RuntimeContext {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let chat_client = SlackClient::new(&config.slack_config.slack_token);
        let event_client = DatadogClient::new(&config.datadog);
        let event_source = if config.local.enabled {
            LOCAL_EVENT_SOURCE.to_string()
        } else {
            env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default()
        };
        Self::with_clients(config, chat_client, event_client, event_source)
    }

    pub fn with_clients(
        config: AppConfig,
        chat_client: Arc<dyn ChatClient>,
        event_client: Arc<dyn EventClient>,
        event_source: String,
    ) -> Arc<Self> {
        let verifier = SignatureVerifier::new(config.slack_config.slack_signing_secret.as_str());
        let context = Self {
            config,
            verifier,
            chat_client,
            event_client,
            event_source,
        };
        Arc::new(context)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn chat_client(&self) -> &Arc<dyn ChatClient> {
        &self.chat_client
    }

    pub fn event_client(&self) -> &Arc<dyn EventClient> {
        &self.event_client
    }

    pub fn event_source(&self) -> &str {
        &self.event_source
    }
}
