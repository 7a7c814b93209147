use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app_config::DatadogConfig;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Normal,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Error,
}

// https://docs.datadoghq.com/api/latest/events/#post-an-event
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MonitoringEvent {
    pub title: String,
    pub text: String,
    pub priority: EventPriority,
    pub alert_type: AlertType,
    pub tags: Vec<String>,
    pub source_type_name: String,
    pub aggregation_key: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventCreateResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub event: Option<CreatedEvent>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CreatedEvent {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait EventClient: Send + Sync {
    async fn create_event(&self, event: &MonitoringEvent) -> Result<EventCreateResponse>;
}

pub struct DatadogClient {
    client: Client,
    host: String,
    api_key: String,
    app_key: Option<String>,
}

impl DatadogClient {
    pub fn new(config: &DatadogConfig) -> Arc<Self> {
        let this = Self {
            client: Client::new(),
            host: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            app_key: config.app_key.clone(),
        };
        Arc::new(this)
    }
}

#[async_trait]
impl EventClient for DatadogClient {
    async fn create_event(&self, event: &MonitoringEvent) -> Result<EventCreateResponse> {
        let mut request = self
            .client
            .post(format!("{}/api/v1/events", self.host))
            .header("DD-API-KEY", &self.api_key)
            .json(event);
        if let Some(app_key) = &self.app_key {
            request = request.header("DD-APPLICATION-KEY", app_key);
        }
        let response = request.send().await?.error_for_status()?;
        let text = response.text().await?;
        debug!("datadog events response {:?}", text);
        let response: EventCreateResponse = serde_json::from_str(&text)?;
        Ok(response)
    }
}
