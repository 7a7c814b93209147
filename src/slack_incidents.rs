use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use lambda_http::http::StatusCode;
use lambda_http::{Body, Request, Response};
use serde_json::json;
use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::app_error::AppError;
use crate::datadog_client::{AlertType, EventPriority, MonitoringEvent};
use crate::runtime_context::RuntimeContext;
use crate::slack_modal::{FieldValues, ModalPayload, SlackModal};
use crate::slack_requests::body_bytes;

const EVENT_TITLE: &str = "New on-call alert from slack slash command";
const EVENT_SOURCE_TYPE: &str = "slack";
const TEXT_BLOCK_START: &str = "%%% \n";
const TEXT_BLOCK_END: &str = "\n %%%";

pub const SEVERITY_FIELD: &str = "input_severity";
pub const DOMAINS_FIELD: &str = "input_domains_affected";
pub const DESCRIPTION_FIELD: &str = "input_incident_description";

const FIELD_PLACEHOLDERS: [(&str, &str); 3] = [
    ("{{severity}}", SEVERITY_FIELD),
    ("{{domains_affected}}", DOMAINS_FIELD),
    ("{{description}}", DESCRIPTION_FIELD),
];
const USERNAME_PLACEHOLDER: &str = "{{username}}";

/// Opens the incident dialog and turns its submission into a Slack message
/// plus a Datadog event. Nothing is kept between the two calls.
pub struct SlackIncidentHandler {
    runtime_context: Arc<RuntimeContext>,
}

impl SlackIncidentHandler {
    pub fn new(runtime_context: &Arc<RuntimeContext>) -> Arc<Self> {
        let runtime_context = Arc::clone(runtime_context);
        let handler = Self { runtime_context };
        Arc::new(handler)
    }

    // https://api.slack.com/interactivity/slash-commands
    pub async fn handle_command(&self, request: &Request) -> Result<Response<Body>, AppError> {
        debug!("processing slack command");
        let form = parse_form(request)?;
        let trigger_id = form
            .get("trigger_id")
            .filter(|trigger_id| !trigger_id.is_empty())
            .ok_or_else(|| AppError::bad_request("Missing trigger_id"))?;
        let modal_config = &self.config().modal;
        let modal = SlackModal::from_definitions(&modal_config.title, trigger_id, &modal_config.inputs);
        modal.send(self.runtime_context.chat_client().as_ref()).await?;
        info!(trigger_id = %trigger_id, "slack modal sent successfully");
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::Empty)
            .map_err(|e| AppError::internal("Failed to encode response").with_cause(e))
    }

    // https://api.slack.com/surfaces/modals#interactions
    pub async fn handle_modal_submission(&self, request: &Request) -> Result<Response<Body>, AppError> {
        debug!("processing modal submission");
        let form = parse_form(request)?;
        let payload = form.get("payload").map(String::as_str).unwrap_or_default();
        let payload = ModalPayload::parse(payload)?;
        let fields = payload.parse_all_fields()?;
        let username = payload.username();
        let message = render_message(&self.config().slack_config.message_format, &fields, username);
        debug!(username, ?fields, "incident message generated");

        if let Some(channel) = self.config().slack_config.channel_id() {
            self.runtime_context
                .chat_client()
                .post_message(channel, &message)
                .await
                .map_err(|e| AppError::internal("Failed to send message to Slack").with_cause(e))?;
        }

        self.create_datadog_event(&message, &payload).await?;

        let body = json!({ "response_action": "clear" }).to_string();
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .body(body.into())
            .map_err(|e| AppError::internal("Failed to encode response").with_cause(e))?;
        info!("modal submission processed successfully");
        Ok(response)
    }

    async fn create_datadog_event(&self, message: &str, payload: &ModalPayload) -> Result<(), AppError> {
        let tags = IncidentTags {
            severity: tag_value(payload, SEVERITY_FIELD),
            domain: tag_value(payload, DOMAINS_FIELD),
        };
        let event = build_event(self.config(), self.runtime_context.event_source(), message, &tags, Utc::now());
        let response = self
            .runtime_context
            .event_client()
            .create_event(&event)
            .await
            .map_err(|e| AppError::internal("Failed to create Datadog event").with_cause(e))?;
        if response.status != "ok" {
            let cause = anyhow!("status not expected: {}", response.status);
            return Err(AppError::internal("Failed to create Datadog event").with_cause(cause));
        }
        let created = response.event.unwrap_or_default();
        let url = created.url.unwrap_or_default();
        info!(id = ?created.id, url = %url, status = %response.status, "datadog event created successfully");
        Ok(())
    }

    fn config(&self) -> &AppConfig {
        self.runtime_context.config()
    }
}

fn parse_form(request: &Request) -> Result<HashMap<String, String>, AppError> {
    serde_urlencoded::from_bytes(body_bytes(request.body()))
        .map_err(|e| AppError::bad_request("Failed to parse form data").with_cause(e))
}

/// Substitutes the known placeholders in one pass over the template. A
/// placeholder whose field was not submitted is left as is, and submitted
/// values are never expanded again.
pub fn render_message(template: &str, fields: &FieldValues, username: &str) -> String {
    let mut message = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        message.push_str(&rest[..start]);
        let tail = &rest[start..];
        match placeholder_value(tail, fields, username) {
            Some((placeholder, value)) => {
                message.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                message.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    message.push_str(rest);
    message
}

fn placeholder_value<'a>(
    text: &str,
    fields: &'a FieldValues,
    username: &'a str,
) -> Option<(&'static str, &'a str)> {
    if text.starts_with(USERNAME_PLACEHOLDER) {
        return Some((USERNAME_PLACEHOLDER, username));
    }
    FIELD_PLACEHOLDERS.iter().find_map(|(placeholder, key)| {
        if !text.starts_with(placeholder) {
            return None;
        }
        fields.get(*key).map(|value| (*placeholder, value.as_str()))
    })
}

/// Submitted values that become Datadog tags; missing fields tag as empty.
#[derive(Debug, Default)]
pub struct IncidentTags {
    pub severity: String,
    pub domain: String,
}

fn tag_value(payload: &ModalPayload, block_id: &str) -> String {
    payload.parse_field(block_id).unwrap_or_else(|error| {
        debug!(block_id, error = %error, "tag field not submitted");
        String::new()
    })
}

pub fn build_event(
    config: &AppConfig,
    event_source: &str,
    message: &str,
    tags: &IncidentTags,
    now: DateTime<Utc>,
) -> MonitoringEvent {
    let seen_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let text = format!("{message}\nEvents emitted by the {event_source} seen at {seen_at}");
    let metadata = &config.metadata;
    MonitoringEvent {
        title: EVENT_TITLE.to_string(),
        text: [TEXT_BLOCK_START, text.as_str(), TEXT_BLOCK_END].concat(),
        priority: EventPriority::Normal,
        alert_type: AlertType::Error,
        tags: vec![
            format!("env:{}", metadata.environment),
            format!("team:{}", metadata.team),
            format!("service:{}", metadata.service),
            format!("severity:{}", tags.severity),
            format!("domain:{}", tags.domain),
        ],
        source_type_name: EVENT_SOURCE_TYPE.to_string(),
        aggregation_key: format!("{}-{}", metadata.environment, metadata.service),
    }
}
