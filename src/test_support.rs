use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use lambda_http::{Body, Request};

use crate::app_config::tests::test_config;
use crate::app_config::AppConfig;
use crate::datadog_client::{CreatedEvent, EventClient, EventCreateResponse, MonitoringEvent};
use crate::runtime_context::RuntimeContext;
use crate::slack_client::ChatClient;
use crate::slack_modal::ModalView;
use crate::slack_verification::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};

pub const TEST_TIMESTAMP: &str = "1700000000";

#[derive(Default)]
pub struct RecordingChatClient {
    pub opened: Mutex<Vec<(String, ModalView)>>,
    pub posted: Mutex<Vec<(String, String)>>,
    pub fail_open: bool,
    pub fail_post: bool,
    pub panic_open: bool,
}

#[async_trait]
impl ChatClient for RecordingChatClient {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<()> {
        if self.panic_open {
            panic!("views.open blew up");
        }
        if self.fail_open {
            bail!("invalid_trigger_id");
        }
        self.opened.lock().unwrap().push((trigger_id.to_string(), view.clone()));
        Ok(())
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        if self.fail_post {
            bail!("channel_not_found");
        }
        self.posted.lock().unwrap().push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct RecordingEventClient {
    pub events: Mutex<Vec<MonitoringEvent>>,
    pub status: String,
    pub fail: bool,
}

impl Default for RecordingEventClient {
    fn default() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            status: "ok".into(),
            fail: false,
        }
    }
}

#[async_trait]
impl EventClient for RecordingEventClient {
    async fn create_event(&self, event: &MonitoringEvent) -> Result<EventCreateResponse> {
        if self.fail {
            bail!("403 Forbidden");
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(EventCreateResponse {
            status: self.status.clone(),
            event: Some(CreatedEvent {
                id: Some(1),
                url: Some("https://app.datadoghq.eu/event/event?id=1".into()),
            }),
        })
    }
}

pub struct TestHarness {
    pub context: Arc<RuntimeContext>,
    pub chat: Arc<RecordingChatClient>,
    pub events: Arc<RecordingEventClient>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(test_config(), RecordingChatClient::default(), RecordingEventClient::default())
    }

    pub fn with(config: AppConfig, chat: RecordingChatClient, events: RecordingEventClient) -> Self {
        let chat = Arc::new(chat);
        let events = Arc::new(events);
        let context = RuntimeContext::with_clients(
            config,
            chat.clone(),
            events.clone(),
            "incident-reporter-test".into(),
        );
        Self { context, chat, events }
    }

    pub fn opened(&self) -> Vec<(String, ModalView)> {
        self.chat.opened.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.chat.posted.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<MonitoringEvent> {
        self.events.events.lock().unwrap().clone()
    }

    /// A POST carrying a valid signature for the harness signing secret.
    pub fn signed_request(&self, path: &str, body: &str) -> Request {
        let secret = &self.context.config().slack_config.slack_signing_secret;
        let signature = SignatureVerifier::new(secret.as_str())
            .sign(TEST_TIMESTAMP, body.as_bytes())
            .unwrap();
        lambda_http::http::Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, TEST_TIMESTAMP)
            .header(SIGNATURE_HEADER, signature)
            .body(Body::from(body))
            .unwrap()
    }
}

/// Form-encodes a `payload` field the way Slack posts view submissions.
pub fn payload_form(payload: &serde_json::Value) -> String {
    serde_urlencoded::to_string(&[("payload", payload.to_string())][..]).unwrap()
}

pub fn submission_payload(values: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "view_submission",
        "user": { "id": "U1", "username": "alice" },
        "view": { "id": "V1", "state": { "values": values } }
    })
}
