use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{self, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::slack_modal::ModalView;

const SLACK_API_URL: &str = "https://slack.com/api";

/// The two Slack Web API calls the incident flow needs.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<()>;
    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}

#[derive(Serialize)]
struct OpenViewRequestBody<'a> {
    trigger_id: &'a str,
    view: &'a ModalView,
}

#[derive(Serialize)]
struct PostRequestBody<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponseBody {
    ok: bool,
    error: Option<String>,
}

pub struct SlackClient {
    client: Client,
    token: String,
}

// https://api.slack.com/web
impl SlackClient {
    pub fn new(token: &str) -> Arc<Self> {
        let client = reqwest::Client::new();
        let this = Self {
            client,
            token: token.to_string(),
        };
        Arc::new(this)
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(format!("{SLACK_API_URL}/{method}"))
            .header("Content-type", "application/json; charset=utf-8")
            .header("Authorization", ["Bearer", &self.token].join(" "))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        debug!("slack {} response {:?}", method, text);
        let response: ApiResponseBody = serde_json::from_str(&text)?;
        if !response.ok {
            bail!("slack {} failed: {}", method, response.error.unwrap_or_else(|| "unknown_error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    // https://api.slack.com/methods/views.open
    async fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<()> {
        let request_body = OpenViewRequestBody { trigger_id, view };
        self.call("views.open", &request_body).await?;
        info!("slack views.open complete");
        Ok(())
    }

    // https://api.slack.com/methods/chat.postMessage
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let request_body = PostRequestBody { channel, text };
        self.call("chat.postMessage", &request_body).await?;
        info!(channel, "slack chat.postMessage complete");
        Ok(())
    }
}
