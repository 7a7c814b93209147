use std::sync::Arc;

use anyhow::{anyhow, Result};
use lambda_http::aws_lambda_events::apigw::ApiGatewayProxyRequest;
use lambda_runtime::{service_fn, LambdaEvent};
use tracing::info;

use crate::lambda_adapter::LambdaAdapter;
use crate::local_server::LocalServer;
use crate::runtime_context::RuntimeContext;
use crate::slack_requests::SlackRequestHandler;

pub struct RuntimeApp {
    runtime_context: Arc<RuntimeContext>,
    request_handler: Arc<SlackRequestHandler>,
}

impl RuntimeApp {
    pub fn new(runtime_context: &Arc<RuntimeContext>) -> Arc<Self> {
        let runtime_context = Arc::clone(runtime_context);
        let request_handler = SlackRequestHandler::new(&runtime_context);
        let app = Self {
            runtime_context,
            request_handler,
        };
        Arc::new(app)
    }

    /// Serves until shutdown: a local HTTP server when enabled, the Lambda runtime loop otherwise.
    pub async fn launch(self: &Arc<Self>) -> Result<()> {
        if self.runtime_context.config().local.enabled {
            info!("starting in local mode");
            let server = LocalServer::new(&self.runtime_context, &self.request_handler);
            return server.run().await;
        }
        info!(source = %self.runtime_context.event_source(), "starting lambda runtime");
        let adapter = LambdaAdapter::new(&self.request_handler);
        let func = move |event: LambdaEvent<ApiGatewayProxyRequest>| {
            let adapter = Arc::clone(&adapter);
            async move { adapter.handle(event.payload).await }
        };
        lambda_runtime::run(service_fn(func))
            .await
            .map_err(|error| anyhow!(error))
    }
}
