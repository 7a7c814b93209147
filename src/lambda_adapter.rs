use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lambda_http::aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use lambda_http::http::header::CONTENT_TYPE;
use lambda_http::http::{HeaderMap, HeaderValue, StatusCode};
use lambda_http::{Body, Request, Response};
use tracing::{debug, warn};

use crate::slack_requests::{SlackRequestHandler, NOT_FOUND_MESSAGE};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Translates API Gateway proxy events to requests for the shared handler chain and back.
pub struct LambdaAdapter {
    request_handler: Arc<SlackRequestHandler>,
}

impl LambdaAdapter {
    pub fn new(request_handler: &Arc<SlackRequestHandler>) -> Arc<Self> {
        let adapter = Self {
            request_handler: Arc::clone(request_handler),
        };
        Arc::new(adapter)
    }

    pub async fn handle(
        &self,
        event: ApiGatewayProxyRequest,
    ) -> Result<ApiGatewayProxyResponse, lambda_runtime::Error> {
        let resource = event.resource.as_deref().unwrap_or_default();
        if self.request_handler.route(resource).is_none() {
            debug!(resource, path = ?event.path, "no route for resource");
            return Ok(text_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE));
        }
        let body = match decode_body(&event) {
            Ok(body) => body,
            Err(error) => {
                warn!(error = %error, "failed to decode request body");
                return Ok(text_response(
                    StatusCode::BAD_REQUEST,
                    "Invalid request body encoding",
                ));
            }
        };
        let path = resource.to_string();
        let request = build_request(event, path, body)?;
        let response = self.request_handler.handle_slack_request(request).await;
        Ok(into_proxy_response(response))
    }
}

pub fn decode_body(event: &ApiGatewayProxyRequest) -> Result<Vec<u8>, base64::DecodeError> {
    let body = event.body.as_deref().unwrap_or_default();
    if event.is_base64_encoded {
        STANDARD.decode(body)
    } else {
        Ok(body.as_bytes().to_vec())
    }
}

fn build_request(
    event: ApiGatewayProxyRequest,
    path: String,
    body: Vec<u8>,
) -> Result<Request, lambda_runtime::Error> {
    let mut request = lambda_http::http::Request::builder()
        .method(event.http_method)
        .uri(path)
        .body(into_body(body))?;
    let headers = request.headers_mut();
    headers.extend(event.multi_value_headers);
    for (name, value) in event.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    Ok(request)
}

fn into_body(body: Vec<u8>) -> Body {
    if body.is_empty() {
        return Body::Empty;
    }
    match String::from_utf8(body) {
        Ok(text) => Body::Text(text),
        Err(error) => Body::Binary(error.into_bytes()),
    }
}

fn text_response(status: StatusCode, message: &str) -> ApiGatewayProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    ApiGatewayProxyResponse {
        status_code: i64::from(status.as_u16()),
        headers: headers.clone(),
        multi_value_headers: headers,
        body: Some(Body::Text(message.to_string())),
        is_base64_encoded: false,
    }
}

/// Keeps the first value per header in `headers` and all of them in
/// `multiValueHeaders`; the content type is always JSON.
fn into_proxy_response(response: Response<Body>) -> ApiGatewayProxyResponse {
    let (parts, body) = response.into_parts();
    let mut multi_value_headers = parts.headers;
    multi_value_headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    let mut headers = HeaderMap::new();
    for name in multi_value_headers.keys() {
        if let Some(value) = multi_value_headers.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    let is_base64_encoded = matches!(body, Body::Binary(_));
    let body = match body {
        Body::Empty => None,
        body => Some(body),
    };
    ApiGatewayProxyResponse {
        status_code: i64::from(parts.status.as_u16()),
        headers,
        multi_value_headers,
        body,
        is_base64_encoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slack_requests::body_bytes;
    use crate::slack_verification::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER};
    use crate::test_support::{payload_form, submission_payload, TestHarness, TEST_TIMESTAMP};
    use lambda_http::http::Method;
    use serde_json::json;

    fn adapter(harness: &TestHarness) -> Arc<LambdaAdapter> {
        LambdaAdapter::new(&SlackRequestHandler::new(&harness.context))
    }

    fn signed_event(harness: &TestHarness, resource: &str, body: &str) -> ApiGatewayProxyRequest {
        let secret = &harness.context.config().slack_config.slack_signing_secret;
        let signature = SignatureVerifier::new(secret.as_str())
            .sign(TEST_TIMESTAMP, body.as_bytes())
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, TEST_TIMESTAMP.parse().unwrap());
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        ApiGatewayProxyRequest {
            http_method: Method::POST,
            resource: Some(resource.into()),
            path: Some(resource.into()),
            headers,
            body: Some(body.into()),
            is_base64_encoded: false,
            ..Default::default()
        }
    }

    fn body_text(response: &ApiGatewayProxyResponse) -> String {
        let body = response.body.as_ref().map(body_bytes).unwrap_or_default();
        String::from_utf8_lossy(body).into_owned()
    }

    #[test]
    fn proxy_event_deserializes_from_api_gateway_json() {
        let event: ApiGatewayProxyRequest = serde_json::from_value(json!({
            "httpMethod": "POST",
            "resource": "/slack/command",
            "path": "/slack/command",
            "headers": { "X-Slack-Request-Timestamp": "1" },
            "body": "trigger_id=abc",
            "isBase64Encoded": false,
            "requestContext": { "httpMethod": "POST", "stage": "prod" }
        }))
        .unwrap();
        assert_eq!(event.resource.as_deref(), Some("/slack/command"));
        assert_eq!(event.headers[TIMESTAMP_HEADER], "1");
        assert_eq!(decode_body(&event).unwrap(), b"trigger_id=abc");
    }

    #[tokio::test]
    async fn event_with_null_fields_is_answered_with_not_found() {
        let harness = TestHarness::new();
        let event: ApiGatewayProxyRequest = serde_json::from_value(json!({
            "httpMethod": "POST",
            "resource": null,
            "path": null,
            "headers": null,
            "body": null,
            "isBase64Encoded": null,
            "requestContext": { "httpMethod": "POST" }
        }))
        .unwrap();
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 404);
        assert_eq!(body_text(&response), NOT_FOUND_MESSAGE);
    }

    #[test]
    fn base64_body_decodes_to_original_bytes() {
        let encoded = STANDARD.encode("trigger_id=abc&text=hello");
        let event = ApiGatewayProxyRequest {
            body: Some(encoded.clone()),
            is_base64_encoded: true,
            ..Default::default()
        };
        let decoded = decode_body(&event).unwrap();
        assert_eq!(decoded, b"trigger_id=abc&text=hello");
        assert_eq!(STANDARD.encode(decoded), encoded);
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let harness = TestHarness::new();
        let event = signed_event(&harness, "/slack/events", "trigger_id=abc");
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 404);
        assert_eq!(body_text(&response), NOT_FOUND_MESSAGE);
        assert!(harness.opened().is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_bad_request() {
        let harness = TestHarness::new();
        let mut event = signed_event(&harness, "/slack/command", "trigger_id=abc");
        event.body = Some("%%% not base64 %%%".into());
        event.is_base64_encoded = true;
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 400);
        assert_eq!(body_text(&response), "Invalid request body encoding");
        assert!(harness.opened().is_empty());
    }

    #[tokio::test]
    async fn signed_command_runs_through_shared_chain() {
        let harness = TestHarness::new();
        let event = signed_event(&harness, "/slack/command", "trigger_id=abc");
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.headers[CONTENT_TYPE], "application/json");
        assert_eq!(response.multi_value_headers[CONTENT_TYPE], "application/json");
        assert_eq!(response.body, None);
        assert_eq!(harness.opened()[0].0, "abc");
    }

    #[tokio::test]
    async fn base64_encoded_submission_is_accepted() {
        let harness = TestHarness::new();
        let form = payload_form(&submission_payload(json!({
            "input_severity": { "input_severity": {
                "type": "static_select",
                "selected_option": { "value": "High" }
            }}
        })));
        let mut event = signed_event(&harness, "/slack/modal", &form);
        event.body = Some(STANDARD.encode(&form));
        event.is_base64_encoded = true;
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(body_text(&response), r#"{"response_action":"clear"}"#);
        assert!(!response.is_base64_encoded);
        assert_eq!(harness.events().len(), 1);
    }

    #[tokio::test]
    async fn tampered_body_fails_verification() {
        let harness = TestHarness::new();
        let mut event = signed_event(&harness, "/slack/command", "trigger_id=abc");
        event.body = Some("trigger_id=xyz".into());
        let response = adapter(&harness).handle(event).await.unwrap();
        assert_eq!(response.status_code, 401);
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn response_serializes_in_api_gateway_shape() {
        let mut response = Response::new(Body::from("ok"));
        response.headers_mut().append("x-trace", HeaderValue::from_static("a"));
        response.headers_mut().append("x-trace", HeaderValue::from_static("b"));
        let value = serde_json::to_value(into_proxy_response(response)).unwrap();
        assert_eq!(value["statusCode"], 200);
        assert_eq!(value["headers"]["x-trace"], "a");
        assert_eq!(value["multiValueHeaders"]["x-trace"], json!(["a", "b"]));
        assert_eq!(value["headers"]["content-type"], "application/json");
        assert_eq!(value["body"], "ok");
    }

    #[test]
    fn non_utf8_bodies_stay_binary() {
        assert!(matches!(into_body(vec![0xff, 0xfe]), Body::Binary(_)));
        assert!(matches!(into_body(Vec::new()), Body::Empty));
    }
}
