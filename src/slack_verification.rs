use hmac::{Hmac, Mac};
use sha2::Sha256;

use anyhow::anyhow;
use lambda_http::Request;
use tracing::debug;

use crate::app_error::AppError;
use crate::slack_requests::{body_bytes, header_value};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
const SIGNATURE_VERSION: &str = "v0";

// https://api.slack.com/authentication/verifying-requests-from-slack
pub struct SignatureVerifier {
    signing_secret: String,
}

impl SignatureVerifier {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
        }
    }

    /// Checks the Slack signature headers against the request body.
    /// The body is only borrowed, so handlers further down still see it.
    pub fn verify_request(&self, request: &Request) -> Result<(), AppError> {
        let headers = request.headers();
        let timestamp = header_value(headers, TIMESTAMP_HEADER);
        let signature = header_value(headers, SIGNATURE_HEADER);
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return Err(AppError::bad_request("Invalid request")
                .with_cause(anyhow!("missing {TIMESTAMP_HEADER} or {SIGNATURE_HEADER} header")));
        };
        debug!(timestamp, "verifying slack signature");
        self.verify(timestamp, body_bytes(request.body()), signature)
    }

    // https://api.slack.com/authentication/verifying-requests-from-slack#making__validating-a-request
    pub fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> Result<(), AppError> {
        let mac = self.mac(timestamp, body)?;
        let supplied = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|digest| hex::decode(digest).ok());
        // verify_slice compares in constant time
        let verified = match supplied {
            Some(digest) => mac.verify_slice(&digest).is_ok(),
            None => false,
        };
        if verified {
            Ok(())
        } else {
            Err(AppError::unauthorized("Invalid signature"))
        }
    }

    /// `v0=` followed by the hex HMAC-SHA256 of `v0:<timestamp>:<body>`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, AppError> {
        let mac = self.mac(timestamp, body)?;
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok([SIGNATURE_VERSION, "=", digest.as_str()].join(""))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, AppError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|e| AppError::internal("Server configuration error").with_cause(anyhow!(e)))?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}
