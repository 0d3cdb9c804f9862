//! HTTP transport to the co-signer service
//!
//! Thin client over the co-signer's session API: create a session,
//! submit an opaque round payload, poll for the counterparty's reply,
//! and cancel. Payloads are base64 in transit and opaque to the
//! service.

use crate::config::EngineConfig;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use mpc_wallet_engine::{Error, Result, SessionType};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session handle returned by the co-signer on creation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    /// Server-side expiry, RFC 3339
    pub expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest<'a> {
    profile_id: &'a str,
    #[serde(rename = "type")]
    session_type: SessionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_proof: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitMessageRequest<'a> {
    round: u32,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollResponse {
    round: Option<u32>,
    payload: Option<String>,
    status: Option<String>,
    reason: Option<String>,
}

/// What a poll attempt yielded
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing yet, poll again
    Pending,
    /// A counterparty message for the given round
    Message { round: u32, payload: Vec<u8> },
    /// The co-signer marked the session completed
    Completed,
    /// The co-signer marked the session failed
    Failed { reason: String },
}

/// HTTP client for the co-signer session API
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct CoSignerClient {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl CoSignerClient {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::RequestTimeout(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }

    /// Create a session of the given type for a profile
    pub async fn create_session(
        &self,
        profile_id: &str,
        session_type: SessionType,
        auth_proof: Option<&str>,
    ) -> Result<SessionHandle> {
        let url = format!("{}/mpc/session", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&CreateSessionRequest {
                profile_id,
                session_type,
                auth_proof,
            })
            .send()
            .await
            // any failure to initiate, network included, is a create failure
            .map_err(|e| Error::SessionCreateFailed(format!("session create failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SessionCreateFailed(format!(
                "co-signer returned {status}: {body}"
            )));
        }
        let handle: SessionHandle = response
            .json()
            .await
            .map_err(|e| Error::SessionCreateFailed(format!("malformed session response: {e}")))?;
        debug!(session_id = %handle.session_id, %session_type, "session created");
        Ok(handle)
    }

    /// Submit an outbound round payload
    pub async fn submit_message(
        &self,
        session_id: &str,
        round: u32,
        payload: &[u8],
    ) -> Result<()> {
        let url = format!("{}/mpc/session/{}/message", self.base_url, session_id);
        let encoded = BASE64.encode(payload);
        let response = self
            .authed(self.client.post(&url))
            .json(&SubmitMessageRequest {
                round,
                payload: &encoded,
            })
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Network(format!(
                "message submit returned {status}"
            )));
        }
        Ok(())
    }

    /// Poll once for the counterparty's message for `round`
    pub async fn poll(&self, session_id: &str, round: u32) -> Result<PollOutcome> {
        let url = format!(
            "{}/mpc/session/{}/poll?round={}",
            self.base_url, session_id, round
        );
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(Self::map_send_error)?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(PollOutcome::Pending);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Network(format!("poll returned {status}")));
        }
        let body: PollResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidMessage(format!("malformed poll response: {e}")))?;

        match body.status.as_deref() {
            Some("completed") => return Ok(PollOutcome::Completed),
            Some("failed") => {
                return Ok(PollOutcome::Failed {
                    reason: body
                        .reason
                        .unwrap_or_else(|| "co-signer reported failure".to_string()),
                });
            }
            Some(other) => {
                return Err(Error::InvalidMessage(format!(
                    "unknown session status {other:?}"
                )));
            }
            None => {}
        }

        let (Some(msg_round), Some(payload)) = (body.round, body.payload) else {
            return Err(Error::InvalidMessage(
                "poll response carried neither a status nor a message".into(),
            ));
        };
        let payload = BASE64
            .decode(payload.as_bytes())
            .map_err(|e| Error::InvalidMessage(format!("payload is not valid base64: {e}")))?;
        Ok(PollOutcome::Message {
            round: msg_round,
            payload,
        })
    }

    /// Best-effort session teardown; errors are logged, never surfaced
    pub async fn cancel(&self, session_id: &str) {
        let url = format!("{}/mpc/session/{}", self.base_url, session_id);
        match self.authed(self.client.delete(&url)).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(session_id, status = %response.status(), "session cancel rejected");
            }
            Ok(_) => debug!(session_id, "session cancelled"),
            Err(e) => warn!(session_id, error = %e, "session cancel request failed"),
        }
    }
}
