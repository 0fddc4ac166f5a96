//! Agent-runtime invocation.
//!
//! The [`AgentRuntime`] trait decouples the tool-call loop from the hosted
//! reasoning service. The HTTP implementation posts one input payload per
//! step and decodes whatever body shape comes back (plain JSON or an event
//! stream) into text via [`crate::core::response`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::response::decode_response;

const INVOKE_TIMEOUT: Duration = Duration::from_secs(300);
const USER_ID: &str = "repo-agent-worker";

/// Abstraction over the reasoning service.
pub trait AgentRuntime {
    /// Send one input text for the given session; return the agent's text.
    fn invoke(&self, session_id: &str, input: &str) -> Result<String>;
}

/// HTTP runtime client. The endpoint identifier from the job is the invoke
/// URL for the hosted agent.
pub struct HttpAgentRuntime {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpAgentRuntime {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(INVOKE_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("build agent runtime client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl AgentRuntime for HttpAgentRuntime {
    #[instrument(skip_all, fields(session_id))]
    fn invoke(&self, session_id: &str, input: &str) -> Result<String> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let payload = json!({
            "conversationId": session_id,
            "messageId": format!("msg-{millis}"),
            "input": input,
            "userId": USER_ID,
        });

        let res = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .context("invoke agent runtime")?;
        let status = res.status();
        let body = res.text().context("read agent runtime response")?;
        if !status.is_success() {
            return Err(anyhow!(
                "agent runtime returned {status}: {}",
                crate::io::process::tail(&body, 500)
            ));
        }
        let text = decode_response(&body);
        debug!(response_chars = text.len(), "agent runtime responded");
        Ok(text)
    }
}
