//! Best-effort status callbacks.
//!
//! Contract: attempt once with a short timeout, log failure, never propagate.
//! Callback trouble must never change the job's own outcome, so this module
//! returns nothing.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for progress and terminal events.
pub trait StatusSink {
    fn post(&self, payload: &Value);
}

/// HTTP sink posting JSON to the job's callback endpoint.
pub struct HttpStatusSink {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpStatusSink {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            url: url.into(),
        }
    }
}

impl StatusSink for HttpStatusSink {
    fn post(&self, payload: &Value) {
        let result = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .and_then(|res| res.error_for_status());
        match result {
            Ok(_) => debug!("callback delivered"),
            Err(err) => warn!(err = %err, "callback failed"),
        }
    }
}

/// Sink for jobs without a callback endpoint.
pub struct NullStatusSink;

impl StatusSink for NullStatusSink {
    fn post(&self, _payload: &Value) {}
}
