//! Blocking HTTP transport for the tracker.

use super::{RemoteConfig, Transport};
use crate::error::{OfftracError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// `Transport` over HTTP(S) with basic authentication.
///
/// A request whose response cannot be read (bad status line, broken
/// headers, connection dropped mid-response) is retried up to `retries`
/// times with a fixed delay. Other failures surface immediately.
pub struct HttpTransport {
    agent: ureq::Agent,
    base_url: String,
    authorization: Option<String>,
    retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &RemoteConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(config.timeout_secs))
            .build();
        let authorization = (!config.user.is_empty()).then(|| {
            let credentials = format!("{}:{}", config.user, config.password);
            format!("Basic {}", BASE64.encode(credentials))
        });
        Self {
            agent,
            base_url: config.url.trim_end_matches('/').to_string(),
            authorization,
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let request = self.agent.request(method, url);
        match &self.authorization {
            Some(value) => request.set("Authorization", value),
            None => request,
        }
    }

    fn send(&self, method: &str, path: &str, body: Option<&str>) -> Result<String> {
        let url = self.url(path);
        with_retries(&url, self.retries, self.retry_delay, || {
            let request = self.request(method, &url);
            let response = match body {
                Some(body) => request
                    .set("Content-Type", "application/json")
                    .send_string(body),
                None => request.call(),
            };
            match response {
                Ok(response) => response
                    .into_string()
                    .map_err(|err| Failure::Retryable(err.to_string())),
                Err(ureq::Error::Status(code, response)) => {
                    // RPC errors may come back with a 500 and a JSON error body.
                    let text = response.into_string().unwrap_or_default();
                    if body.is_some() && text.trim_start().starts_with('{') {
                        Ok(text)
                    } else {
                        Err(Failure::Fatal(format!("HTTP {code}")))
                    }
                }
                Err(ureq::Error::Transport(transport)) => {
                    if is_bad_response(transport.kind()) {
                        Err(Failure::Retryable(transport.to_string()))
                    } else {
                        Err(Failure::Fatal(transport.to_string()))
                    }
                }
            }
        })
    }
}

/// Run `attempt` until it succeeds, fails fatally, or `retries` extra
/// attempts have been spent, sleeping `delay` before each retry.
fn with_retries<F>(url: &str, retries: u32, delay: Duration, mut attempt: F) -> Result<String>
where
    F: FnMut() -> std::result::Result<String, Failure>,
{
    let mut attempts_left = retries;
    loop {
        match attempt() {
            Ok(text) => return Ok(text),
            Err(Failure::Retryable(message)) if attempts_left > 0 => {
                attempts_left -= 1;
                warn!(url, error = %message, attempts_left, "Retrying bad response");
                thread::sleep(delay);
            }
            Err(Failure::Retryable(message) | Failure::Fatal(message)) => {
                return Err(OfftracError::Transport {
                    url: url.to_string(),
                    message,
                });
            }
        }
    }
}

#[derive(Debug)]
enum Failure {
    Retryable(String),
    Fatal(String),
}

const fn is_bad_response(kind: ureq::ErrorKind) -> bool {
    matches!(
        kind,
        ureq::ErrorKind::BadStatus | ureq::ErrorKind::BadHeader | ureq::ErrorKind::Io
    )
}

impl Transport for HttpTransport {
    fn post_json(&mut self, path: &str, body: &Value) -> Result<Value> {
        let payload = serde_json::to_string(body)?;
        debug!(path, bytes = payload.len(), "POST");
        let text = self.send("POST", path, Some(&payload))?;
        serde_json::from_str(&text)
            .map_err(|err| OfftracError::Protocol(format!("response is not JSON: {err}")))
    }

    fn get_text(&mut self, path: &str) -> Result<String> {
        debug!(path, "GET");
        self.send("GET", path, None)
    }
}
