use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde_json::Value;

/// One synchronous form-encoded POST returning the parsed JSON body.
///
/// No retries and no timeout handling beyond what the underlying client
/// applies; transport failures surface directly to the caller.
pub trait Transport {
    fn post(&mut self, user_agent: &str, pairs: &[(String, String)]) -> Result<Value>;
    fn request_count(&self) -> usize;
}

pub struct HttpTransport {
    client: Client,
    api_url: String,
    request_count: usize,
}

impl HttpTransport {
    pub fn new(api_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            request_count: 0,
        })
    }
}

impl Transport for HttpTransport {
    fn post(&mut self, user_agent: &str, pairs: &[(String, String)]) -> Result<Value> {
        self.request_count += 1;
        let response = self
            .client
            .post(&self.api_url)
            .header("User-Agent", user_agent.to_string())
            .form(&pairs.to_vec())
            .send()
            .context("failed to call MediaWiki API")?;

        let status = response.status();
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }
        response
            .json()
            .context("failed to decode MediaWiki API JSON response")
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
