//! HTTP client used for package metadata and archive downloads

use std::time::Duration;

use crate::error::{EvalError, EvalResult};

const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new() -> EvalResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(format!("marl/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EvalError::io(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn fetch_text(&self, url: &str) -> EvalResult<String> {
        let response = self.get(url)?;
        response
            .text()
            .map_err(|e| EvalError::io(format!("failed to read response from {}: {}", url, e)))
    }

    pub fn fetch_bytes(&self, url: &str) -> EvalResult<Vec<u8>> {
        let response = self.get(url)?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| EvalError::io(format!("failed to read response from {}: {}", url, e)))
    }

    fn get(&self, url: &str) -> EvalResult<reqwest::blocking::Response> {
        tracing::debug!(url, "fetching");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| EvalError::io(format!("request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(EvalError::io(format!(
                "request to {} failed with status {}",
                url,
                response.status()
            )));
        }
        Ok(response)
    }
}
