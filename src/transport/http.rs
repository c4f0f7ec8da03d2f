//! Plain HTTP helpers used by the `fetch` template callbacks

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Method;

use crate::common::{Error, Result};

const USER_AGENT: &str = "rpcflow";

/// On-demand HTTP access for templates
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body text
    fn get(&self, url: &str) -> Result<String>;

    /// POST to `url` with an empty body and return the body text
    fn post(&self, url: &str) -> Result<String>;
}

/// [`Fetcher`] backed by a blocking reqwest client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn fetch(&self, method: Method, url: &str) -> Result<String> {
        tracing::debug!(%method, url, "Fetching");

        let response = self
            .client
            .request(method, url)
            .send()
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(url, format!("HTTP {status}")));
        }

        response.text().map_err(|e| Error::fetch(url, e))
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<String> {
        self.fetch(Method::GET, url)
    }

    fn post(&self, url: &str) -> Result<String> {
        self.fetch(Method::POST, url)
    }
}
