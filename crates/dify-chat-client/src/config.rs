use std::time::Duration;

use crate::errors::ClientError;

/// Connection settings for one Dify app.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the app API, for example `https://api.dify.ai/v1`.
    pub api_url: String,
    /// App API key used for bearer auth.
    pub api_key: String,
    /// Timeout for non-streaming requests. Streaming responses are not
    /// bounded by it; use an `AbortHandle` to stop a long answer.
    pub timeout: Duration,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Creates a config with default timeouts.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Builds a config from `DIFY_API_URL` (default `https://api.dify.ai/v1`)
    /// and `DIFY_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var("DIFY_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ClientError::Config("missing DIFY_API_KEY".into()));
        }
        let api_url = std::env::var("DIFY_API_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.dify.ai/v1".to_string());
        Ok(Self::new(api_url, api_key))
    }

    /// Overrides the non-streaming request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.api_key.trim().is_empty() {
            return Err(ClientError::Config("api_key must not be empty".into()));
        }
        let url = self.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "api_url must start with http:// or https://, got {url:?}"
            )));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Endpoint URL built from path segments. Each segment is
    /// percent-encoded, so ids cannot change the path shape.
    pub(crate) fn endpoint_segments(&self, segments: &[&str]) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(self.api_url.trim())
            .map_err(|e| ClientError::Config(format!("invalid api_url {:?}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| ClientError::Config(format!("api_url {:?} cannot take a path", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
