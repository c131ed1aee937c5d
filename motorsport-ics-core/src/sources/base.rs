use std::time::Duration;

use reqwest::{Client, ClientBuilder, header::HeaderMap, header::HeaderValue};
use serde::de::DeserializeOwned;

use crate::{Error, Result, sources::FetchContext};

/// Shared HTTP plumbing for sources.
pub struct BaseSourceBuilder {
    pub client_builder: ClientBuilder,
    pub info: SourceInfo,
}

pub struct BaseSource {
    pub client: Client,
    pub info: SourceInfo,
}

pub struct SourceInfo {
    pub name: String,
    pub description: String,
    pub priority: u32,
}

impl BaseSourceBuilder {
    pub fn new(info: SourceInfo) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("application/json, */*;q=0.5"));
        headers.insert(
            "Accept-Encoding",
            HeaderValue::from_static("br;q=1.0, gzip;q=0.9, deflate;q=0.8"),
        );
        headers.insert(
            "Accept-Language",
            HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
        );

        let client_builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("motorsport-ics/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        Self {
            client_builder,
            info,
        }
    }

    pub fn new_with_timeout(info: SourceInfo, timeout: Duration) -> Self {
        let mut s = Self::new(info);
        s.client_builder = s.client_builder.timeout(timeout);
        s
    }

    pub fn build(self) -> Result<BaseSource> {
        let client = self.client_builder.build().map_err(|e| {
            Error::Config(format!(
                "Failed to create HTTP client for {}: {}",
                self.info.name, e
            ))
        })?;

        Ok(BaseSource {
            client,
            info: self.info,
        })
    }
}

impl BaseSource {
    /// Map a transport error onto the crate taxonomy.
    ///
    /// Timeouts and connection failures stay retryable; request building,
    /// redirect and body decoding failures do not.
    pub fn handle_error_req(&self, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else if error.is_connect() {
            Error::Http(error)
        } else {
            Error::Source {
                name: self.info.name.clone(),
                message: format!("Request failed: {}", error),
            }
        }
    }

    pub fn custom_error(&self, message: impl Into<String>) -> Error {
        Error::Source {
            name: self.info.name.clone(),
            message: message.into(),
        }
    }

    /// GET a JSON document, honoring cancellation between request and body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, ctx: &FetchContext) -> Result<T> {
        ctx.cancel.check()?;
        tracing::debug!(source = %self.info.name, attempt = ctx.attempt, url, "Fetching");

        let response = self
            .client
            .get(url)
            .timeout(ctx.timeout)
            .send()
            .await
            .map_err(|e| self.handle_error_req(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.custom_error(format!("HTTP {} error", status)));
        }

        ctx.cancel.check()?;
        let body = response.bytes().await.map_err(|e| self.handle_error_req(e))?;

        serde_json::from_slice(&body)
            .map_err(|e| self.custom_error(format!("Failed to parse response: {}", e)))
    }
}
