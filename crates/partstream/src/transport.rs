use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, StatusCode, header};
use tracing::debug;
use url::Url;

use crate::config::HttpConfig;
use crate::error::TransferError;

/// Streamed body of a ranged response.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Outcome of a ranged request: the raw status plus the body stream.
///
/// The status is surfaced untouched so the engine can enforce its own
/// partial-content contract; the transport does not interpret it. Dropping
/// the body aborts whatever request is still in flight behind it.
pub struct RangeResponse {
    pub status: StatusCode,
    pub body: BodyStream,
}

/// Issues ranged GET requests for single parts.
///
/// The engine requires HTTP 206 Partial Content for every part and treats any
/// other status as a hard failure for that part, so implementations should
/// pass the status through rather than mapping it.
#[async_trait]
pub trait RangeTransport: Send + Sync {
    async fn fetch_range(
        &self,
        url: &Url,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<RangeResponse, TransferError>;
}

/// Build a reqwest client from the transport configuration.
pub fn create_client(config: &HttpConfig) -> Result<Client, TransferError> {
    let redirect_policy = if config.follow_redirects {
        reqwest::redirect::Policy::default()
    } else {
        reqwest::redirect::Policy::none()
    };

    let client = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(config.headers.clone())
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .redirect(redirect_policy)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(config.pool_idle_timeout)
        .build()?;

    Ok(client)
}

/// Production transport over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Result<Self, TransferError> {
        Self::with_config(&HttpConfig::default())
    }

    pub fn with_config(config: &HttpConfig) -> Result<Self, TransferError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RangeTransport for HttpTransport {
    async fn fetch_range(
        &self,
        url: &Url,
        start_byte: u64,
        end_byte: u64,
    ) -> Result<RangeResponse, TransferError> {
        debug!(url = %url, start = start_byte, end = end_byte, "issuing ranged request");

        let response = self
            .client
            .get(url.clone())
            .header(header::RANGE, format!("bytes={start_byte}-{end_byte}"))
            .send()
            .await?;

        let status = response.status();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        Ok(RangeResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let config = HttpConfig::default();
        assert!(create_client(&config).is_ok());
        assert!(HttpTransport::new().is_ok());
    }

    #[test]
    fn client_honors_disabled_redirects() {
        let config = HttpConfig {
            follow_redirects: false,
            ..HttpConfig::default()
        };
        assert!(HttpTransport::with_config(&config).is_ok());
    }
}
