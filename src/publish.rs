//! Publishing line protocol records to InfluxDB 3.
//!
//! Each record is sent on its own with a `POST /api/v3/write_lp` request. A
//! `204 No Content` response is success; anything else is reported to the
//! caller and never retried.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "switchbot_meter";

/// Timeout budget of a single write.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status returned by InfluxDB when a write is accepted.
pub const STATUS_ACCEPTED: u16 = 204;

const WRITE_PATH: &str = "/api/v3/write_lp";
const PRECISION: &str = "second";
const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Publishing enabled with an unusable endpoint or credentials.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("InfluxDB URL is required when publishing is enabled")]
    MissingUrl,
    #[error("InfluxDB URL must start with http:// or https://, got {0:?}")]
    InvalidUrl(String),
    #[error("InfluxDB token is required when publishing is enabled")]
    MissingToken,
    #[error("InfluxDB database name must not be empty")]
    MissingDatabase,
}

/// Routing and credentials for the write endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub url: String,
    pub token: String,
    pub database: String,
    pub timeout: Duration,
}

impl PublishConfig {
    /// Validate publishing parameters before any request is attempted.
    pub fn new(
        url: Option<String>,
        token: Option<String>,
        database: String,
    ) -> Result<Self, ConfigError> {
        let url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(url));
        }
        let token = token
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)?;
        if database.trim().is_empty() {
            return Err(ConfigError::MissingDatabase);
        }

        Ok(Self {
            url,
            token,
            database,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Full write endpoint, without query parameters.
    pub fn write_url(&self) -> String {
        format!("{}{WRITE_PATH}", self.url.trim_end_matches('/'))
    }
}

/// One outbound write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest<'a> {
    pub url: String,
    pub body: &'a str,
    /// Value for the `Authorization` header
    pub authorization: String,
    pub content_type: &'static str,
    /// Query parameters (`db`, `precision`)
    pub query: [(&'static str, &'a str); 2],
    pub timeout: Duration,
}

/// Response status and body of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    pub status: u16,
    pub body: String,
}

/// Transport-level failure: connection, timeout or client setup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WriteResponse, TransportError>> + Send + 'a>>;

/// HTTP transport abstraction to enable tests without a server.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: WriteRequest<'a>) -> SendFuture<'a>;
}

/// Transport backed by one reused `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().http1_only().build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: WriteRequest<'a>) -> SendFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&request.url)
                .query(&request.query)
                .header(reqwest::header::AUTHORIZATION, request.authorization)
                .header(reqwest::header::CONTENT_TYPE, request.content_type)
                .timeout(request.timeout)
                .body(request.body.to_string())
                .send()
                .await?;

            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Ok(WriteResponse { status, body })
        })
    }
}

/// Why a record was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("InfluxDB rejected write: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Sends encoded records to the configured database.
pub struct Publisher<'t> {
    config: PublishConfig,
    transport: &'t dyn Transport,
}

impl<'t> Publisher<'t> {
    pub fn new(config: PublishConfig, transport: &'t dyn Transport) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    fn request<'a>(&'a self, line: &'a str) -> WriteRequest<'a> {
        WriteRequest {
            url: self.config.write_url(),
            body: line,
            authorization: format!("Bearer {}", self.config.token),
            content_type: CONTENT_TYPE,
            query: [("db", self.config.database.as_str()), ("precision", PRECISION)],
            timeout: self.config.timeout,
        }
    }

    /// Send one line protocol record.
    pub async fn publish(&self, line: &str) -> Result<(), PublishError> {
        let response = self.transport.send(self.request(line)).await?;
        if response.status == STATUS_ACCEPTED {
            debug!(database = %self.config.database, "write accepted");
            Ok(())
        } else {
            Err(PublishError::Rejected {
                status: response.status,
                body: response.body,
            })
        }
    }
}
