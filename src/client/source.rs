//! Event sources
//!
//! The controller opens streams through the [`EventSource`] trait so the
//! transport can be swapped out; [`HttpEventSource`] is the real one.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use std::time::Duration;

use super::ClientError;

/// Raw body chunks of an open event stream
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Something that can open an identified event stream
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a stream for `client_id`.
    ///
    /// Returning `Ok` means the stream is open; the controller then reads it
    /// until it errors or ends.
    async fn open(&self, client_id: &str) -> Result<ByteStream, ClientError>;
}

/// `GET {base_url}/api/socket?userId=...` over HTTP
pub struct HttpEventSource {
    client: Client,
    base_url: String,
}

impl HttpEventSource {
    /// Create a source for the hub at `base_url`.
    ///
    /// Only the connect phase is time-bounded; the body is expected to stay
    /// open indefinitely.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn open(&self, client_id: &str) -> Result<ByteStream, ClientError> {
        let url = format!("{}/api/socket", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("userId", client_id)])
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}
