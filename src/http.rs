// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, validators, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// ETag header value, if present
    pub etag: Option<String>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// Result of a HEAD probe against a remote resource
#[derive(Debug, Clone, Default)]
pub struct RemoteProbe {
    /// ETag header value, if present
    pub etag: Option<String>,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body as bytes
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error>;

    /// Get a streaming response for large downloads.
    ///
    /// When `if_none_match` carries a previously seen ETag the request is
    /// conditional and the server may answer 304 with an empty body.
    async fn get_stream(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error>;

    /// Probe a remote resource with a HEAD request, returning its
    /// validators without transferring the body.
    async fn probe(&self, url: &str) -> Result<RemoteProbe, reqwest::Error>;
}

fn header_string(headers: &reqwest::header::HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.client.get(url).send().await?.bytes().await
    }

    async fn get_stream(
        &self,
        url: &str,
        if_none_match: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.get(url);
        if let Some(token) = if_none_match {
            request = request.header(reqwest::header::IF_NONE_MATCH, token);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let etag = header_string(response.headers(), reqwest::header::ETAG);

        Ok(HttpResponse {
            status,
            content_length,
            etag,
            body: Box::pin(response.bytes_stream()),
        })
    }

    async fn probe(&self, url: &str) -> Result<RemoteProbe, reqwest::Error> {
        let response = self.client.head(url).send().await?;

        // HEAD responses carry no body, so read the header directly
        // instead of relying on the body size hint.
        let content_length = header_string(response.headers(), reqwest::header::CONTENT_LENGTH)
            .and_then(|value| value.parse().ok());
        let etag = header_string(response.headers(), reqwest::header::ETAG);

        Ok(RemoteProbe {
            etag,
            content_length,
        })
    }
}
