//! The transport seam between the message pipeline and the network.
//!
//! [`HttpRequest`] and [`HttpResponse`] are plain owned values so that
//! interceptors can rewrite a request between attempts and handlers can
//! inspect a response without consuming its body. [`ReqwestTransport`] is the
//! production implementation; tests substitute their own [`Transport`].

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use http::{Extensions, HeaderMap, HeaderValue, Method, StatusCode};
use url::Url;

use crate::{Error, Result};

/// A response body delivered as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An outgoing HTTP request.
///
/// `extensions` carries typed per-call values to interceptors, for example the
/// [`AccessKeys`](crate::AccessKeys) the credential signs with.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub extensions: Extensions,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            extensions: Extensions::new(),
        }
    }

    /// Returns a header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A received HTTP response whose body has not been read yet.
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// The URL of the request that produced this response.
    pub url: Url,
    /// Number of send attempts made for the logical call, set by the pipeline.
    pub attempts: usize,
    // Behind a lock so that responses can be shared with handlers across awaits.
    body: Mutex<BodyStream>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            url,
            attempts: 1,
            body: Mutex::new(body),
        }
    }

    /// Creates a response with an in-memory body.
    pub fn from_bytes(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        body: impl Into<Bytes>,
    ) -> Self {
        let chunk: Bytes = body.into();
        Self::new(status, headers, url, Box::pin(stream::once(async move { Ok::<_, Error>(chunk) })))
    }

    /// Returns a header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let chunks: Vec<Bytes> = self.into_body_stream().try_collect().await?;
        match chunks.len() {
            0 => Ok(Bytes::new()),
            1 => Ok(chunks.into_iter().next().unwrap_or_default()),
            _ => Ok(Bytes::from(chunks.concat())),
        }
    }

    /// Reads the whole body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Gives up the metadata and returns the unread body.
    pub fn into_body_stream(self) -> BodyStream {
        self.body.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Sends one HTTP request and returns the response without interpreting it.
///
/// Implementations must be safe to share across concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
///
/// Automatic redirects are disabled: redirect policy belongs to the
/// [`MessageHandler`](crate::pipeline::MessageHandler).
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing client. Its redirect policy should be `none`.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(Error::from_transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes_stream().map_err(Error::from_transport);

        Ok(HttpResponse::new(status, headers, url, Box::pin(body)))
    }
}

/// Inserts a header built from text, ignoring values that are not valid
/// header values.
pub(crate) fn set_header(headers: &mut HeaderMap, name: http::HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => tracing::warn!(header = %name, error = %e, "Dropping invalid header value"),
    }
}
