//! The client service: shared configuration and pipeline for typed requests.
//!
//! A [`ClientService`] owns the [`MessageHandler`] every request of a service
//! is sent through, the [`Serializer`] for bodies and the signing
//! [`Credential`]. Use [`ClientServiceBuilder`] to configure and create one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::backoff::{BackOffHandler, BackOffPolicy};
use crate::credential::Credential;
use crate::pipeline::{MaxUrlLengthInterceptor, MessageHandler};
use crate::serializer::{JsonSerializer, Serializer};
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::types::ErrorResponse;
use crate::{Error, Result};

/// Default maximum length of a request URL.
pub const DEFAULT_MAX_URL_LENGTH: usize = 2048;

/// A configured service that typed requests are executed against.
///
/// The service is cheap to clone and is meant to be shared across concurrent
/// requests; clones share the connection pool and the handler lists.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use vws_client::ClientService;
///
/// # fn example() -> Result<(), vws_client::Error> {
/// let service = ClientService::builder()
///     .base_url("https://vws.vuforia.com/")?
///     .service_name("target")
///     .application_name("inventory-sync")
///     .timeout(Duration::from_secs(30))
///     .max_tries(5)
///     .build()?;
///
/// assert_eq!(service.name(), "target");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientService {
    inner: Arc<ClientServiceInner>,
}

struct ClientServiceInner {
    name: String,
    base_url: Url,
    application_name: Option<String>,
    serializer: Arc<dyn Serializer>,
    credential: Option<Arc<Credential>>,
    handler: MessageHandler,
}

impl ClientService {
    pub fn builder() -> ClientServiceBuilder {
        ClientServiceBuilder::new()
    }

    /// The service name reported in errors.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The URL every request path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn application_name(&self) -> Option<&str> {
        self.inner.application_name.as_deref()
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.inner.serializer.as_ref()
    }

    pub fn credential(&self) -> Option<&Arc<Credential>> {
        self.inner.credential.as_ref()
    }

    /// The pipeline requests are sent through. Interceptors and handlers may
    /// be registered on it at any time.
    pub fn handler(&self) -> &MessageHandler {
        &self.inner.handler
    }

    /// Serializes a request body. A JSON string value is sent as-is.
    pub fn serialize(&self, body: &Value) -> Result<String> {
        match body {
            Value::String(raw) => Ok(raw.clone()),
            other => self
                .inner
                .serializer
                .serialize(other)
                .map_err(Error::SerializationFailed),
        }
    }

    /// Parses the body of a successful response into `T`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ResponseParse`] if the text is not valid for the
    /// serializer's format or does not describe a `T`.
    pub fn deserialize_response<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        let parse_error = |reason: String| {
            tracing::error!(
                service = %self.inner.name,
                error = %reason,
                raw_response = %text,
                "Failed to deserialize response"
            );
            Error::ResponseParse {
                service: self.inner.name.clone(),
                raw_response: text.to_string(),
                reason,
            }
        };
        let value = self.inner.serializer.deserialize(text).map_err(parse_error)?;
        serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))
    }

    /// Parses the body of an error response.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ErrorResponseParse`] if the text cannot be parsed
    /// or parses to nothing.
    pub fn deserialize_error(&self, text: &str) -> Result<ErrorResponse> {
        let parse_error = |reason: String| Error::ErrorResponseParse {
            service: self.inner.name.clone(),
            raw_response: text.to_string(),
            reason,
        };
        let value = self.inner.serializer.deserialize(text).map_err(parse_error)?;
        if value.is_null() {
            return Err(parse_error("error response is empty".to_string()));
        }
        serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))
    }

    /// Sends a request through the service pipeline.
    pub async fn send(
        &self,
        request: HttpRequest,
        cancellation: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.inner.handler.send(request, cancellation).await
    }

    /// Runs `future` to completion on a runtime local to this call, blocking
    /// the calling thread. The runtime is shut down before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ConfigurationError`] when called from inside an
    /// async runtime, where blocking would stall the executor.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::ConfigurationError(
                "Blocking execution cannot be used from within an async runtime".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to start blocking runtime: {}", e))
            })?;
        Ok(runtime.block_on(future))
    }
}

impl std::fmt::Debug for ClientService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientService")
            .field("name", &self.inner.name)
            .field("base_url", &self.inner.base_url.as_str())
            .field("application_name", &self.inner.application_name)
            .field("format", &self.inner.serializer.format())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and creating a [`ClientService`].
///
/// Defaults: 3 tries, 10 redirects followed, back-off on 503 responses with
/// an [`ExponentialBackOff`](crate::backoff::ExponentialBackOff), JSON bodies,
/// a fresh [`Credential`], a reqwest transport and a 2048 character URL limit.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use vws_client::backoff::BackOffPolicy;
/// use vws_client::ClientServiceBuilder;
///
/// # fn example() -> Result<(), vws_client::Error> {
/// let service = ClientServiceBuilder::new()
///     .base_url("https://vws.vuforia.com/")?
///     .service_name("target")
///     .back_off_policy(BackOffPolicy::ALL)
///     .max_redirects(3)
///     .max_url_length(0)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientServiceBuilder {
    base_url: Option<Url>,
    service_name: Option<String>,
    application_name: Option<String>,
    timeout: Option<Duration>,
    max_tries: u32,
    max_redirects: u32,
    follow_redirects: bool,
    back_off_policy: BackOffPolicy,
    back_off_handler: Option<BackOffHandler>,
    credential: Option<Arc<Credential>>,
    sign_requests: bool,
    serializer: Arc<dyn Serializer>,
    transport: Option<Arc<dyn Transport>>,
    max_url_length: usize,
}

impl ClientServiceBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            service_name: None,
            application_name: None,
            timeout: None,
            max_tries: 3,
            max_redirects: 10,
            follow_redirects: true,
            back_off_policy: BackOffPolicy::default(),
            back_off_handler: None,
            credential: None,
            sign_requests: true,
            serializer: Arc::new(JsonSerializer),
            transport: None,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
        }
    }

    /// Sets the URL all request paths are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    pub(crate) fn has_base_url(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the application name sent in the `User-Agent` header.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Sets the per-attempt timeout of the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the try budget, validated in [`build`](Self::build) (1 to 20).
    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Sets the redirect budget, validated in [`build`](Self::build) (1 to 20).
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Chooses which failures the back-off handler is registered for.
    pub fn back_off_policy(mut self, policy: BackOffPolicy) -> Self {
        self.back_off_policy = policy;
        self
    }

    /// Replaces the default back-off handler.
    pub fn back_off_handler(mut self, handler: BackOffHandler) -> Self {
        self.back_off_handler = Some(handler);
        self
    }

    /// Uses a shared credential, e.g. to inspect the tokens it issues.
    pub fn credential(mut self, credential: Arc<Credential>) -> Self {
        self.credential = Some(credential);
        self.sign_requests = true;
        self
    }

    /// Sends requests without an `Authorization` header.
    pub fn without_credential(mut self) -> Self {
        self.credential = None;
        self.sign_requests = false;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replaces the reqwest transport. [`timeout`](Self::timeout) only
    /// applies to the default transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the longest URL a request may have. `0` disables the check.
    pub fn max_url_length(mut self, max_url_length: usize) -> Self {
        self.max_url_length = max_url_length;
        self
    }

    /// Builds the configured service.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL or service name was provided, if a
    /// budget is out of range, or if the default transport cannot be built.
    pub fn build(self) -> Result<ClientService> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::ConfigurationError("Base URL is required".to_string()))?;
        let name = self
            .service_name
            .ok_or_else(|| Error::ConfigurationError("Service name is required".to_string()))?;

        if self.application_name.is_none() {
            tracing::warn!(
                service = %name,
                "Application name is not set. It is recommended to set it for all services"
            );
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.timeout)?),
        };

        let mut handler = MessageHandler::new(transport)
            .with_max_tries(self.max_tries)?
            .with_max_redirects(self.max_redirects)?
            .with_follow_redirects(self.follow_redirects);
        if let Some(application_name) = &self.application_name {
            handler = handler.with_application_name(application_name.clone());
        }

        if self.max_url_length > 0 {
            handler.add_execute_interceptor(Arc::new(MaxUrlLengthInterceptor::new(
                self.max_url_length,
            )));
        }

        let credential = if self.sign_requests {
            Some(self.credential.unwrap_or_default())
        } else {
            None
        };
        if let Some(credential) = &credential {
            handler.add_execute_interceptor(credential.clone());
            handler.add_unsuccessful_response_handler(credential.clone());
        }

        if self.back_off_policy != BackOffPolicy::NONE {
            let back_off = Arc::new(self.back_off_handler.unwrap_or_default());
            if self.back_off_policy.handles_exceptions() {
                handler.add_exception_handler(back_off.clone());
            }
            if self.back_off_policy.handles_unsuccessful_responses() {
                handler.add_unsuccessful_response_handler(back_off);
            }
        }

        Ok(ClientService {
            inner: Arc::new(ClientServiceInner {
                name,
                base_url,
                application_name: self.application_name,
                serializer: self.serializer,
                credential,
                handler,
            }),
        })
    }
}

impl Default for ClientServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
