//! The message handler pipeline.
//!
//! [`MessageHandler`] wraps a [`Transport`] and drives one logical call
//! through as many send attempts as its retry and redirect budgets allow.
//! Before every attempt it stamps `User-Agent` and `Date` headers and runs
//! the registered [`ExecuteInterceptor`]s in registration order. After a
//! failed attempt it consults the [`UnsuccessfulResponseHandler`]s or
//! [`ExceptionHandler`]s; any handler returning `true` asks for a retry.
//!
//! Handler lists are guarded by one lock each and are snapshotted per
//! attempt, so registration from other calls never races an iteration.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use http::{header, Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::transport::{set_header, HttpRequest, HttpResponse, Transport};
use crate::{Error, Result};

/// Upper bound for both the try and the redirect budget.
pub const MAX_ALLOWED_TRIES: u32 = 20;

/// Library identifier appended to the `User-Agent` header.
pub const USER_AGENT_SUFFIX: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Hook invoked immediately before every send attempt, retries included.
#[async_trait]
pub trait ExecuteInterceptor: Send + Sync {
    /// May rewrite the outgoing request. An error aborts the call.
    async fn intercept(
        &self,
        request: &mut HttpRequest,
        cancellation: &CancellationToken,
    ) -> Result<()>;
}

/// Arguments passed to an [`UnsuccessfulResponseHandler`].
pub struct HandleResponseArgs<'a> {
    pub request: &'a HttpRequest,
    pub response: &'a HttpResponse,
    /// The configured number of tries.
    pub total_tries: u32,
    /// How many attempts of this call have failed so far.
    pub current_failed_try: u32,
    pub cancellation: &'a CancellationToken,
}

impl HandleResponseArgs<'_> {
    /// Returns `true` while the try budget still allows another attempt.
    pub fn supports_retry(&self) -> bool {
        self.total_tries > self.current_failed_try
    }
}

/// Arguments passed to an [`ExceptionHandler`].
pub struct HandleExceptionArgs<'a> {
    pub request: &'a HttpRequest,
    pub error: &'a Error,
    /// The configured number of tries.
    pub total_tries: u32,
    /// How many attempts of this call have failed so far.
    pub current_failed_try: u32,
    pub cancellation: &'a CancellationToken,
}

impl HandleExceptionArgs<'_> {
    /// Returns `true` while the try budget still allows another attempt.
    pub fn supports_retry(&self) -> bool {
        self.total_tries > self.current_failed_try
    }
}

/// Decides whether a non-2xx response should be retried.
#[async_trait]
pub trait UnsuccessfulResponseHandler: Send + Sync {
    /// Returns `Ok(true)` to request a retry. An error (typically
    /// [`Error::Cancelled`]) ends the call.
    async fn handle_response(&self, args: &HandleResponseArgs<'_>) -> Result<bool>;
}

/// Decides whether a transport failure should be retried.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    /// Returns `Ok(true)` to request a retry. An error (typically
    /// [`Error::Cancelled`]) ends the call.
    async fn handle_exception(&self, args: &HandleExceptionArgs<'_>) -> Result<bool>;
}

/// What a failed attempt left behind.
enum Failure {
    Response(HttpResponse),
    Error(Error),
}

/// Outcome of a single send attempt.
enum Attempt {
    Success(HttpResponse),
    Retry(Failure),
    Redirect(HttpResponse),
    Final(HttpResponse),
    Fatal(Error),
}

/// Retry- and redirect-aware wrapper around a [`Transport`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use http::Method;
/// use tokio_util::sync::CancellationToken;
/// use url::Url;
/// use vws_client::pipeline::MessageHandler;
/// use vws_client::transport::{HttpRequest, ReqwestTransport};
///
/// # async fn example() -> Result<(), vws_client::Error> {
/// let handler = MessageHandler::new(Arc::new(ReqwestTransport::new(None)?))
///     .with_max_tries(5)?
///     .with_application_name("inventory-sync");
///
/// let request = HttpRequest::new(Method::GET, Url::parse("https://vws.example.com/summary")?);
/// let response = handler.send(request, &CancellationToken::new()).await?;
/// println!("{} after {} attempts", response.status, response.attempts);
/// # Ok(())
/// # }
/// ```
pub struct MessageHandler {
    transport: Arc<dyn Transport>,
    application_name: Option<String>,
    max_tries: u32,
    max_redirects: u32,
    follow_redirects: bool,
    execute_interceptors: RwLock<Vec<Arc<dyn ExecuteInterceptor>>>,
    unsuccessful_response_handlers: RwLock<Vec<Arc<dyn UnsuccessfulResponseHandler>>>,
    exception_handlers: RwLock<Vec<Arc<dyn ExceptionHandler>>>,
}

impl MessageHandler {
    /// Creates a handler with 3 tries, 10 redirects and redirects followed.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            application_name: None,
            max_tries: 3,
            max_redirects: 10,
            follow_redirects: true,
            execute_interceptors: RwLock::new(Vec::new()),
            unsuccessful_response_handlers: RwLock::new(Vec::new()),
            exception_handlers: RwLock::new(Vec::new()),
        }
    }

    /// Sets how many attempts a call may make for error responses and
    /// transport failures. `1` disables retries.
    ///
    /// # Errors
    ///
    /// Returns an error unless `1 <= max_tries <= 20`.
    pub fn with_max_tries(mut self, max_tries: u32) -> Result<Self> {
        check_budget("max_tries", max_tries)?;
        self.max_tries = max_tries;
        Ok(self)
    }

    /// Sets how many redirects a call may follow.
    ///
    /// # Errors
    ///
    /// Returns an error unless `1 <= max_redirects <= 20`.
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Result<Self> {
        check_budget("max_redirects", max_redirects)?;
        self.max_redirects = max_redirects;
        Ok(self)
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    /// The `User-Agent` value stamped on every attempt.
    pub fn user_agent(&self) -> String {
        match &self.application_name {
            Some(name) => format!("{} {}", name, USER_AGENT_SUFFIX),
            None => USER_AGENT_SUFFIX.to_string(),
        }
    }

    pub fn add_execute_interceptor(&self, interceptor: Arc<dyn ExecuteInterceptor>) {
        write(&self.execute_interceptors).push(interceptor);
    }

    pub fn remove_execute_interceptor(&self, interceptor: &Arc<dyn ExecuteInterceptor>) {
        write(&self.execute_interceptors).retain(|i| !same(i, interceptor));
    }

    pub fn add_unsuccessful_response_handler(&self, handler: Arc<dyn UnsuccessfulResponseHandler>) {
        write(&self.unsuccessful_response_handlers).push(handler);
    }

    pub fn remove_unsuccessful_response_handler(
        &self,
        handler: &Arc<dyn UnsuccessfulResponseHandler>,
    ) {
        write(&self.unsuccessful_response_handlers).retain(|h| !same(h, handler));
    }

    pub fn add_exception_handler(&self, handler: Arc<dyn ExceptionHandler>) {
        write(&self.exception_handlers).push(handler);
    }

    pub fn remove_exception_handler(&self, handler: &Arc<dyn ExceptionHandler>) {
        write(&self.exception_handlers).retain(|h| !same(h, handler));
    }

    /// Sends `request`, retrying and following redirects as configured.
    ///
    /// Returns the last response received, successful or not. A transport
    /// error is returned only when no handler accepted it or when the budget
    /// ran out without any response. Cancellation ends the call with
    /// [`Error::Cancelled`] at the next suspension point.
    pub async fn send(
        &self,
        mut request: HttpRequest,
        cancellation: &CancellationToken,
    ) -> Result<HttpResponse> {
        let mut tries_remaining = self.max_tries;
        let mut redirects_remaining = self.max_redirects;
        let mut attempts = 0usize;

        loop {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempts += 1;

            self.stamp_headers(&mut request);
            for interceptor in snapshot(&self.execute_interceptors) {
                interceptor.intercept(&mut request, cancellation).await?;
            }

            tracing::debug!(
                method = %request.method,
                url = %request.url,
                attempt = attempts,
                "Executing HTTP request"
            );

            let result = tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(Error::Cancelled),
                result = self.transport.send(&request) => result,
            };

            let counts_as_failed_try = match &result {
                Ok(response) => {
                    response.status.as_u16() < 200 || response.status.as_u16() >= 400
                }
                Err(_) => true,
            };
            if counts_as_failed_try {
                tries_remaining = tries_remaining.saturating_sub(1);
            }

            let last = match self
                .evaluate(
                    result,
                    &mut request,
                    tries_remaining,
                    &mut redirects_remaining,
                    cancellation,
                )
                .await
            {
                Attempt::Success(response) => return Ok(with_attempts(response, attempts)),
                Attempt::Final(response) => {
                    tracing::debug!(
                        status = response.status.as_u16(),
                        attempts = attempts,
                        "Abnormal response is being returned"
                    );
                    return Ok(with_attempts(response, attempts));
                }
                Attempt::Fatal(error) => return Err(error),
                Attempt::Redirect(response) => Failure::Response(response),
                Attempt::Retry(failure) => failure,
            };

            if tries_remaining == 0 {
                return match last {
                    Failure::Response(response) => {
                        tracing::debug!(
                            status = response.status.as_u16(),
                            attempts = attempts,
                            "Retries exhausted, returning last response"
                        );
                        Ok(with_attempts(response, attempts))
                    }
                    Failure::Error(error) => {
                        tracing::error!(
                            error = %error,
                            attempts = attempts,
                            "Exception was thrown while executing a HTTP request"
                        );
                        Err(error)
                    }
                };
            }
        }
    }

    async fn evaluate(
        &self,
        result: Result<HttpResponse>,
        request: &mut HttpRequest,
        tries_remaining: u32,
        redirects_remaining: &mut u32,
        cancellation: &CancellationToken,
    ) -> Attempt {
        let current_failed_try = self.max_tries - tries_remaining;

        let response = match result {
            Ok(response) if response.status.is_success() => return Attempt::Success(response),
            Ok(response) => response,
            Err(Error::Cancelled) => return Attempt::Fatal(Error::Cancelled),
            Err(error) => {
                let args = HandleExceptionArgs {
                    request,
                    error: &error,
                    total_tries: self.max_tries,
                    current_failed_try,
                    cancellation,
                };
                let mut handled = false;
                for handler in snapshot(&self.exception_handlers) {
                    match handler.handle_exception(&args).await {
                        Ok(h) => handled |= h,
                        Err(e) => return Attempt::Fatal(e),
                    }
                }
                if !handled {
                    tracing::error!(
                        error = %error,
                        "Exception was thrown while executing a HTTP request and it wasn't handled"
                    );
                    return Attempt::Fatal(error);
                }
                tracing::debug!(
                    error = %error,
                    "Exception was thrown, but it was handled by an exception handler"
                );
                return Attempt::Retry(Failure::Error(error));
            }
        };

        let handled = {
            let args = HandleResponseArgs {
                request,
                response: &response,
                total_tries: self.max_tries,
                current_failed_try,
                cancellation,
            };
            let mut handled = false;
            for handler in snapshot(&self.unsuccessful_response_handlers) {
                match handler.handle_response(&args).await {
                    Ok(h) => handled |= h,
                    Err(e) => return Attempt::Fatal(e),
                }
            }
            handled
        };

        if handled {
            tracing::debug!(
                status = response.status.as_u16(),
                "An abnormal response was handled by an unsuccessful response handler"
            );
            return Attempt::Retry(Failure::Response(response));
        }

        if self.follow_redirects && apply_redirect(request, &response) {
            if *redirects_remaining == 0 {
                tracing::debug!(
                    status = response.status.as_u16(),
                    "Redirect budget exhausted"
                );
                return Attempt::Final(response);
            }
            *redirects_remaining -= 1;
            tracing::debug!(location = %request.url, "Redirect response was handled successfully");
            return Attempt::Redirect(response);
        }

        tracing::debug!(
            status = response.status.as_u16(),
            "An abnormal response wasn't handled"
        );
        Attempt::Final(response)
    }

    fn stamp_headers(&self, request: &mut HttpRequest) {
        set_header(&mut request.headers, header::USER_AGENT, &self.user_agent());
        set_header(
            &mut request.headers,
            header::DATE,
            &httpdate::fmt_http_date(SystemTime::now()),
        );
    }
}

/// Returns `true` for the redirect statuses the pipeline follows.
pub fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
    )
}

/// Rewrites `request` to follow a redirect `response`.
///
/// The URL is resolved against the current one, a 303 switches the method to
/// GET and drops the body, and `Authorization` plus the conditional `If-*`
/// headers are removed. Returns `false` (leaving the request untouched) when
/// the status is not a redirect or no usable `Location` is present.
pub fn apply_redirect(request: &mut HttpRequest, response: &HttpResponse) -> bool {
    if !is_redirect(response.status) {
        return false;
    }
    let Some(location) = response.header(header::LOCATION.as_str()) else {
        return false;
    };
    let target = match request.url.join(location) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(location = location, error = %e, "Ignoring unparseable redirect location");
            return false;
        }
    };

    request.url = target;
    if response.status == StatusCode::SEE_OTHER {
        request.method = Method::GET;
        request.body = None;
    }
    for name in [
        header::AUTHORIZATION,
        header::IF_MATCH,
        header::IF_NONE_MATCH,
        header::IF_MODIFIED_SINCE,
        header::IF_UNMODIFIED_SINCE,
        header::IF_RANGE,
    ] {
        request.headers.remove(name);
    }
    true
}

/// Rejects requests whose URL is longer than a configured maximum.
#[derive(Debug, Clone, Copy)]
pub struct MaxUrlLengthInterceptor {
    max_length: usize,
}

impl MaxUrlLengthInterceptor {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

#[async_trait]
impl ExecuteInterceptor for MaxUrlLengthInterceptor {
    async fn intercept(&self, request: &mut HttpRequest, _: &CancellationToken) -> Result<()> {
        let length = request.url.as_str().len();
        if length > self.max_length {
            return Err(Error::UrlTooLong {
                length,
                max: self.max_length,
            });
        }
        Ok(())
    }
}

fn with_attempts(mut response: HttpResponse, attempts: usize) -> HttpResponse {
    response.attempts = attempts;
    response
}

fn check_budget(name: &str, value: u32) -> Result<()> {
    if value == 0 || value > MAX_ALLOWED_TRIES {
        return Err(Error::ConfigurationError(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_ALLOWED_TRIES, value
        )));
    }
    Ok(())
}

fn snapshot<T: ?Sized>(list: &RwLock<Vec<Arc<T>>>) -> Vec<Arc<T>> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T: ?Sized>(list: &RwLock<Vec<Arc<T>>>) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<T>>> {
    list.write().unwrap_or_else(PoisonError::into_inner)
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
