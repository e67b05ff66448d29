//! Back-off strategies and the handler that waits between retries.
//!
//! A [`BackOff`] maps a retry number to a delay. [`BackOffHandler`] plugs a
//! back-off into the [`MessageHandler`](crate::pipeline::MessageHandler) as
//! both an unsuccessful-response handler and an exception handler: when its
//! [`RetryPredicate`] accepts a failure and the delay fits the configured
//! time span, it sleeps and asks for a retry.

use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{
    ExceptionHandler, HandleExceptionArgs, HandleResponseArgs, UnsuccessfulResponseHandler,
};
use crate::transport::HttpResponse;
use crate::{Error, Result};

/// Largest number of retries a back-off may be configured for.
pub const MAX_ALLOWED_RETRIES: u32 = 20;

/// Largest jitter an [`ExponentialBackOff`] accepts.
pub const MAX_DELTA: Duration = Duration::from_secs(1);

/// Maps a retry number to the delay before that retry.
pub trait BackOff: Send + Sync {
    /// Returns the delay before retry number `retry` (1-indexed), or `None`
    /// when no further retry should be made.
    fn next_back_off(&self, retry: u32) -> Option<Duration>;

    /// The maximum number of retries this back-off allows.
    fn max_num_of_retries(&self) -> u32;
}

/// Exponential back-off: `2^(retry - 1)` seconds plus a uniform jitter in
/// `[-delta, +delta]`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use vws_client::backoff::{BackOff, ExponentialBackOff};
///
/// let backoff = ExponentialBackOff::new()
///     .with_delta(Duration::ZERO).unwrap()
///     .with_max_num_of_retries(4).unwrap();
///
/// assert_eq!(backoff.next_back_off(1), Some(Duration::from_secs(1)));
/// assert_eq!(backoff.next_back_off(3), Some(Duration::from_secs(4)));
/// assert_eq!(backoff.next_back_off(5), None);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackOff {
    delta: Duration,
    max_num_of_retries: u32,
}

impl ExponentialBackOff {
    /// Creates a back-off with a 250 ms jitter and up to 10 retries.
    pub fn new() -> Self {
        Self {
            delta: Duration::from_millis(250),
            max_num_of_retries: 10,
        }
    }

    /// Sets the jitter bound.
    ///
    /// # Errors
    ///
    /// Returns an error if `delta` exceeds one second.
    pub fn with_delta(mut self, delta: Duration) -> Result<Self> {
        if delta > MAX_DELTA {
            return Err(Error::ConfigurationError(format!(
                "Back-off delta must be at most {:?}, got {:?}",
                MAX_DELTA, delta
            )));
        }
        self.delta = delta;
        Ok(self)
    }

    /// Sets how many retries the back-off allows.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exceeds 20.
    pub fn with_max_num_of_retries(mut self, max: u32) -> Result<Self> {
        check_max_retries(max)?;
        self.max_num_of_retries = max;
        Ok(self)
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }
}

impl Default for ExponentialBackOff {
    fn default() -> Self {
        Self::new()
    }
}

impl BackOff for ExponentialBackOff {
    fn next_back_off(&self, retry: u32) -> Option<Duration> {
        if retry > self.max_num_of_retries {
            return None;
        }

        // 2^(retry - 1) seconds, with retry 0 meaning half a second
        let base_ms = 1000u64.saturating_mul(1u64 << retry) / 2;

        let delta_ms = self.delta.as_millis() as i64;
        let jitter_ms = if delta_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(-delta_ms..=delta_ms)
        };

        let millis = (base_ms as i64).saturating_add(jitter_ms).max(0) as u64;
        Some(Duration::from_millis(millis))
    }

    fn max_num_of_retries(&self) -> u32 {
        self.max_num_of_retries
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackOff {
    delay: Duration,
    max_num_of_retries: u32,
}

impl ConstantBackOff {
    /// # Errors
    ///
    /// Returns an error if `max_num_of_retries` exceeds 20.
    pub fn new(delay: Duration, max_num_of_retries: u32) -> Result<Self> {
        check_max_retries(max_num_of_retries)?;
        Ok(Self {
            delay,
            max_num_of_retries,
        })
    }
}

impl BackOff for ConstantBackOff {
    fn next_back_off(&self, retry: u32) -> Option<Duration> {
        (retry <= self.max_num_of_retries).then_some(self.delay)
    }

    fn max_num_of_retries(&self) -> u32 {
        self.max_num_of_retries
    }
}

fn check_max_retries(max: u32) -> Result<()> {
    if max > MAX_ALLOWED_RETRIES {
        return Err(Error::ConfigurationError(format!(
            "max_num_of_retries must be at most {}, got {}",
            MAX_ALLOWED_RETRIES, max
        )));
    }
    Ok(())
}

/// A failed attempt as seen by a [`RetryPredicate`].
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// A non-2xx response was received.
    Response(&'a HttpResponse),
    /// The transport failed before a response arrived.
    Error(&'a Error),
}

/// Decides whether a failed attempt is worth backing off for.
///
/// # Examples
///
/// ```
/// use vws_client::backoff::{Failure, RetryPredicate};
///
/// struct RetryOnTooManyRequests;
///
/// impl RetryPredicate for RetryOnTooManyRequests {
///     fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
///         matches!(failure, Failure::Response(r) if r.status.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// `attempt` is the number of failed attempts so far (1-indexed).
    fn should_retry(&self, failure: Failure<'_>, attempt: u32) -> bool;
}

/// Retries 503 responses and every transport error except cancellation.
///
/// This is the predicate a [`BackOffHandler`] uses unless told otherwise.
#[derive(Debug, Clone, Copy)]
pub struct DefaultRetryPredicate;

impl RetryPredicate for DefaultRetryPredicate {
    fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
        match failure {
            Failure::Response(response) => response.status == StatusCode::SERVICE_UNAVAILABLE,
            Failure::Error(error) => !error.is_cancelled(),
        }
    }
}

/// Retries failures marked retryable: 5xx responses and transient transport
/// errors (see [`Error::is_retryable`]).
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
        match failure {
            Failure::Response(response) => response.status.is_server_error(),
            Failure::Error(error) => error.is_retryable(),
        }
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
        matches!(failure, Failure::Response(r) if r.status.is_server_error())
    }
}

/// Retry only on timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
        matches!(failure, Failure::Error(Error::Timeout))
    }
}

/// Retry only on network/connection errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, failure: Failure<'_>, _attempt: u32) -> bool {
        matches!(failure, Failure::Error(Error::Network(_)))
    }
}

/// Retries if ANY of the predicates does.
///
/// ```
/// use vws_client::backoff::{OrPredicate, RetryOn5xx, RetryOnTimeout};
///
/// let predicate = OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnTimeout)]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, failure: Failure<'_>, attempt: u32) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(failure, attempt))
    }
}

/// Retries only if ALL of the predicates do.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, failure: Failure<'_>, attempt: u32) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(failure, attempt))
    }
}

/// Which failure kinds the service registers its back-off handler for.
///
/// ```
/// use vws_client::backoff::BackOffPolicy;
///
/// let policy = BackOffPolicy::EXCEPTIONS | BackOffPolicy::UNSUCCESSFUL_RESPONSE_503;
/// assert_eq!(policy, BackOffPolicy::ALL);
/// assert_eq!(BackOffPolicy::default(), BackOffPolicy::UNSUCCESSFUL_RESPONSE_503);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackOffPolicy {
    exceptions: bool,
    unsuccessful_responses: bool,
}

impl BackOffPolicy {
    /// Never back off.
    pub const NONE: Self = Self {
        exceptions: false,
        unsuccessful_responses: false,
    };
    /// Back off on transport failures.
    pub const EXCEPTIONS: Self = Self {
        exceptions: true,
        unsuccessful_responses: false,
    };
    /// Back off on unsuccessful responses accepted by the handler's
    /// predicate, 503 by default.
    pub const UNSUCCESSFUL_RESPONSE_503: Self = Self {
        exceptions: false,
        unsuccessful_responses: true,
    };
    pub const ALL: Self = Self {
        exceptions: true,
        unsuccessful_responses: true,
    };

    pub fn handles_exceptions(&self) -> bool {
        self.exceptions
    }

    pub fn handles_unsuccessful_responses(&self) -> bool {
        self.unsuccessful_responses
    }
}

impl Default for BackOffPolicy {
    fn default() -> Self {
        Self::UNSUCCESSFUL_RESPONSE_503
    }
}

impl BitOr for BackOffPolicy {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            exceptions: self.exceptions || rhs.exceptions,
            unsuccessful_responses: self.unsuccessful_responses || rhs.unsuccessful_responses,
        }
    }
}

/// Waits according to a [`BackOff`] and asks the pipeline to retry.
///
/// The handler declines when the pipeline has no tries left, when the
/// predicate rejects the failure, when the back-off is out of retries, or
/// when the computed delay is longer than `max_time_span` (16 s by
/// default). The wait ends early with [`Error::Cancelled`] if the call is
/// cancelled.
#[derive(Clone)]
pub struct BackOffHandler {
    back_off: Arc<dyn BackOff>,
    max_time_span: Duration,
    predicate: Arc<dyn RetryPredicate>,
}

impl BackOffHandler {
    pub fn new(back_off: Arc<dyn BackOff>) -> Self {
        Self {
            back_off,
            max_time_span: Duration::from_secs(16),
            predicate: Arc::new(DefaultRetryPredicate),
        }
    }

    /// Sets the longest single delay the handler is willing to wait.
    pub fn with_max_time_span(mut self, max_time_span: Duration) -> Self {
        self.max_time_span = max_time_span;
        self
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn back_off(&self) -> &Arc<dyn BackOff> {
        &self.back_off
    }

    pub fn max_time_span(&self) -> Duration {
        self.max_time_span
    }

    async fn handle(
        &self,
        failure: Failure<'_>,
        supports_retry: bool,
        current_failed_try: u32,
        cancellation: &CancellationToken,
    ) -> Result<bool> {
        if !supports_retry || !self.predicate.should_retry(failure, current_failed_try) {
            return Ok(false);
        }
        if self.back_off.max_num_of_retries() < current_failed_try {
            return Ok(false);
        }
        let Some(delay) = self.back_off.next_back_off(current_failed_try) else {
            return Ok(false);
        };
        if delay > self.max_time_span {
            tracing::debug!(
                delay_ms = delay.as_millis() as u64,
                max_ms = self.max_time_span.as_millis() as u64,
                "Back-off delay exceeds the maximum time span, not retrying"
            );
            return Ok(false);
        }

        tracing::debug!(
            delay_ms = delay.as_millis() as u64,
            attempt = current_failed_try,
            "Backing off before retry"
        );
        tokio::select! {
            _ = cancellation.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(true),
        }
    }
}

impl Default for BackOffHandler {
    fn default() -> Self {
        Self::new(Arc::new(ExponentialBackOff::new()))
    }
}

#[async_trait]
impl UnsuccessfulResponseHandler for BackOffHandler {
    async fn handle_response(&self, args: &HandleResponseArgs<'_>) -> Result<bool> {
        self.handle(
            Failure::Response(args.response),
            args.supports_retry(),
            args.current_failed_try,
            args.cancellation,
        )
        .await
    }
}

#[async_trait]
impl ExceptionHandler for BackOffHandler {
    async fn handle_exception(&self, args: &HandleExceptionArgs<'_>) -> Result<bool> {
        self.handle(
            Failure::Error(args.error),
            args.supports_retry(),
            args.current_failed_try,
            args.cancellation,
        )
        .await
    }
}
