//! Typed response wrapper that keeps the raw response details.
//!
//! [`Response`] carries the deserialized body of a successful call together
//! with the status, headers, raw body, latency and attempt count, for callers
//! that need more than the typed data returned by
//! [`ServiceRequest::execute`](crate::ServiceRequest::execute).

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful service response.
///
/// # Examples
///
/// ```no_run
/// use vws_client::{AccessKeys, TargetService};
///
/// # async fn example() -> Result<(), vws_client::Error> {
/// let service = TargetService::builder().application_name("inventory-sync").build()?;
/// let keys = AccessKeys::new("access", "secret");
///
/// let response = service.target_list().list(&keys).send().await?;
///
/// println!("{} targets", response.data.results.len());
/// println!("Request took {:?} over {} attempts", response.latency, response.attempts);
/// if response.was_retried() {
///     println!("Raw body: {}", response.raw_body);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the first attempt until the body was read, retries and
    /// back-off waits included.
    pub latency: Duration,

    /// The number of send attempts made, redirects included.
    pub attempts: usize,
}

impl<T> Response<T> {
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data while keeping the metadata.
    ///
    /// ```
    /// # use vws_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     vec!["a1", "b2"],
    ///     r#"{"results":["a1","b2"]}"#.to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let count = response.map(|ids| ids.len());
    /// assert_eq!(count.data, 2);
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if present and valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Unwraps the typed data.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
