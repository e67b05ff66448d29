//! Request signing for the target database API.
//!
//! Every request carries `Authorization: VWS <access key>:<signature>` where
//! the signature is the base64 encoded HMAC-SHA1, keyed by the secret key, of
//! the newline-joined signing string
//!
//! ```text
//! <method>\n<hex md5 of body>\n<content type>\n<date>\n<path>
//! ```
//!
//! The [`Credential`] computes it as an execute-interceptor, so retried and
//! redirected attempts are re-signed with their own `Date` header.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::{header, Method};
use md5::{Digest, Md5};
use sha1::Sha1;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{ExecuteInterceptor, HandleResponseArgs, UnsuccessfulResponseHandler};
use crate::transport::{set_header, HttpRequest};
use crate::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// Authorization scheme of the target database API.
pub const AUTHORIZATION_SCHEME: &str = "VWS";

/// The key pair identifying one target database.
///
/// The secret key is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_key: String,
}

impl AccessKeys {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Builds the string that is HMAC-signed for a request.
///
/// ```
/// use http::Method;
/// use vws_client::credential::signing_string;
///
/// let s = signing_string(&Method::GET, None, "application/json", "Sun, 22 Apr 2012 08:49:37 GMT", "/targets");
/// assert_eq!(
///     s,
///     "GET\nd41d8cd98f00b204e9800998ecf8427e\napplication/json\nSun, 22 Apr 2012 08:49:37 GMT\n/targets"
/// );
/// ```
pub fn signing_string(
    method: &Method,
    body: Option<&str>,
    content_type: &str,
    date: &str,
    path: &str,
) -> String {
    let body_md5 = format!("{:x}", Md5::digest(body.unwrap_or_default().as_bytes()));
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method.as_str(),
        body_md5,
        content_type,
        date,
        path
    )
}

/// Computes the `<access key>:<signature>` token for a signing string.
///
/// # Errors
///
/// Returns [`Error::ConfigurationError`] if the secret key cannot key the MAC.
pub fn access_token(keys: &AccessKeys, signing_string: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(keys.secret_key.as_bytes())
        .map_err(|e| Error::ConfigurationError(format!("Invalid secret key: {}", e)))?;
    mac.update(signing_string.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("{}:{}", keys.access_key, signature))
}

/// Signs outgoing requests with the [`AccessKeys`] found in their extensions.
///
/// The most recently issued token is kept for inspection; it is never reused
/// for another request.
#[derive(Debug, Default)]
pub struct Credential {
    last_token: Mutex<Option<String>>,
}

impl Credential {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token computed for the latest signed attempt.
    pub fn last_token(&self) -> Option<String> {
        self.last_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Computes the token for `request` as it stands.
    ///
    /// The `Date` and `Content-Type` headers of the request are used when
    /// present; a missing date is replaced by the current time and a missing
    /// content type by the empty string.
    pub fn token_for(&self, keys: &AccessKeys, request: &HttpRequest) -> Result<String> {
        let date = request
            .header(header::DATE.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| httpdate::fmt_http_date(SystemTime::now()));
        let content_type = request
            .header(header::CONTENT_TYPE.as_str())
            .unwrap_or_default();

        let to_sign = signing_string(
            &request.method,
            request.body.as_deref(),
            content_type,
            &date,
            request.url.path(),
        );
        let token = access_token(keys, &to_sign)?;

        *self.last_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl ExecuteInterceptor for Credential {
    async fn intercept(&self, request: &mut HttpRequest, _: &CancellationToken) -> Result<()> {
        let Some(keys) = request.extensions.get::<AccessKeys>().cloned() else {
            tracing::warn!(url = %request.url, "No access keys on request, sending it unsigned");
            return Ok(());
        };
        let token = self.token_for(&keys, request)?;
        set_header(
            &mut request.headers,
            header::AUTHORIZATION,
            &format!("{} {}", AUTHORIZATION_SCHEME, token),
        );
        Ok(())
    }
}

/// Authentication failures are never retried or re-signed.
#[async_trait]
impl UnsuccessfulResponseHandler for Credential {
    async fn handle_response(&self, _: &HandleResponseArgs<'_>) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use url::Url;

    const DATE: &str = "Sun, 22 Apr 2012 08:49:37 GMT";

    fn request_with(body: Option<&str>, date: &str) -> HttpRequest {
        let mut request = HttpRequest::new(
            Method::POST,
            Url::parse("https://vws.example.com/targets?x=1").unwrap(),
        );
        request.body = body.map(str::to_string);
        request
            .headers
            .insert(header::DATE, HeaderValue::from_str(date).unwrap());
        request.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        request
    }

    #[test]
    fn test_signing_string_uses_path_without_query() {
        let credential = Credential::new();
        let keys = AccessKeys::new("access", "secret");
        let request = request_with(Some("{\"name\":\"a\"}"), DATE);

        let token = credential.token_for(&keys, &request).unwrap();
        let expected = access_token(
            &keys,
            &signing_string(
                &Method::POST,
                Some("{\"name\":\"a\"}"),
                "application/json",
                DATE,
                "/targets",
            ),
        )
        .unwrap();

        assert_eq!(token, expected);
        assert!(token.starts_with("access:"));
        assert_eq!(credential.last_token(), Some(token));
    }

    #[test]
    fn test_signature_is_deterministic_for_identical_input() {
        let keys = AccessKeys::new("access", "secret");
        let a = access_token(&keys, "GET\n\n\nDATE\n/targets").unwrap();
        let b = access_token(&keys, "GET\n\n\nDATE\n/targets").unwrap();
        let other = access_token(&keys, "GET\n\n\nOTHER\n/targets").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, other);
        // base64 of a 20-byte SHA1 MAC
        assert_eq!(a.len(), "access:".len() + 28);
    }

    #[test]
    fn test_different_dates_produce_different_tokens() {
        let credential = Credential::new();
        let keys = AccessKeys::new("access", "secret");

        let first = credential
            .token_for(&keys, &request_with(None, DATE))
            .unwrap();
        let second = credential
            .token_for(&keys, &request_with(None, "Sun, 22 Apr 2012 08:49:38 GMT"))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(credential.last_token(), Some(second));
    }

    #[tokio::test]
    async fn test_interceptor_sets_authorization_header() {
        let credential = Credential::new();
        let mut request = request_with(None, DATE);
        request.extensions.insert(AccessKeys::new("access", "secret"));

        credential
            .intercept(&mut request, &CancellationToken::new())
            .await
            .unwrap();

        let header = request.header("authorization").unwrap();
        assert!(header.starts_with("VWS access:"));
        assert_eq!(&header[4..], credential.last_token().unwrap());
    }

    #[tokio::test]
    async fn test_interceptor_without_keys_leaves_request_unsigned() {
        let credential = Credential::new();
        let mut request = request_with(None, DATE);

        credential
            .intercept(&mut request, &CancellationToken::new())
            .await
            .unwrap();

        assert!(request.header("authorization").is_none());
        assert!(credential.last_token().is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keys = AccessKeys::new("access", "very-secret");
        let printed = format!("{:?}", keys);
        assert!(printed.contains("access"));
        assert!(!printed.contains("very-secret"));
    }
}
