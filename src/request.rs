//! Typed service requests.
//!
//! A [`ServiceRequest`] describes one API operation: its HTTP method, REST
//! path template, declared parameters, supplied values and optional body.
//! Executing it builds the URI, sends the request through the service
//! pipeline and turns the final response into either `T` or an [`Error`].
//!
//! Every execution variant shares the same construction and error mapping;
//! they differ only in what is done with a successful body.

use std::fmt;
use std::marker::PhantomData;
use std::time::Instant;

use http::{header, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::credential::AccessKeys;
use crate::parameter::{Parameter, ParameterCollection, ParameterKind, ParameterValue};
use crate::request_builder::RequestBuilder;
use crate::service::ClientService;
use crate::transport::{set_header, BodyStream, HttpRequest, HttpResponse};
use crate::{Error, Response, Result};

/// One typed API operation, ready to execute.
///
/// Requests are usually obtained from a resource such as
/// [`TargetListResource`](crate::TargetListResource), but any operation can be
/// described directly:
///
/// ```no_run
/// use http::Method;
/// use vws_client::parameter::Parameter;
/// use vws_client::types::TargetSummaryResponse;
/// use vws_client::{AccessKeys, ServiceRequest, TargetService};
///
/// # async fn example() -> Result<(), vws_client::Error> {
/// let service = TargetService::builder().build()?;
/// let keys = AccessKeys::new("access", "secret");
///
/// let summary = ServiceRequest::<TargetSummaryResponse>::new(
///     service.service().clone(),
///     keys,
///     "summary",
///     Method::GET,
///     "/summary/{targetId}",
/// )
/// .with_parameter(Parameter::path("targetId").required())
/// .set("targetId", "0b4a8b7c")
/// .execute()
/// .await?;
/// println!("{} recognitions", summary.total_recos);
/// # Ok(())
/// # }
/// ```
pub struct ServiceRequest<T> {
    service: ClientService,
    keys: AccessKeys,
    method_name: String,
    http_method: Method,
    rest_path: String,
    parameters: Vec<Parameter>,
    values: ParameterCollection,
    body: Option<std::result::Result<Value, String>>,
    _response: PhantomData<fn() -> T>,
}

impl<T> ServiceRequest<T> {
    pub fn new(
        service: ClientService,
        keys: AccessKeys,
        method_name: impl Into<String>,
        http_method: Method,
        rest_path: impl Into<String>,
    ) -> Self {
        Self {
            service,
            keys,
            method_name: method_name.into(),
            http_method,
            rest_path: rest_path.into(),
            parameters: Vec::new(),
            values: ParameterCollection::new(),
            body: None,
            _response: PhantomData,
        }
    }

    /// Declares a parameter the operation accepts.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Supplies a value for a declared parameter.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        let name = name.into();
        match value.into() {
            ParameterValue::Single(value) => self.values.add(name, value),
            ParameterValue::Multiple(values) => {
                for value in values {
                    self.values.add(name.clone(), value);
                }
            }
        }
        self
    }

    /// Supplies several values at once, e.g. parsed from a query string.
    pub fn with_values(mut self, values: &ParameterCollection) -> Self {
        for (name, value) in values {
            self.values.add(name.clone(), value.clone());
        }
        self
    }

    /// Sets the request body. A serialization failure is reported when the
    /// request is executed, before any I/O.
    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.body = Some(serde_json::to_value(body).map_err(|e| e.to_string()));
        self
    }

    /// Sets a body that is sent verbatim.
    pub fn with_raw_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Ok(Value::String(body.into())));
        self
    }

    pub fn service(&self) -> &ClientService {
        &self.service
    }

    /// Name of the operation, e.g. `get`.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    pub fn rest_path(&self) -> &str {
        &self.rest_path
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn values(&self) -> &ParameterCollection {
        &self.values
    }

    /// Builds the outgoing request without sending it.
    ///
    /// # Errors
    ///
    /// Fails on unknown, invalid or missing parameters, a malformed path
    /// template or a body that cannot be serialized.
    pub fn create_request(&self) -> Result<HttpRequest> {
        let mut builder = RequestBuilder::new(
            self.service.base_url().clone(),
            self.rest_path.clone(),
            self.http_method.clone(),
        )?;
        self.add_parameters(&mut builder)?;

        let mut request = HttpRequest::new(self.http_method.clone(), builder.build_uri()?);
        set_header(
            &mut request.headers,
            header::CONTENT_TYPE,
            &format!("application/{}", self.service.serializer().format()),
        );
        if let Some(body) = &self.body {
            let body = body.as_ref().map_err(|e| Error::SerializationFailed(e.clone()))?;
            request.body = Some(self.service.serialize(body)?);
        }
        request.extensions.insert(self.keys.clone());
        Ok(request)
    }

    fn add_parameters(&self, builder: &mut RequestBuilder) -> Result<()> {
        for (name, value) in &self.values {
            let parameter = self
                .parameters
                .iter()
                .find(|p| p.name() == name.as_str())
                .ok_or_else(|| Error::UnknownParameter {
                    service: self.service.name().to_string(),
                    name: name.clone(),
                })?;

            if !parameter.validate(value) {
                return Err(Error::ParameterValidation {
                    service: self.service.name().to_string(),
                    name: name.clone(),
                });
            }

            let value = if value.is_empty() {
                parameter.default_value().unwrap_or_default()
            } else {
                value.as_str()
            };

            match parameter.kind() {
                ParameterKind::Path => builder.add_parameter(ParameterKind::Path, name, value),
                ParameterKind::Query => {
                    if parameter.is_required() || parameter.default_value() != Some(value) {
                        builder.add_parameter(ParameterKind::Query, name, value);
                    }
                }
            }
        }

        if let Some(missing) = self
            .parameters
            .iter()
            .find(|p| p.is_required() && !self.values.contains_key(p.name()))
        {
            return Err(Error::MissingParameter {
                path: self.rest_path.clone(),
                name: missing.name().to_string(),
            });
        }
        Ok(())
    }

    /// Sends the request and returns the final response, mapping a non-2xx
    /// status to [`Error::ServiceApi`].
    async fn execute_unparsed(&self, cancellation: &CancellationToken) -> Result<HttpResponse> {
        let request = self.create_request()?;
        tracing::debug!(
            service = %self.service.name(),
            method = %self.method_name,
            url = %request.url,
            "Executing service request"
        );

        let response = self.service.send(request, cancellation).await?;
        if response.status.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let text = read_text(response, cancellation).await?;
        let error = self.service.deserialize_error(&text)?;
        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                result_code = %error.result_code,
                transaction_id = %error.transaction_id,
                "Client error (4xx)"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                result_code = %error.result_code,
                transaction_id = %error.transaction_id,
                "Service error"
            );
        }
        Err(Error::ServiceApi {
            service: self.service.name().to_string(),
            status,
            error,
        })
    }

    /// Executes the request and returns the body of a successful response as
    /// a stream, without parsing it.
    pub async fn execute_as_stream(&self) -> Result<BodyStream> {
        self.execute_as_stream_with_cancellation(&CancellationToken::new())
            .await
    }

    pub async fn execute_as_stream_with_cancellation(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<BodyStream> {
        Ok(self.execute_unparsed(cancellation).await?.into_body_stream())
    }

    /// Executes the request and returns the body of a successful response as
    /// text, without parsing it.
    pub async fn execute_raw(&self) -> Result<String> {
        self.execute_raw_with_cancellation(&CancellationToken::new())
            .await
    }

    pub async fn execute_raw_with_cancellation(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let response = self.execute_unparsed(cancellation).await?;
        read_text(response, cancellation).await
    }
}

impl<T: DeserializeOwned> ServiceRequest<T> {
    /// Executes the request and parses the successful response.
    ///
    /// # Errors
    ///
    /// Local input errors are returned before any I/O. A final non-2xx
    /// response becomes [`Error::ServiceApi`], an unparseable body
    /// [`Error::ResponseParse`].
    pub async fn execute(&self) -> Result<T> {
        self.execute_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), ending with [`Error::Cancelled`] once
    /// `cancellation` fires.
    pub async fn execute_with_cancellation(&self, cancellation: &CancellationToken) -> Result<T> {
        Ok(self.send_with_cancellation(cancellation).await?.data)
    }

    /// Executes the request and returns the parsed body with the response
    /// metadata.
    pub async fn send(&self) -> Result<Response<T>> {
        self.send_with_cancellation(&CancellationToken::new()).await
    }

    pub async fn send_with_cancellation(
        &self,
        cancellation: &CancellationToken,
    ) -> Result<Response<T>> {
        let start_time = Instant::now();
        let response = self.execute_unparsed(cancellation).await?;

        let status = response.status;
        let headers = response.headers.clone();
        let attempts = response.attempts;
        let raw_body = read_text(response, cancellation).await?;
        let data = self.service.deserialize_response(&raw_body)?;
        let latency = start_time.elapsed();

        tracing::info!(
            service = %self.service.name(),
            method = %self.method_name,
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            attempts = attempts,
            "Received service response"
        );

        Ok(Response::new(data, raw_body, status, headers, latency, attempts))
    }

    /// Executes the request on the calling thread, blocking until it
    /// completes.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), plus [`Error::ConfigurationError`]
    /// when called from inside an async runtime.
    pub fn execute_blocking(&self) -> Result<T> {
        self.service.block_on(self.execute())?
    }
}

impl<T> fmt::Debug for ServiceRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRequest")
            .field("service", &self.service.name())
            .field("method_name", &self.method_name)
            .field("http_method", &self.http_method)
            .field("rest_path", &self.rest_path)
            .field("values", &self.values)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

/// Reads the whole body as text, ending with [`Error::Cancelled`] if
/// `cancellation` fires first.
async fn read_text(response: HttpResponse, cancellation: &CancellationToken) -> Result<String> {
    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(Error::Cancelled),
        text = response.text() => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BaseResponse, TargetRequest};

    fn service() -> ClientService {
        ClientService::builder()
            .base_url("https://vws.example.com/")
            .unwrap()
            .service_name("target")
            .application_name("tests")
            .build()
            .unwrap()
    }

    fn request(method: Method, path: &str) -> ServiceRequest<BaseResponse> {
        ServiceRequest::new(service(), AccessKeys::new("a", "s"), "op", method, path)
    }

    #[test]
    fn test_create_request_builds_uri_headers_and_keys() {
        let req = request(Method::GET, "/targets/{targetId}")
            .with_parameter(Parameter::path("targetId").required())
            .set("targetId", "abc");
        let http = req.create_request().unwrap();

        assert_eq!(http.url.as_str(), "https://vws.example.com/targets/abc");
        assert_eq!(http.header("content-type"), Some("application/json"));
        assert!(http.body.is_none());
        assert_eq!(
            http.extensions.get::<AccessKeys>().map(|k| k.access_key.as_str()),
            Some("a")
        );
    }

    #[test]
    fn test_body_is_serialized() {
        let target = TargetRequest {
            name: "tower".to_string(),
            width: 2.0,
            image: "aW1n".to_string(),
            active_flag: None,
            application_metadata: None,
        };
        let http = request(Method::POST, "/targets")
            .with_body(&target)
            .create_request()
            .unwrap();

        let body: Value = serde_json::from_str(http.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["name"], "tower");
        assert!(body.get("active_flag").is_none());
    }

    #[test]
    fn test_missing_required_parameter() {
        let req = request(Method::DELETE, "/targets/{targetId}")
            .with_parameter(Parameter::path("targetId").required());
        match req.create_request() {
            Err(Error::MissingParameter { name, .. }) => assert_eq!(name, "targetId"),
            other => panic!("Expected MissingParameter, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_invalid_parameters() {
        let unknown = request(Method::GET, "/targets").set("bogus", "1");
        assert!(matches!(
            unknown.create_request(),
            Err(Error::UnknownParameter { ref name, .. }) if name == "bogus"
        ));

        let invalid = request(Method::GET, "/targets/{targetId}")
            .with_parameter(Parameter::path("targetId").required())
            .set("targetId", "");
        assert!(matches!(
            invalid.create_request(),
            Err(Error::ParameterValidation { .. })
        ));
    }

    #[test]
    fn test_pattern_mismatch_fails_validation() {
        let numeric = || Parameter::query("x").with_pattern(r"^\d+$").unwrap();

        let rejected = request(Method::GET, "/targets")
            .with_parameter(numeric())
            .set("x", "abc");
        assert!(matches!(
            rejected.create_request(),
            Err(Error::ParameterValidation { ref name, .. }) if name == "x"
        ));

        let accepted = request(Method::GET, "/targets")
            .with_parameter(numeric())
            .set("x", "42");
        assert_eq!(accepted.create_request().unwrap().url.query(), Some("x=42"));
    }

    #[test]
    fn test_query_defaults_are_omitted() {
        let req = request(Method::GET, "/targets")
            .with_parameter(Parameter::query("page").with_default("1"))
            .with_parameter(Parameter::query("size").with_default("10"));

        let same = req.create_request().unwrap();
        assert_eq!(same.url.query(), None);

        let req = req.set("page", "1").set("size", "50");
        assert_eq!(req.create_request().unwrap().url.query(), Some("size=50"));
    }

    #[test]
    fn test_empty_value_takes_default() {
        let req = request(Method::GET, "/summary/{id}")
            .with_parameter(Parameter::path("id").with_default("all"))
            .set("id", "");
        assert_eq!(req.create_request().unwrap().url.path(), "/summary/all");
    }
}
