//! The target database service and its operations.
//!
//! | Operation | HTTP | Path |
//! |---|---|---|
//! | [`list`](TargetListResource::list) | GET | `/targets` |
//! | [`get`](TargetListResource::get) | GET | `/targets/{targetId}` |
//! | [`insert`](TargetListResource::insert) | POST | `/targets` |
//! | [`update`](TargetListResource::update) | PUT | `/targets/{targetId}` |
//! | [`delete`](TargetListResource::delete) | DELETE | `/targets/{targetId}` |
//! | [`check_similar`](TargetListResource::check_similar) | GET | `/duplicates/{targetId}` |
//! | [`target_summary`](TargetListResource::target_summary) | GET | `/summary/{targetId}` |
//! | [`database_summary`](TargetListResource::database_summary) | GET | `/summary` |

use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::backoff::{BackOffHandler, BackOffPolicy};
use crate::credential::{AccessKeys, Credential};
use crate::parameter::Parameter;
use crate::request::ServiceRequest;
use crate::serializer::Serializer;
use crate::service::{ClientService, ClientServiceBuilder};
use crate::transport::Transport;
use crate::types::{
    CheckSimilarResponse, DatabaseSummaryResponse, DeleteTargetResponse, GetTargetResponse,
    InsertTargetResponse, ListTargetsResponse, TargetRequest, TargetSummaryResponse,
    UpdateTargetResponse,
};
use crate::Result;

/// Production endpoint of the target database API.
pub const DEFAULT_BASE_URL: &str = "https://vws.vuforia.com/";

/// Service name reported in errors.
pub const SERVICE_NAME: &str = "target";

const TARGET_ID: &str = "targetId";

/// Client for the target database API.
///
/// # Examples
///
/// ```no_run
/// use vws_client::types::TargetRequest;
/// use vws_client::{AccessKeys, TargetService};
///
/// # async fn example() -> Result<(), vws_client::Error> {
/// let service = TargetService::builder()
///     .application_name("inventory-sync")
///     .build()?;
/// let keys = AccessKeys::new("server-access-key", "server-secret-key");
///
/// let inserted = service
///     .target_list()
///     .insert(&keys, &TargetRequest {
///         name: "tower".to_string(),
///         width: 32.0,
///         image: "iVBORw0KGgo...".to_string(),
///         active_flag: Some(true),
///         application_metadata: None,
///     })
///     .execute()
///     .await?;
/// println!("Created {}", inserted.target_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TargetService {
    service: ClientService,
}

impl TargetService {
    /// A builder preset with the production base URL and service name.
    pub fn builder() -> TargetServiceBuilder {
        TargetServiceBuilder::new()
    }

    /// Wraps an already configured client service.
    pub fn from_service(service: ClientService) -> Self {
        Self { service }
    }

    /// The underlying client service.
    pub fn service(&self) -> &ClientService {
        &self.service
    }

    /// The target operations.
    pub fn target_list(&self) -> TargetListResource {
        TargetListResource::new(self.service.clone())
    }
}

/// Builder for a [`TargetService`]. See [`ClientServiceBuilder`] for the
/// meaning and defaults of each setting.
pub struct TargetServiceBuilder {
    inner: ClientServiceBuilder,
}

macro_rules! forward {
    ($($(#[$doc:meta])* $name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            $(#[$doc])*
            pub fn $name(self, $($arg: $ty),*) -> Self {
                Self { inner: self.inner.$name($($arg),*) }
            }
        )*
    };
}

impl TargetServiceBuilder {
    pub fn new() -> Self {
        Self {
            inner: ClientServiceBuilder::new().service_name(SERVICE_NAME),
        }
    }

    /// Points the service at another endpoint, e.g. a local mock.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(self, url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            inner: self.inner.base_url(url)?,
        })
    }

    /// Sets the application name sent in the `User-Agent` header.
    pub fn application_name(self, name: impl Into<String>) -> Self {
        Self {
            inner: self.inner.application_name(name),
        }
    }

    forward! {
        timeout(timeout: Duration);
        max_tries(max_tries: u32);
        max_redirects(max_redirects: u32);
        follow_redirects(follow: bool);
        back_off_policy(policy: BackOffPolicy);
        back_off_handler(handler: BackOffHandler);
        credential(credential: Arc<Credential>);
        without_credential();
        serializer(serializer: Arc<dyn Serializer>);
        transport(transport: Arc<dyn Transport>);
        max_url_length(max_url_length: usize);
    }

    /// # Errors
    ///
    /// See [`ClientServiceBuilder::build`].
    pub fn build(self) -> Result<TargetService> {
        let inner = if self.inner.has_base_url() {
            self.inner
        } else {
            self.inner.base_url(DEFAULT_BASE_URL)?
        };
        Ok(TargetService {
            service: inner.build()?,
        })
    }
}

impl Default for TargetServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The operations on the targets of one database.
///
/// Each method returns a [`ServiceRequest`] that is executed with
/// [`execute`](ServiceRequest::execute) or one of its variants.
#[derive(Debug, Clone)]
pub struct TargetListResource {
    service: ClientService,
}

impl TargetListResource {
    pub fn new(service: ClientService) -> Self {
        Self { service }
    }

    fn request<T>(
        &self,
        keys: &AccessKeys,
        method_name: &str,
        method: Method,
        rest_path: &str,
    ) -> ServiceRequest<T> {
        ServiceRequest::new(
            self.service.clone(),
            keys.clone(),
            method_name,
            method,
            rest_path,
        )
    }

    fn target_request<T>(
        &self,
        keys: &AccessKeys,
        method_name: &str,
        method: Method,
        rest_path: &str,
        target_id: impl Into<String>,
    ) -> ServiceRequest<T> {
        self.request(keys, method_name, method, rest_path)
            .with_parameter(Parameter::path(TARGET_ID).required())
            .set(TARGET_ID, target_id.into())
    }

    /// Lists the identifiers of every target in the database.
    pub fn list(&self, keys: &AccessKeys) -> ServiceRequest<ListTargetsResponse> {
        self.request(keys, "list", Method::GET, "/targets")
    }

    /// Retrieves one target record.
    pub fn get(
        &self,
        keys: &AccessKeys,
        target_id: impl Into<String>,
    ) -> ServiceRequest<GetTargetResponse> {
        self.target_request(keys, "get", Method::GET, "/targets/{targetId}", target_id)
    }

    /// Adds a target.
    pub fn insert(
        &self,
        keys: &AccessKeys,
        target: &TargetRequest,
    ) -> ServiceRequest<InsertTargetResponse> {
        self.request(keys, "insert", Method::POST, "/targets")
            .with_body(target)
    }

    /// Replaces the fields of an existing target.
    pub fn update(
        &self,
        keys: &AccessKeys,
        target_id: impl Into<String>,
        target: &TargetRequest,
    ) -> ServiceRequest<UpdateTargetResponse> {
        self.target_request(keys, "update", Method::PUT, "/targets/{targetId}", target_id)
            .with_body(target)
    }

    /// Deletes a target. The service refuses while the target is processing.
    pub fn delete(
        &self,
        keys: &AccessKeys,
        target_id: impl Into<String>,
    ) -> ServiceRequest<DeleteTargetResponse> {
        self.target_request(keys, "delete", Method::DELETE, "/targets/{targetId}", target_id)
    }

    /// Lists targets whose images are similar or identical to this one.
    pub fn check_similar(
        &self,
        keys: &AccessKeys,
        target_id: impl Into<String>,
    ) -> ServiceRequest<CheckSimilarResponse> {
        self.target_request(
            keys,
            "checkSimilar",
            Method::GET,
            "/duplicates/{targetId}",
            target_id,
        )
    }

    /// Retrieves the summary report of one target.
    pub fn target_summary(
        &self,
        keys: &AccessKeys,
        target_id: impl Into<String>,
    ) -> ServiceRequest<TargetSummaryResponse> {
        self.target_request(
            keys,
            "targetSummary",
            Method::GET,
            "/summary/{targetId}",
            target_id,
        )
    }

    /// Retrieves the summary report of the whole database.
    pub fn database_summary(&self, keys: &AccessKeys) -> ServiceRequest<DatabaseSummaryResponse> {
        self.request(keys, "databaseSummary", Method::GET, "/summary")
    }
}
