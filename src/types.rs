//! Wire types of the target database API.
//!
//! Every response shares the [`BaseResponse`] fields (`result_code`,
//! `transaction_id`); typed responses embed it with `#[serde(flatten)]` and
//! expose it through [`ServiceResponse`].

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Outcome reported by the service in every response body.
///
/// Wire values are the variant names (`"Success"`, `"UnknownTarget"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    /// Transaction succeeded.
    Success,
    /// Target created (target POST response).
    TargetCreated,
    /// Signature authentication failed.
    AuthenticationFailure,
    /// Request timestamp outside allowed range.
    RequestTimeTooSkewed,
    /// The corresponding target name already exists.
    TargetNameExist,
    /// The maximum number of API calls for this database has been reached.
    RequestQuotaReached,
    /// The target is in the processing state and cannot be updated.
    TargetStatusProcessing,
    /// The target is not in the success state.
    TargetStatusNotSuccess,
    /// The maximum number of targets for this database has been reached.
    TargetQuotaReached,
    /// The database has been suspended.
    ProjectSuspended,
    /// The database is inactive.
    ProjectInactive,
    /// The database is not allowed to make API requests.
    ProjectHasNoApiAccess,
    /// The specified target ID does not exist.
    UnknownTarget,
    /// Image corrupted or format not supported.
    BadImage,
    /// Image size exceeds maximum limit.
    ImageTooLarge,
    /// Target metadata size exceeds maximum limit.
    MetadataTooLarge,
    /// Start date is after the end date.
    DateRangeError,
    /// The request was invalid, or the server failed internally.
    Fail,
}

impl ResultCode {
    /// Human-readable description of the outcome.
    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Success => "Transaction succeeded",
            ResultCode::TargetCreated => "Target created (target POST response)",
            ResultCode::AuthenticationFailure => "Signature authentication failed",
            ResultCode::RequestTimeTooSkewed => "Request timestamp outside allowed range",
            ResultCode::TargetNameExist => {
                "The corresponding target name already exists (target POST/PUT response)"
            }
            ResultCode::RequestQuotaReached => {
                "The maximum number of API calls for this database has been reached."
            }
            ResultCode::TargetStatusProcessing => {
                "The target is in the processing state and cannot be updated."
            }
            ResultCode::TargetStatusNotSuccess => {
                "The request could not be completed because the target is not in the success state."
            }
            ResultCode::TargetQuotaReached => {
                "The maximum number of targets for this database has been reached."
            }
            ResultCode::ProjectSuspended => {
                "The request could not be completed because this database has been suspended."
            }
            ResultCode::ProjectInactive => {
                "The request could not be completed because this database is inactive."
            }
            ResultCode::ProjectHasNoApiAccess => {
                "The request could not be completed because this database is not allowed to make API requests."
            }
            ResultCode::UnknownTarget => {
                "The specified target ID does not exist (target PUT/GET/DELETE response)"
            }
            ResultCode::BadImage => {
                "Image corrupted or format not supported (target POST/PUT response)"
            }
            ResultCode::ImageTooLarge => "Image size exceeds maximum limit (target POST/PUT response)",
            ResultCode::MetadataTooLarge => {
                "Target metadata size exceeds maximum limit (target POST/PUT response)"
            }
            ResultCode::DateRangeError => "Start date is after the end date",
            ResultCode::Fail => {
                "The request was invalid and could not be processed, or the server encountered an internal error"
            }
        }
    }

    /// The HTTP status codes this outcome is delivered with.
    pub fn http_statuses(&self) -> &'static [StatusCode] {
        match self {
            ResultCode::Success => &[StatusCode::OK],
            ResultCode::TargetCreated => &[StatusCode::CREATED],
            ResultCode::AuthenticationFailure => &[StatusCode::UNAUTHORIZED],
            ResultCode::RequestTimeTooSkewed
            | ResultCode::TargetNameExist
            | ResultCode::RequestQuotaReached
            | ResultCode::TargetStatusProcessing
            | ResultCode::TargetStatusNotSuccess
            | ResultCode::TargetQuotaReached
            | ResultCode::ProjectSuspended
            | ResultCode::ProjectInactive
            | ResultCode::ProjectHasNoApiAccess => &[StatusCode::FORBIDDEN],
            ResultCode::UnknownTarget => &[StatusCode::NOT_FOUND],
            ResultCode::BadImage
            | ResultCode::ImageTooLarge
            | ResultCode::MetadataTooLarge
            | ResultCode::DateRangeError => &[StatusCode::UNPROCESSABLE_ENTITY],
            ResultCode::Fail => &[
                StatusCode::UNPROCESSABLE_ENTITY,
                StatusCode::INTERNAL_SERVER_ERROR,
            ],
        }
    }

    /// Returns `true` if `status` is one the service pairs with this outcome.
    pub fn is_consistent_with(&self, status: StatusCode) -> bool {
        self.http_statuses().contains(&status)
    }

    /// Returns `true` for the two success outcomes.
    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::TargetCreated)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Fields shared by every response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseResponse {
    /// The outcome of the call.
    pub result_code: ResultCode,
    /// Service-side identifier of the transaction.
    pub transaction_id: String,
}

/// Body of a non-2xx response.
pub type ErrorResponse = BaseResponse;

/// Access to the shared response fields of a typed response.
pub trait ServiceResponse {
    /// The shared response fields.
    fn base(&self) -> &BaseResponse;

    /// The outcome of the call.
    fn result_code(&self) -> ResultCode {
        self.base().result_code
    }

    /// Service-side identifier of the transaction.
    fn transaction_id(&self) -> &str {
        &self.base().transaction_id
    }
}

impl ServiceResponse for BaseResponse {
    fn base(&self) -> &BaseResponse {
        self
    }
}

macro_rules! service_response {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ServiceResponse for $ty {
                fn base(&self) -> &BaseResponse {
                    &self.base
                }
            }
        )*
    };
}

/// Processing state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    /// The image is still being processed.
    #[serde(alias = "Processing")]
    Processing,
    /// The target is ready for recognition.
    #[serde(alias = "Success")]
    Success,
    /// Processing failed.
    #[serde(alias = "Failed", alias = "failure", alias = "Failure")]
    Failed,
}

/// A target as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Identifier of the target.
    pub target_id: String,
    /// Whether the target is active for recognition.
    #[serde(default)]
    pub active_flag: bool,
    /// Target name.
    pub name: String,
    /// Width of the target in scene units.
    pub width: f64,
    /// Tracking quality rating (0-5, -1 while processing).
    #[serde(default)]
    pub tracking_rating: i32,
    /// Recognition rating, may be empty.
    #[serde(default)]
    pub reco_rating: String,
}

/// Body of an insert or update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRequest {
    /// Target name.
    pub name: String,
    /// Width of the target in scene units.
    pub width: f64,
    /// Base64 encoded image (JPG or PNG).
    pub image: String,
    /// Whether the target is active for recognition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_flag: Option<bool>,
    /// Base64 encoded application metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_metadata: Option<String>,
}

/// Response of the list operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTargetsResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    /// Identifiers of every target in the database.
    #[serde(default)]
    pub results: Vec<String>,
}

/// Response of the get operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetTargetResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    pub status: TargetStatus,
    pub target_record: TargetRecord,
}

/// Response of the insert operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertTargetResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    /// Identifier assigned to the new target.
    pub target_id: String,
}

/// Response of the update operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTargetResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
}

/// Response of the delete operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTargetResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
}

/// Response of the duplicate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSimilarResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    /// Identifiers of targets similar to the queried one.
    #[serde(default)]
    pub similar_targets: Vec<String>,
}

/// Recognition statistics of a single target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSummaryResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub upload_date: String,
    #[serde(default)]
    pub active_flag: bool,
    pub status: TargetStatus,
    #[serde(default)]
    pub tracking_rating: i32,
    #[serde(default)]
    pub reco_rating: String,
    #[serde(default)]
    pub total_recos: u64,
    #[serde(default)]
    pub current_month_recos: u64,
    #[serde(default)]
    pub previous_month_recos: u64,
}

/// Image counts of the whole database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummaryResponse {
    #[serde(flatten)]
    pub base: BaseResponse,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active_images: u64,
    #[serde(default)]
    pub inactive_images: u64,
    #[serde(default)]
    pub failed_images: u64,
}

service_response!(
    ListTargetsResponse,
    GetTargetResponse,
    InsertTargetResponse,
    UpdateTargetResponse,
    DeleteTargetResponse,
    CheckSimilarResponse,
    TargetSummaryResponse,
    DatabaseSummaryResponse,
);
