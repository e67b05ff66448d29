//! # vws-client - a client for the cloud target database API
//!
//! `vws-client` manages the image targets of a cloud recognition database over
//! its REST API. Every request is signed with the database's access keys,
//! sent through a retry- and redirect-aware pipeline, and its JSON response is
//! parsed into a typed value.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vws_client::{AccessKeys, TargetService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vws_client::Error> {
//!     let service = TargetService::builder()
//!         .application_name("inventory-sync")
//!         .build()?;
//!     let keys = AccessKeys::new("server-access-key", "server-secret-key");
//!
//!     let targets = service.target_list().list(&keys).execute().await?;
//!     for id in &targets.results {
//!         let target = service.target_list().get(&keys, id).execute().await?;
//!         println!("{}: {:?}", target.target_record.name, target.status);
//!     }
//!
//!     let summary = service.target_list().database_summary(&keys).execute().await?;
//!     println!("{} active images", summary.active_images);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Signed requests** - `Authorization: VWS <access key>:<HMAC-SHA1>` computed fresh for every attempt
//! - **Retry pipeline** - configurable try and redirect budgets, pluggable interceptors and handlers
//! - **Exponential back-off** - jittered delays for 503 responses and transport failures, cancellable
//! - **URI templates** - RFC 6570 style path expansion with validated, defaulted parameters
//! - **Typed responses** - result codes and target records as Rust types, raw body kept on parse errors
//! - **Async, blocking and streaming execution** - the same request, three ways to run it
//! - **Structured logging** - per-attempt events through `tracing`
//!
//! ## Error Handling
//!
//! Input errors are reported before any network I/O; service errors carry the
//! parsed error payload:
//!
//! ```no_run
//! use vws_client::{AccessKeys, Error, TargetService};
//! use vws_client::types::ResultCode;
//!
//! # async fn example() -> Result<(), Error> {
//! # let service = TargetService::builder().build()?;
//! # let keys = AccessKeys::new("access", "secret");
//! match service.target_list().delete(&keys, "0b4a8b7c").execute().await {
//!     Ok(response) => println!("Deleted in transaction {}", response.base.transaction_id),
//!     Err(Error::ServiceApi { error, .. }) if error.result_code == ResultCode::TargetStatusProcessing => {
//!         println!("Still processing, try again later");
//!     }
//!     Err(Error::ResponseParse { raw_response, reason, .. }) => {
//!         eprintln!("Unexpected body {}: {}", raw_response, reason);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retries
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vws_client::backoff::{BackOffHandler, BackOffPolicy, ExponentialBackOff, RetryOnRetryable};
//! use vws_client::TargetService;
//!
//! # fn example() -> Result<(), vws_client::Error> {
//! let back_off = ExponentialBackOff::new()
//!     .with_delta(Duration::from_millis(100))?
//!     .with_max_num_of_retries(4)?;
//!
//! let service = TargetService::builder()
//!     .max_tries(5)
//!     .back_off_policy(BackOffPolicy::ALL)
//!     .back_off_handler(
//!         BackOffHandler::new(Arc::new(back_off))
//!             .with_max_time_span(Duration::from_secs(10))
//!             .with_predicate(Arc::new(RetryOnRetryable)),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod credential;
mod error;
pub mod parameter;
pub mod pipeline;
mod request;
pub mod request_builder;
mod response;
pub mod serializer;
mod service;
mod targets;
pub mod transport;
pub mod types;

pub use credential::{AccessKeys, Credential};
pub use error::{Error, Result};
pub use request::ServiceRequest;
pub use response::Response;
pub use service::{ClientService, ClientServiceBuilder, DEFAULT_MAX_URL_LENGTH};
pub use targets::{
    TargetListResource, TargetService, TargetServiceBuilder, DEFAULT_BASE_URL, SERVICE_NAME,
};
pub use tokio_util::sync::CancellationToken;
