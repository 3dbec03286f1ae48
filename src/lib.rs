//! # DynamoDB Partial-Failure Batch Engine
//!
//! Typed batch reads and writes against DynamoDB that survive the provider's
//! partial-failure semantics:
//! - Batch writes (puts and deletes) of up to 25 items per call
//! - Batch reads of up to 100 keys per call, reassembled in request order
//! - Retry of only the unprocessed remainder, with full-jitter exponential backoff
//! - Transient/permanent error classification
//! - Cancellation and per-call metrics
//!
//! ## Features
//!
//! - **Type-safe**: records are encoded with `serde` and `serde_dynamo`
//! - **Async-first**: built on `tokio` and `aws-sdk-dynamodb`
//! - **Bounded retries**: every logical call owns a [`backoff::Backoff`] with a capped
//!   cumulative wait
//! - **Pluggable provider**: the engine drives any [`provider::BatchProvider`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_batch::{DynamoTable, Error};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     user_id: String,
//!     email: String,
//! }
//!
//! impl DynamoTable for User {
//!     type PK = String;
//!     type SK = String;
//!
//!     const TABLE: &'static str = "users";
//!     const PARTITION_KEY: &'static str = "user_id";
//!
//!     fn partition_key(&self) -> Self::PK {
//!         self.user_id.clone()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
//!     dynamo_batch::init(&config).await;
//!
//!     let users = (0..60)
//!         .map(|i| User { user_id: i.to_string(), email: format!("{i}@example.com") })
//!         .collect();
//!     let written = User::batch_upsert(users).await?;
//!     println!("{} submissions", written.metrics.submissions);
//!
//!     let read = User::batch_get(vec![("1".to_string(), None), ("99".to_string(), None)]).await?;
//!     assert_eq!(read.items.len(), 2);
//!
//!     Ok(())
//! }
//! ```
#![deny(
    warnings,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

mod error;
pub use error::{EncodingError, Error, ErrorClass, KeyError, ProviderError};

pub mod backoff;

pub mod provider;

/// Typed table layer and batch entry points
pub mod table;

// Re-export main types for convenience
pub use backoff::{Backoff, BackoffConfig, Exhausted};
pub use provider::{BatchProvider, ReadResponse, WriteResponse};
pub use table::{
    BatchMetrics, BatchOptions, BatchReadOutput, BatchWriteOutput, CompositeKey, DynamoTable,
    WriteOp,
};

// Re-export aws-config types for configuration
pub use aws_config::{
    BehaviorVersion, Region, SdkConfig, defaults,
    retry::{RetryConfig, RetryMode},
    timeout::TimeoutConfig,
};

// Re-export aws-types for advanced configuration
pub use aws_types::sdk_config::Builder as SdkConfigBuilder;

// Re-export the cancellation handle taken by every batch call
pub use tokio_util::sync::CancellationToken;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use tokio::sync::OnceCell;

/// Global DynamoDB client instance
static GLOBAL_CLIENT: OnceCell<DynamoDbClient> = OnceCell::const_new();

/// Default SDK configuration for the global client
///
/// - Adaptive SDK retry mode with 3 max attempts
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
///
/// SDK retries cover single requests; unprocessed batch items are retried by
/// the engine on top of them.
async fn aws_config_defaults() -> SdkConfig {
    use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
    use std::time::Duration;

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        tracing::debug!("using LocalStack endpoint");
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// Initialize the global DynamoDB client with a custom AWS config
///
/// Has no effect once the global client exists.
///
/// # Example
///
/// ```rust,no_run
/// #[tokio::main]
/// async fn main() {
///     let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
///         .region(aws_config::Region::new("us-west-2"))
///         .load()
///         .await;
///     dynamo_batch::init(&config).await;
/// }
/// ```
pub async fn init(config: &SdkConfig) {
    let _ = GLOBAL_CLIENT
        .get_or_init(|| async { DynamoDbClient::new(config) })
        .await;
}

/// Initialize the global DynamoDB client with a custom client instance
pub async fn init_with_client(client: DynamoDbClient) {
    let _ = GLOBAL_CLIENT.get_or_init(|| async { client }).await;
}

/// Get a reference to the global DynamoDB client
///
/// Initializes the client with the defaults of `aws_config_defaults` on first
/// use, unless [`init`] or [`init_with_client`] ran before.
///
/// ```rust,no_run
/// # async fn example() {
/// let client = dynamo_batch::dynamodb_client().await;
/// # }
/// ```
pub async fn dynamodb_client() -> &'static DynamoDbClient {
    GLOBAL_CLIENT
        .get_or_init(|| async {
            let config = aws_config_defaults().await;
            DynamoDbClient::new(&config)
        })
        .await
}
