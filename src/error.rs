use aws_sdk_dynamodb::error::{BuildError, ProvideErrorMetadata};
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use serde_dynamo::Error as SerdeDynamoError;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use crate::table::Key;

type DynamoBatchWriteItemError = SdkError<BatchWriteItemError, Response>;
type DynamoBatchGetItemError = SdkError<BatchGetItemError, Response>;

/// Service error codes DynamoDB uses to signal transient overload
const TRANSIENT_CODES: [&str; 4] = [
    "InternalServerError",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
];

/// Batch operation error
#[derive(Debug)]
pub enum Error {
    /// Serde DynamoDB serialization/deserialization error
    SerdeDynamo(SerdeDynamoError),
    /// DynamoDB request builder error
    BuildError(BuildError),
    /// More items than the provider accepts in a single batch call
    InputTooLarge {
        /// Provider limit for this kind of batch
        limit: usize,
        /// Number of items supplied
        actual: usize,
    },
    /// Number of destination slots differs from the number of requested keys
    SlotMismatch {
        /// Number of requested keys
        keys: usize,
        /// Number of destination slots
        slots: usize,
    },
    /// A write item could not be encoded; nothing was submitted
    EncodingFailed {
        /// Position of the offending item in the input
        index: usize,
        /// Underlying encoding failure
        source: EncodingError,
    },
    /// A returned record could not be decoded into its destination slot
    DecodeFailed {
        /// Identity of the record that failed
        key: Key,
        /// Underlying deserialization failure
        source: SerdeDynamoError,
        /// Requested identities with no slot filled when decoding stopped
        unprocessed: Vec<Key>,
    },
    /// A key attribute of a requested key or returned record was missing or malformed
    InvalidKey {
        /// The key shape problem
        source: KeyError,
        /// Requested identities with no slot filled when the call stopped
        unprocessed: Vec<Key>,
    },
    /// Non-retryable provider error, surfaced verbatim
    Provider {
        /// The provider error
        source: ProviderError,
        /// Identities that were still pending when the call aborted
        unprocessed: Vec<Key>,
    },
    /// Backoff budget spent while items were still unprocessed
    RetriesExhausted {
        /// Backoff attempts made
        attempts: u32,
        /// Total time spent waiting between rounds
        waited: Duration,
        /// Transient error of the last round, if the round failed outright
        source: Option<ProviderError>,
        /// Identities that were never processed
        unprocessed: Vec<Key>,
    },
    /// The call was cancelled before every item was processed
    Cancelled {
        /// Identities that were still pending
        unprocessed: Vec<Key>,
    },
    /// More than one chunk of a chunked call failed
    Chunks {
        /// Error of every failed chunk
        errors: Vec<Error>,
        /// Pending identities across all failed chunks
        unprocessed: Vec<Key>,
    },
}

impl Error {
    /// Identities not yet processed when the call failed
    ///
    /// Empty for errors raised before anything was submitted. Re-invoking the
    /// call with exactly these identities is safe because batch writes have
    /// overwrite semantics.
    pub fn unprocessed(&self) -> &[Key] {
        match self {
            Error::Provider { unprocessed, .. }
            | Error::DecodeFailed { unprocessed, .. }
            | Error::InvalidKey { unprocessed, .. }
            | Error::RetriesExhausted { unprocessed, .. }
            | Error::Cancelled { unprocessed }
            | Error::Chunks { unprocessed, .. } => unprocessed,
            _ => &[],
        }
    }

    /// Check if the error is a serialization/deserialization error
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            Error::SerdeDynamo(_) | Error::EncodingFailed { .. } | Error::DecodeFailed { .. }
        )
    }

    /// Check if the backoff budget ran out
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, Error::RetriesExhausted { .. })
    }

    /// Check if the error was raised before any provider call was made
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::InputTooLarge { .. }
                | Error::SlotMismatch { .. }
                | Error::EncodingFailed { .. }
                | Error::BuildError(_)
        )
    }
}

macro_rules! impl_from_error {
    ($name:ident, $variant:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$variant(e)
            }
        }
    };
    ($name:ident) => {
        impl From<$name> for Error {
            fn from(e: $name) -> Self {
                Error::$name(e)
            }
        }
    };
}

impl_from_error!(SerdeDynamoError, SerdeDynamo);
impl_from_error!(BuildError);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SerdeDynamo(e) => write!(f, "DynamoDB serialization error: {}", e),
            Error::BuildError(e) => write!(f, "DynamoDB request builder error: {}", e),
            Error::InputTooLarge { limit, actual } => {
                write!(f, "batch of {} items exceeds the limit of {}", actual, limit)
            }
            Error::SlotMismatch { keys, slots } => {
                write!(f, "{} keys requested but {} destination slots supplied", keys, slots)
            }
            Error::EncodingFailed { index, source } => {
                write!(f, "failed to encode batch item {}: {}", index, source)
            }
            Error::DecodeFailed { key, source, .. } => {
                write!(f, "failed to decode record {:?}: {}", key, source)
            }
            Error::InvalidKey { source, unprocessed } => write!(
                f,
                "invalid key: {} ({} items unprocessed)",
                source,
                unprocessed.len()
            ),
            Error::Provider { source, unprocessed } => write!(
                f,
                "{} ({} items unprocessed)",
                source,
                unprocessed.len()
            ),
            Error::RetriesExhausted {
                attempts,
                waited,
                unprocessed,
                ..
            } => write!(
                f,
                "retries exhausted after {} attempts and {:?} of backoff ({} items unprocessed)",
                attempts,
                waited,
                unprocessed.len()
            ),
            Error::Cancelled { unprocessed } => write!(
                f,
                "batch call cancelled ({} items unprocessed)",
                unprocessed.len()
            ),
            Error::Chunks {
                errors,
                unprocessed,
            } => write!(
                f,
                "{} batch chunks failed ({} items unprocessed)",
                errors.len(),
                unprocessed.len()
            ),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::SerdeDynamo(e) => Some(e),
            Error::BuildError(e) => Some(e),
            Error::EncodingFailed { source, .. } => Some(source),
            Error::DecodeFailed { source, .. } => Some(source),
            Error::InvalidKey { source, .. } => Some(source),
            Error::Provider { source, .. } => Some(source),
            Error::RetriesExhausted {
                source: Some(source),
                ..
            } => Some(source),
            _ => None,
        }
    }
}

/// Why a write item could not be encoded
#[derive(Debug)]
pub enum EncodingError {
    /// The record could not be serialized into an attribute map
    Serde(SerdeDynamoError),
    /// The record or delete key does not carry a valid table key
    Key(KeyError),
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::Serde(e) => write!(f, "{}", e),
            EncodingError::Key(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for EncodingError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            EncodingError::Serde(e) => Some(e),
            EncodingError::Key(e) => Some(e),
        }
    }
}

/// Key shape problems
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A key attribute required by the table schema is absent
    MissingAttribute(&'static str),
    /// A key attribute is not a string, number or binary value
    UnsupportedType(&'static str),
    /// A sort key value was given for a table without a sort key
    UnexpectedSortKey,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::MissingAttribute(name) => write!(f, "missing key attribute `{}`", name),
            KeyError::UnsupportedType(name) => write!(
                f,
                "key attribute `{}` is not a string, number or binary value",
                name
            ),
            KeyError::UnexpectedSortKey => {
                write!(f, "sort key value supplied for a table without a sort key")
            }
        }
    }
}

impl StdError for KeyError {}

/// Retry classification of a provider error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Overload or transport trouble; the same request may succeed later
    Transient,
    /// Validation or permanent failure; retrying cannot help
    Permanent,
}

/// Error returned by a batch provider call
#[derive(Debug)]
pub enum ProviderError {
    /// DynamoDB BatchWriteItem operation error
    BatchWriteItem(DynamoBatchWriteItemError),
    /// DynamoDB BatchGetItem operation error
    BatchGetItem(DynamoBatchGetItemError),
    /// The provider request could not be built
    Build(BuildError),
}

impl ProviderError {
    /// Classify the error for the retry loop
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::BatchWriteItem(e) => classify(e, |service| {
                service.is_internal_server_error()
                    || service.is_provisioned_throughput_exceeded_exception()
                    || service.is_request_limit_exceeded()
            }),
            ProviderError::BatchGetItem(e) => classify(e, |service| {
                service.is_internal_server_error()
                    || service.is_provisioned_throughput_exceeded_exception()
                    || service.is_request_limit_exceeded()
            }),
            ProviderError::Build(_) => ErrorClass::Permanent,
        }
    }

    /// Check if the retry loop may resubmit after this error
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn classify<E>(err: &SdkError<E, Response>, transient: impl Fn(&E) -> bool) -> ErrorClass
where
    E: ProvideErrorMetadata,
{
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorClass::Transient
        }
        SdkError::ServiceError(service) => {
            let service = service.err();
            let code = service.code().unwrap_or_default();
            if transient(service) || TRANSIENT_CODES.contains(&code) {
                ErrorClass::Transient
            } else {
                ErrorClass::Permanent
            }
        }
        _ => ErrorClass::Permanent,
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::BatchWriteItem(e) => {
                write!(f, "DynamoDB BatchWriteItem operation failed: {}", e)
            }
            ProviderError::BatchGetItem(e) => {
                write!(f, "DynamoDB BatchGetItem operation failed: {}", e)
            }
            ProviderError::Build(e) => write!(f, "DynamoDB request builder error: {}", e),
        }
    }
}

impl StdError for ProviderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ProviderError::BatchWriteItem(e) => Some(e),
            ProviderError::BatchGetItem(e) => Some(e),
            ProviderError::Build(e) => Some(e),
        }
    }
}
