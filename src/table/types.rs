use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ConsumedCapacity};
use std::{collections::HashMap, fmt, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffConfig;
use crate::error::KeyError;
use crate::table::DynamoTable;

/// A full record in provider shape
pub type Item = HashMap<String, AttributeValue>;

/// Key attributes of a record in provider shape
pub type Key = HashMap<String, AttributeValue>;

/// Partition key type alias
pub type PartitionKey<PK> = PK;

/// Sort key type alias
pub type SortKey<SK> = Option<SK>;

/// Composite key type alias
pub type CompositeKey<PK, SK> = (PK, SortKey<SK>);

/// A key attribute value
///
/// DynamoDB only accepts strings, numbers and binary values as key attributes,
/// so keys are decided here instead of by inspecting values at runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyValue {
    /// String key
    S(String),
    /// Number key, in DynamoDB's decimal string form
    N(String),
    /// Binary key
    B(Vec<u8>),
}

impl KeyValue {
    /// Convert into the provider attribute value
    pub fn into_attribute_value(self) -> AttributeValue {
        match self {
            KeyValue::S(s) => AttributeValue::S(s),
            KeyValue::N(n) => AttributeValue::N(n),
            KeyValue::B(b) => AttributeValue::B(Blob::new(b)),
        }
    }

    /// Read a key value back from a provider attribute value
    pub fn from_attribute_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::S(s) => Some(KeyValue::S(s.clone())),
            AttributeValue::N(n) => Some(KeyValue::N(n.clone())),
            AttributeValue::B(b) => Some(KeyValue::B(b.as_ref().to_vec())),
            _ => None,
        }
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::S(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::S(value.to_string())
    }
}

impl From<Vec<u8>> for KeyValue {
    fn from(value: Vec<u8>) -> Self {
        KeyValue::B(value)
    }
}

macro_rules! impl_number_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyValue {
                fn from(value: $ty) -> Self {
                    KeyValue::N(value.to_string())
                }
            }
        )*
    };
}

impl_number_key!(i32, i64, u32, u64, usize);

/// Bounds every partition and sort key type satisfies
pub trait KeyAttribute: Into<KeyValue> + Clone + Send + Sync + fmt::Debug {}

impl<K> KeyAttribute for K where K: Into<KeyValue> + Clone + Send + Sync + fmt::Debug {}

/// Hashable identity of a record, used to match responses to requests
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct KeyIdentity(KeyValue, Option<KeyValue>);

/// Names of the key attributes of a table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition key attribute name
    pub partition_key: &'static str,
    /// Sort key attribute name, if the table has one
    pub sort_key: Option<&'static str>,
}

impl KeySchema {
    /// Build a provider-shaped key from a partition value and optional sort value
    pub fn key_of(&self, partition: KeyValue, sort: Option<KeyValue>) -> Result<Key, KeyError> {
        let mut key = HashMap::with_capacity(2);
        let _ = key.insert(
            self.partition_key.to_string(),
            partition.into_attribute_value(),
        );

        match (self.sort_key, sort) {
            (Some(name), Some(value)) => {
                let _ = key.insert(name.to_string(), value.into_attribute_value());
            }
            (Some(name), None) => return Err(KeyError::MissingAttribute(name)),
            (None, Some(_)) => return Err(KeyError::UnexpectedSortKey),
            (None, None) => {}
        }

        Ok(key)
    }

    /// Extract the key attributes of a full record
    pub fn project(&self, item: &Item) -> Result<Key, KeyError> {
        let mut key = HashMap::with_capacity(2);
        for name in self.names() {
            let value = item.get(name).ok_or(KeyError::MissingAttribute(name))?;
            if KeyValue::from_attribute_value(value).is_none() {
                return Err(KeyError::UnsupportedType(name));
            }
            let _ = key.insert(name.to_string(), value.clone());
        }
        Ok(key)
    }

    /// Extract whatever key attributes a record carries, ignoring absent ones
    pub(crate) fn project_lossy(&self, item: &Item) -> Key {
        self.names()
            .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    pub(crate) fn identity(&self, attributes: &Item) -> Result<KeyIdentity, KeyError> {
        let partition = self.value(attributes, self.partition_key)?;
        let sort = self
            .sort_key
            .map(|name| self.value(attributes, name))
            .transpose()?;
        Ok(KeyIdentity(partition, sort))
    }

    fn value(&self, attributes: &Item, name: &'static str) -> Result<KeyValue, KeyError> {
        let value = attributes
            .get(name)
            .ok_or(KeyError::MissingAttribute(name))?;
        KeyValue::from_attribute_value(value).ok_or(KeyError::UnsupportedType(name))
    }

    fn names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.partition_key).chain(self.sort_key)
    }
}

/// Counters collected over one logical batch call
#[derive(Clone, Debug, Default)]
pub struct BatchMetrics {
    /// Provider calls issued
    pub submissions: usize,
    /// Retry rounds, i.e. submissions after the first
    pub retry_count: usize,
    /// Time spent in backoff sleeps
    pub waited: Duration,
    /// Total execution time including all retries
    pub total_duration: Duration,
    /// The capacity units consumed by every submission
    pub consumed_capacity: Vec<ConsumedCapacity>,
}

impl BatchMetrics {
    pub(crate) fn merge(&mut self, other: BatchMetrics) {
        self.submissions += other.submissions;
        self.retry_count += other.retry_count;
        self.waited += other.waited;
        self.consumed_capacity.extend(other.consumed_capacity);
    }
}

/// Options for chunked batch calls
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Backoff configuration; every chunk gets its own scheduler
    pub backoff: BackoffConfig,
    /// Maximum number of chunks in flight
    pub concurrency: usize,
    /// Cancels every chunk that has not finished yet
    pub cancel: CancellationToken,
}

impl BatchOptions {
    /// Options derived from a table's constants
    pub fn for_table<T: DynamoTable>() -> Self {
        Self {
            backoff: T::BACKOFF,
            concurrency: T::BATCH_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::DEFAULT,
            concurrency: 10,
            cancel: CancellationToken::new(),
        }
    }
}
