use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;

use crate::backoff::BackoffConfig;
use crate::error::Error;
use crate::table::batch::{BatchReadOutput, BatchWriteOutput, batch_get_all, batch_write_all};
use crate::table::request::WriteOp;
use crate::table::types::{BatchOptions, CompositeKey, KeyAttribute, KeySchema};

/// A record type stored in one DynamoDB table
///
/// Records are encoded with `serde_dynamo`, so the serialized form of a record
/// must carry its key attributes under [`Self::PARTITION_KEY`] and
/// [`Self::SORT_KEY`].
pub trait DynamoTable: Serialize + DeserializeOwned + Send + Sync {
    /// Associated partition key type
    type PK: KeyAttribute;

    /// Associated sort key type
    type SK: KeyAttribute;

    /// Name of the table
    const TABLE: &'static str;

    /// Partition key attribute name
    const PARTITION_KEY: &'static str;

    /// Sort key attribute name
    const SORT_KEY: Option<&'static str> = None;

    /// Backoff applied to every logical batch call against this table
    const BACKOFF: BackoffConfig = BackoffConfig::DEFAULT;

    /// Whether batch reads ask for strongly consistent results
    const CONSISTENT_READ: bool = false;

    /// Maximum number of batch chunks in flight for one call
    const BATCH_CONCURRENCY: usize = 10;

    /// Partition key
    fn partition_key(&self) -> Self::PK;

    /// Sort key
    fn sort_key(&self) -> Option<Self::SK> {
        None
    }

    /// Composite key
    fn composite_key(&self) -> CompositeKey<Self::PK, Self::SK> {
        (self.partition_key(), self.sort_key())
    }

    /// Key attribute names of the table
    fn key_schema() -> KeySchema {
        KeySchema {
            partition_key: Self::PARTITION_KEY,
            sort_key: Self::SORT_KEY,
        }
    }

    /// Get the DynamoDB client for this table
    ///
    /// By default, returns the global client. Can be overridden to use a
    /// different client per table.
    fn dynamodb_client() -> impl Future<Output = &'static aws_sdk_dynamodb::Client> {
        crate::dynamodb_client()
    }

    /// Apply any number of puts and deletes
    ///
    /// Chunks of 25 run concurrently, each retrying its own unprocessed items
    /// with [`Self::BACKOFF`].
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dynamo_batch::{DynamoTable, Error, WriteOp};
    /// # use serde::{Deserialize, Serialize};
    /// #
    /// # #[derive(Debug, Clone, Serialize, Deserialize)]
    /// # struct User {
    /// #     user_id: String,
    /// #     email: String,
    /// # }
    /// #
    /// # impl DynamoTable for User {
    /// #     type PK = String;
    /// #     type SK = String;
    /// #     const TABLE: &'static str = "users";
    /// #     const PARTITION_KEY: &'static str = "user_id";
    /// #     fn partition_key(&self) -> Self::PK { self.user_id.clone() }
    /// # }
    ///
    /// async fn example() -> Result<(), Error> {
    ///     let ops = vec![
    ///         WriteOp::Put(User { user_id: "1".to_string(), email: "a@example.com".to_string() }),
    ///         WriteOp::delete("2".to_string(), None),
    ///     ];
    ///
    ///     let result = User::batch_write(ops).await?;
    ///     println!("{} retry rounds", result.metrics.retry_count);
    ///     Ok(())
    /// }
    /// ```
    fn batch_write(
        ops: Vec<WriteOp<Self>>,
    ) -> impl Future<Output = Result<BatchWriteOutput, Error>> {
        async move {
            let client = Self::dynamodb_client().await;
            let options = BatchOptions::for_table::<Self>();
            batch_write_all(client, ops, &options).await
        }
    }

    /// Insert or replace any number of records
    fn batch_upsert(items: Vec<Self>) -> impl Future<Output = Result<BatchWriteOutput, Error>> {
        Self::batch_write(items.into_iter().map(WriteOp::Put).collect())
    }

    /// Delete any number of records by key
    fn batch_delete(
        keys: Vec<CompositeKey<Self::PK, Self::SK>>,
    ) -> impl Future<Output = Result<BatchWriteOutput, Error>> {
        Self::batch_write(keys.into_iter().map(WriteOp::Delete).collect())
    }

    /// Read any number of records by key
    ///
    /// The returned slots follow the order of `keys`; `None` marks a key with
    /// no record.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use dynamo_batch::{DynamoTable, Error};
    /// # use serde::{Deserialize, Serialize};
    /// #
    /// # #[derive(Debug, Clone, Serialize, Deserialize)]
    /// # struct User {
    /// #     user_id: String,
    /// # }
    /// #
    /// # impl DynamoTable for User {
    /// #     type PK = String;
    /// #     type SK = String;
    /// #     const TABLE: &'static str = "users";
    /// #     const PARTITION_KEY: &'static str = "user_id";
    /// #     fn partition_key(&self) -> Self::PK { self.user_id.clone() }
    /// # }
    ///
    /// async fn example() -> Result<(), Error> {
    ///     let keys = vec![("user1".to_string(), None), ("user2".to_string(), None)];
    ///
    ///     let result = User::batch_get(keys).await?;
    ///     for (slot, user) in result.items.iter().enumerate() {
    ///         println!("{slot}: {user:?}");
    ///     }
    ///     Ok(())
    /// }
    /// ```
    fn batch_get(
        keys: Vec<CompositeKey<Self::PK, Self::SK>>,
    ) -> impl Future<Output = Result<BatchReadOutput<Self>, Error>> {
        async move {
            let client = Self::dynamodb_client().await;
            let options = BatchOptions::for_table::<Self>();
            batch_get_all(client, keys, &options).await
        }
    }
}
