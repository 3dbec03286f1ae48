//! The provider batch calls the retry loop drives
//!
//! [`BatchProvider`] is the only thing the engine needs from the store: one
//! batch-write call and one batch-read call, each answering with the subset
//! it did not process. `aws_sdk_dynamodb::Client` implements it directly.

use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    ConsumedCapacity, KeysAndAttributes, ReturnConsumedCapacity, WriteRequest,
};
use std::future::Future;

use crate::error::ProviderError;
use crate::table::{Item, Key};

/// Answer to one batch-write submission
#[derive(Clone, Debug, Default)]
pub struct WriteResponse {
    /// Write requests the provider did not apply
    pub unprocessed: Vec<WriteRequest>,
    /// Capacity consumed by the submission
    pub consumed_capacity: Vec<ConsumedCapacity>,
}

/// Answer to one batch-read submission
#[derive(Clone, Debug, Default)]
pub struct ReadResponse {
    /// Records found, in no particular order
    pub items: Vec<Item>,
    /// Keys the provider did not read
    pub unprocessed: Vec<Key>,
    /// Capacity consumed by the submission
    pub consumed_capacity: Vec<ConsumedCapacity>,
}

/// A store that accepts partial-failure batch calls
pub trait BatchProvider: Send + Sync {
    /// Submit up to 25 write requests against one table
    fn submit_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> impl Future<Output = Result<WriteResponse, ProviderError>> + Send;

    /// Read up to 100 keys from one table
    fn submit_read(
        &self,
        table: &str,
        keys: Vec<Key>,
        consistent_read: bool,
    ) -> impl Future<Output = Result<ReadResponse, ProviderError>> + Send;
}

impl BatchProvider for Client {
    async fn submit_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<WriteResponse, ProviderError> {
        let output = self
            .batch_write_item()
            .request_items(table, requests)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(ProviderError::BatchWriteItem)?;

        Ok(WriteResponse {
            unprocessed: output
                .unprocessed_items
                .and_then(|mut tables| tables.remove(table))
                .unwrap_or_default(),
            consumed_capacity: output.consumed_capacity.unwrap_or_default(),
        })
    }

    async fn submit_read(
        &self,
        table: &str,
        keys: Vec<Key>,
        consistent_read: bool,
    ) -> Result<ReadResponse, ProviderError> {
        let request = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .consistent_read(consistent_read)
            .build()
            .map_err(ProviderError::Build)?;

        let output = self
            .batch_get_item()
            .request_items(table, request)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(ProviderError::BatchGetItem)?;

        Ok(ReadResponse {
            items: output
                .responses
                .and_then(|mut tables| tables.remove(table))
                .unwrap_or_default(),
            unprocessed: output
                .unprocessed_keys
                .and_then(|mut tables| tables.remove(table))
                .map(|keys_attrs| keys_attrs.keys)
                .unwrap_or_default(),
            consumed_capacity: output.consumed_capacity.unwrap_or_default(),
        })
    }
}
