use aws_sdk_dynamodb::types::WriteRequest;
use futures_util::StreamExt;
use std::iter;
use tokio::time::Instant;
use tokio_stream::{self as stream};
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::error::Error;
use crate::provider::BatchProvider;
use crate::table::DynamoTable;
use crate::table::assemble::ReadAssembler;
use crate::table::request::{
    MAX_READ_KEYS, MAX_WRITE_ITEMS, WriteOp, build_read_batch, build_write_batch,
};
use crate::table::retry::{self, Submitted};
use crate::table::types::{BatchMetrics, BatchOptions, CompositeKey, Key};

/// Batch write output
#[must_use = "batch write metrics report retries and consumed capacity"]
#[derive(Clone, Debug, Default)]
pub struct BatchWriteOutput {
    /// Submission, retry and capacity counters
    pub metrics: BatchMetrics,
}

/// Batch read output
///
/// `items` holds one slot per requested key, in request order. A `None` slot
/// means the table holds no record with that key.
#[must_use = "batch read results should be checked"]
#[derive(Clone, Debug)]
pub struct BatchReadOutput<T> {
    /// Records in request order
    pub items: Vec<Option<T>>,
    /// Submission, retry and capacity counters
    pub metrics: BatchMetrics,
}

impl<T> BatchReadOutput<T> {
    /// Number of keys that matched a record
    pub fn found_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_some()).count()
    }

    /// Number of keys with no record
    pub fn missing_count(&self) -> usize {
        self.items.len() - self.found_count()
    }

    /// Drop the empty slots, keeping request order
    pub fn into_found(self) -> Vec<T> {
        self.items.into_iter().flatten().collect()
    }
}

/// Write up to 25 puts and deletes in one logical batch call
///
/// Items the provider leaves unprocessed are resubmitted, alone, after a
/// backoff wait, until every item is applied or `backoff` is exhausted. Keys
/// must be unique within `ops`.
///
/// On failure [`Error::unprocessed`] lists the identities that may not have
/// been applied; writing them again is safe since puts and deletes overwrite.
#[tracing::instrument(skip_all, fields(table = T::TABLE, items = ops.len()))]
pub async fn batch_write<T, P>(
    provider: &P,
    ops: Vec<WriteOp<T>>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<BatchWriteOutput, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    let requests = build_write_batch(ops)?;
    let metrics = execute_write::<T, P>(provider, requests, backoff, cancel).await?;
    Ok(BatchWriteOutput { metrics })
}

/// Read up to 100 keys into caller-supplied slots
///
/// `slots[i]` receives the record for `keys[i]`, however the provider orders
/// its answers and whichever retry round returns it. Slots of keys with no
/// record are left untouched. When the call fails, slots already filled stay
/// filled; a slot is never assigned a partially decoded record.
#[tracing::instrument(skip_all, fields(table = T::TABLE, items = keys.len()))]
pub async fn batch_get_into<T, P>(
    provider: &P,
    keys: Vec<CompositeKey<T::PK, T::SK>>,
    slots: &mut [Option<T>],
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<BatchMetrics, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    if keys.len() != slots.len() {
        return Err(Error::SlotMismatch {
            keys: keys.len(),
            slots: slots.len(),
        });
    }

    let keys = build_read_batch::<T>(keys)?;
    execute_read(provider, keys, slots, backoff, cancel).await
}

/// Read up to 100 keys, returning one slot per key in request order
pub async fn batch_get<T, P>(
    provider: &P,
    keys: Vec<CompositeKey<T::PK, T::SK>>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<BatchReadOutput<T>, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    let mut items = empty_slots(keys.len());
    let metrics = batch_get_into(provider, keys, &mut items, backoff, cancel).await?;
    Ok(BatchReadOutput { items, metrics })
}

/// Write any number of puts and deletes
///
/// The input is split into provider-sized chunks. Every chunk is encoded
/// before the first submission, then each runs as an independent logical call
/// with its own backoff, at most `options.concurrency` at a time.
#[tracing::instrument(skip_all, fields(table = T::TABLE, items = ops.len()))]
pub async fn batch_write_all<T, P>(
    provider: &P,
    ops: Vec<WriteOp<T>>,
    options: &BatchOptions,
) -> Result<BatchWriteOutput, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    let started = Instant::now();

    let mut chunks = Vec::new();
    for (chunk, ops) in into_chunks(ops, MAX_WRITE_ITEMS).into_iter().enumerate() {
        let requests =
            build_write_batch(ops).map_err(|e| offset_index(e, chunk * MAX_WRITE_ITEMS))?;
        chunks.push(requests);
    }

    let mut tasks = Vec::with_capacity(chunks.len());
    for (index, requests) in chunks.into_iter().enumerate() {
        tasks.push(write_chunk::<T, P>(provider, index, requests, options));
    }

    let results = stream::iter(tasks)
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut metrics = merge_chunks(results)?;
    metrics.total_duration = started.elapsed();
    Ok(BatchWriteOutput { metrics })
}

/// Read any number of keys, returning one slot per key in request order
///
/// Chunks of up to 100 keys run concurrently, each with its own backoff.
#[tracing::instrument(skip_all, fields(table = T::TABLE, items = keys.len()))]
pub async fn batch_get_all<T, P>(
    provider: &P,
    keys: Vec<CompositeKey<T::PK, T::SK>>,
    options: &BatchOptions,
) -> Result<BatchReadOutput<T>, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    let started = Instant::now();
    let mut items = empty_slots(keys.len());

    let mut chunks = Vec::new();
    for (chunk, keys) in into_chunks(keys, MAX_READ_KEYS).into_iter().enumerate() {
        let keys =
            build_read_batch::<T>(keys).map_err(|e| offset_index(e, chunk * MAX_READ_KEYS))?;
        chunks.push(keys);
    }

    let mut tasks = Vec::with_capacity(chunks.len());
    for ((index, keys), slots) in chunks
        .into_iter()
        .enumerate()
        .zip(items.chunks_mut(MAX_READ_KEYS))
    {
        tasks.push(read_chunk::<T, P>(provider, index, keys, slots, options));
    }

    let results = stream::iter(tasks)
        .buffer_unordered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut metrics = merge_chunks(results)?;
    metrics.total_duration = started.elapsed();
    Ok(BatchReadOutput { items, metrics })
}

async fn execute_write<T, P>(
    provider: &P,
    requests: Vec<WriteRequest>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<BatchMetrics, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    retry::run(
        &T::key_schema(),
        requests,
        backoff,
        cancel,
        |pending| async move {
            provider
                .submit_write(T::TABLE, pending)
                .await
                .map(|response| Submitted {
                    unprocessed: response.unprocessed,
                    output: (),
                    consumed_capacity: response.consumed_capacity,
                })
        },
        |()| Ok(()),
    )
    .await
}

async fn execute_read<T, P>(
    provider: &P,
    keys: Vec<Key>,
    slots: &mut [Option<T>],
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Result<BatchMetrics, Error>
where
    T: DynamoTable,
    P: BatchProvider,
{
    let schema = T::key_schema();
    let mut assembler = ReadAssembler::new(schema, &keys, slots)?;

    retry::run(
        &schema,
        keys,
        backoff,
        cancel,
        |pending| async move {
            provider
                .submit_read(T::TABLE, pending, T::CONSISTENT_READ)
                .await
                .map(|response| Submitted {
                    unprocessed: response.unprocessed,
                    output: response.items,
                    consumed_capacity: response.consumed_capacity,
                })
        },
        |records| assembler.place(records),
    )
    .await
}

async fn write_chunk<T, P>(
    provider: &P,
    index: usize,
    requests: Vec<WriteRequest>,
    options: &BatchOptions,
) -> (usize, Result<BatchMetrics, Error>)
where
    T: DynamoTable,
    P: BatchProvider,
{
    let mut backoff = Backoff::new(options.backoff);
    let result = execute_write::<T, P>(provider, requests, &mut backoff, &options.cancel).await;
    (index, result)
}

async fn read_chunk<T, P>(
    provider: &P,
    index: usize,
    keys: Vec<Key>,
    slots: &mut [Option<T>],
    options: &BatchOptions,
) -> (usize, Result<BatchMetrics, Error>)
where
    T: DynamoTable,
    P: BatchProvider,
{
    let mut backoff = Backoff::new(options.backoff);
    let result = execute_read(provider, keys, slots, &mut backoff, &options.cancel).await;
    (index, result)
}

/// Fold per-chunk results; one failure surfaces as is, several as [`Error::Chunks`]
fn merge_chunks(
    mut results: Vec<(usize, Result<BatchMetrics, Error>)>,
) -> Result<BatchMetrics, Error> {
    results.sort_by_key(|(index, _)| *index);

    let mut metrics = BatchMetrics::default();
    let mut errors = Vec::new();
    for (_, result) in results {
        match result {
            Ok(chunk) => metrics.merge(chunk),
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(metrics),
        1 => Err(errors.swap_remove(0)),
        _ => {
            let unprocessed = errors
                .iter()
                .flat_map(|e| e.unprocessed().iter().cloned())
                .collect();
            Err(Error::Chunks {
                errors,
                unprocessed,
            })
        }
    }
}

fn offset_index(err: Error, offset: usize) -> Error {
    match err {
        Error::EncodingFailed { index, source } => Error::EncodingFailed {
            index: offset + index,
            source,
        },
        other => other,
    }
}

fn into_chunks<I>(items: Vec<I>, size: usize) -> Vec<Vec<I>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(size).collect());
    }
    chunks
}

fn empty_slots<T>(len: usize) -> Vec<Option<T>> {
    iter::repeat_with(|| None).take(len).collect()
}
