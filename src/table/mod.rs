mod assemble;
mod batch;
mod operations;
mod request;
mod retry;
mod types;

pub use batch::{
    BatchReadOutput, BatchWriteOutput, batch_get, batch_get_all, batch_get_into, batch_write,
    batch_write_all,
};
pub use operations::*;
pub use request::{MAX_READ_KEYS, MAX_WRITE_ITEMS, WriteOp, build_read_batch, build_write_batch};
pub use types::{
    BatchMetrics, BatchOptions, CompositeKey, Item, Key, KeyAttribute, KeySchema, KeyValue,
    PartitionKey, SortKey,
};
