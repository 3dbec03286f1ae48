use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, PutRequest, WriteRequest};
use serde_dynamo::to_item;
use std::collections::HashMap;

use crate::error::{EncodingError, Error, KeyError};
use crate::table::DynamoTable;
use crate::table::types::{CompositeKey, Key, KeySchema, KeyValue};

/// Most write requests DynamoDB accepts in one BatchWriteItem call
pub const MAX_WRITE_ITEMS: usize = 25;

/// Most keys DynamoDB accepts in one BatchGetItem call
pub const MAX_READ_KEYS: usize = 100;

/// One logical write in a batch
///
/// Keys must be unique within a batch; DynamoDB rejects the whole call otherwise.
#[derive(Clone, Debug)]
pub enum WriteOp<T: DynamoTable> {
    /// Insert or replace a full record
    Put(T),
    /// Delete the record with this key
    Delete(CompositeKey<T::PK, T::SK>),
}

impl<T: DynamoTable> WriteOp<T> {
    /// Delete by partition key and optional sort key
    pub fn delete(partition_key: T::PK, sort_key: Option<T::SK>) -> Self {
        WriteOp::Delete((partition_key, sort_key))
    }
}

/// Encode write operations into provider write requests
///
/// Fails with [`Error::InputTooLarge`] above [`MAX_WRITE_ITEMS`], and with
/// [`Error::EncodingFailed`] when any single item cannot be encoded, in which
/// case nothing is returned for submission.
pub fn build_write_batch<T>(ops: Vec<WriteOp<T>>) -> Result<Vec<WriteRequest>, Error>
where
    T: DynamoTable,
{
    if ops.len() > MAX_WRITE_ITEMS {
        return Err(Error::InputTooLarge {
            limit: MAX_WRITE_ITEMS,
            actual: ops.len(),
        });
    }

    let schema = T::key_schema();
    let mut requests = Vec::with_capacity(ops.len());

    for (index, op) in ops.into_iter().enumerate() {
        let request = match op {
            WriteOp::Put(value) => {
                let item = to_item::<_, HashMap<String, AttributeValue>>(value)
                    .map_err(|source| Error::EncodingFailed {
                        index,
                        source: EncodingError::Serde(source),
                    })?;

                // a record without its key attributes would be rejected by the provider
                let _ = schema.project(&item).map_err(|e| Error::EncodingFailed {
                    index,
                    source: EncodingError::Key(e),
                })?;

                WriteRequest::builder()
                    .put_request(PutRequest::builder().set_item(Some(item)).build()?)
                    .build()
            }
            WriteOp::Delete((partition_key, sort_key)) => {
                let key = encode_key(&schema, partition_key, sort_key).map_err(|e| {
                    Error::EncodingFailed {
                        index,
                        source: EncodingError::Key(e),
                    }
                })?;

                WriteRequest::builder()
                    .delete_request(DeleteRequest::builder().set_key(Some(key)).build()?)
                    .build()
            }
        };
        requests.push(request);
    }

    Ok(requests)
}

/// Encode composite keys into provider keys
///
/// Fails with [`Error::InputTooLarge`] above [`MAX_READ_KEYS`].
pub fn build_read_batch<T>(keys: Vec<CompositeKey<T::PK, T::SK>>) -> Result<Vec<Key>, Error>
where
    T: DynamoTable,
{
    if keys.len() > MAX_READ_KEYS {
        return Err(Error::InputTooLarge {
            limit: MAX_READ_KEYS,
            actual: keys.len(),
        });
    }

    let schema = T::key_schema();
    keys.into_iter()
        .enumerate()
        .map(|(index, (partition_key, sort_key))| {
            encode_key(&schema, partition_key, sort_key).map_err(|e| Error::EncodingFailed {
                index,
                source: EncodingError::Key(e),
            })
        })
        .collect()
}

fn encode_key<PK, SK>(
    schema: &KeySchema,
    partition_key: PK,
    sort_key: Option<SK>,
) -> Result<Key, KeyError>
where
    PK: Into<KeyValue>,
    SK: Into<KeyValue>,
{
    schema.key_of(partition_key.into(), sort_key.map(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize, Serializer, ser::Error as _};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        customer: String,
        order_id: String,
        total: u64,
    }

    impl DynamoTable for Order {
        type PK = String;
        type SK = String;

        const TABLE: &'static str = "orders";
        const PARTITION_KEY: &'static str = "customer";
        const SORT_KEY: Option<&'static str> = Some("order_id");

        fn partition_key(&self) -> Self::PK {
            self.customer.clone()
        }

        fn sort_key(&self) -> Option<Self::SK> {
            Some(self.order_id.clone())
        }
    }

    /// Serializes into a record whose key attribute is renamed away
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Misnamed {
        #[serde(rename = "id")]
        user_id: String,
    }

    impl DynamoTable for Misnamed {
        type PK = String;
        type SK = String;

        const TABLE: &'static str = "misnamed";
        const PARTITION_KEY: &'static str = "user_id";

        fn partition_key(&self) -> Self::PK {
            self.user_id.clone()
        }
    }

    /// Never serializes
    #[allow(dead_code)]
    #[derive(Debug, Clone, Deserialize)]
    struct Broken {
        id: String,
    }

    impl Serialize for Broken {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("unsupported value"))
        }
    }

    impl DynamoTable for Broken {
        type PK = String;
        type SK = String;

        const TABLE: &'static str = "broken";
        const PARTITION_KEY: &'static str = "id";

        fn partition_key(&self) -> Self::PK {
            self.id.clone()
        }
    }

    fn order(id: usize) -> Order {
        Order {
            customer: "c1".to_string(),
            order_id: format!("o{id}"),
            total: id as u64,
        }
    }

    #[test]
    fn test_write_batch_mixes_puts_and_deletes() {
        let ops = vec![
            WriteOp::Put(order(1)),
            WriteOp::delete("c1".to_string(), Some("o2".to_string())),
        ];

        let requests = build_write_batch(ops).unwrap();
        assert_eq!(requests.len(), 2);

        let put = requests[0].put_request.as_ref().unwrap();
        assert_eq!(put.item["total"], AttributeValue::N("1".into()));

        let delete = requests[1].delete_request.as_ref().unwrap();
        assert_eq!(delete.key.len(), 2);
        assert_eq!(delete.key["order_id"], AttributeValue::S("o2".into()));
    }

    #[test]
    fn test_write_batch_limit() {
        let ops: Vec<WriteOp<Order>> = (0..MAX_WRITE_ITEMS)
            .map(|i| WriteOp::Put(order(i)))
            .collect();
        assert!(build_write_batch(ops).is_ok());

        let ops: Vec<WriteOp<Order>> = (0..26).map(|i| WriteOp::Put(order(i))).collect();
        let err = build_write_batch(ops).unwrap_err();
        assert!(matches!(err, Error::InputTooLarge { limit: 25, actual: 26 }));
    }

    #[test]
    fn test_read_batch_limit() {
        let keys: Vec<CompositeKey<String, String>> = (0..101)
            .map(|i| ("c1".to_string(), Some(format!("o{i}"))))
            .collect();
        let err = build_read_batch::<Order>(keys).unwrap_err();
        assert!(matches!(err, Error::InputTooLarge { limit: 100, actual: 101 }));
    }

    #[test]
    fn test_encoding_failure_reports_index() {
        let ops = vec![WriteOp::Put(Broken { id: "a".into() })];
        let err = build_write_batch(ops).unwrap_err();
        assert!(matches!(
            err,
            Error::EncodingFailed {
                index: 0,
                source: EncodingError::Serde(_)
            }
        ));
        assert!(err.is_serialization_error());
    }

    #[test]
    fn test_record_without_key_attribute_is_rejected() {
        let ops = vec![WriteOp::Put(Misnamed {
            user_id: "u1".into(),
        })];
        let err = build_write_batch(ops).unwrap_err();
        assert!(matches!(
            err,
            Error::EncodingFailed {
                index: 0,
                source: EncodingError::Key(KeyError::MissingAttribute("user_id"))
            }
        ));
    }

    #[test]
    fn test_delete_without_required_sort_key_aborts_build() {
        let ops = vec![
            WriteOp::Put(order(1)),
            WriteOp::delete("c1".to_string(), None),
        ];
        let err = build_write_batch(ops).unwrap_err();
        assert!(matches!(err, Error::EncodingFailed { index: 1, .. }));
    }

    #[test]
    fn test_read_batch_preserves_order() {
        let keys = vec![
            ("c1".to_string(), Some("b".to_string())),
            ("c1".to_string(), Some("a".to_string())),
        ];
        let encoded = build_read_batch::<Order>(keys).unwrap();
        assert_eq!(encoded[0]["order_id"], AttributeValue::S("b".into()));
        assert_eq!(encoded[1]["order_id"], AttributeValue::S("a".into()));
    }
}
