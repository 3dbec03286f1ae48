/// Common test fixtures and data structures
///
/// Reusable record types implementing DynamoTable for the engine tests and the
/// LocalStack tests.

use super::{Deserialize, DynamoTable, Serialize};
use dynamo_batch::BackoffConfig;
use dynamo_batch::table::{CompositeKey, Item, SortKey};
use std::time::Duration;

/// Record of a table with a partition key only
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Sensor {
    pub sensor_id: String,
    pub reading: u32,
}

impl DynamoTable for Sensor {
    type PK = String;
    type SK = String;
    const TABLE: &'static str = "tests_batch_sensors";
    const PARTITION_KEY: &'static str = "sensor_id";

    fn partition_key(&self) -> String {
        self.sensor_id.clone()
    }
}

#[allow(dead_code)]
impl Sensor {
    pub fn new(id: impl Into<String>, reading: u32) -> Self {
        Self {
            sensor_id: id.into(),
            reading,
        }
    }

    pub fn key(id: &str) -> CompositeKey<String, String> {
        (id.to_string(), None)
    }

    pub fn item(&self) -> Item {
        serde_dynamo::to_item(self).unwrap()
    }
}

/// Record of a table with a composite key, read consistently
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Order {
    pub customer: String,
    pub order_id: String,
    pub total: u64,
}

impl DynamoTable for Order {
    type PK = String;
    type SK = String;
    const TABLE: &'static str = "tests_batch_orders";
    const PARTITION_KEY: &'static str = "customer";
    const SORT_KEY: Option<&'static str> = Some("order_id");
    const CONSISTENT_READ: bool = true;
    const BACKOFF: BackoffConfig =
        BackoffConfig::new(Duration::from_millis(20), Duration::from_secs(10));

    fn partition_key(&self) -> String {
        self.customer.clone()
    }

    fn sort_key(&self) -> SortKey<String> {
        Some(self.order_id.clone())
    }
}

#[allow(dead_code)]
impl Order {
    pub fn new(customer: &str, order_id: &str, total: u64) -> Self {
        Self {
            customer: customer.to_string(),
            order_id: order_id.to_string(),
            total,
        }
    }
}
