/// Test helpers and fixtures for the batch engine tests
///
/// Provides the record fixtures, a scripted in-memory provider, and the
/// LocalStack setup used by the ignored integration tests.
pub mod fixtures;
pub mod provider;

pub use dynamo_batch::table::DynamoTable;
pub use serde::{Deserialize, Serialize};

// Re-export common fixtures
pub use fixtures::{Order, Sensor};
#[allow(unused_imports)]
pub use provider::{Call, CallKind, ScriptedProvider, Step};

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use tokio::sync::OnceCell;

/// Ensure DynamoDB client is initialized for tests
static TEST_INIT: OnceCell<()> = OnceCell::const_new();

/// Initialize DynamoDB client for tests (idempotent)
#[allow(dead_code)]
pub async fn init_test_client() {
    TEST_INIT
        .get_or_init(|| async {
            let _ = dynamo_batch::dynamodb_client().await;
        })
        .await;
}

/// Install a tracing subscriber honouring RUST_LOG (idempotent)
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Generate a unique test prefix for isolation
#[allow(dead_code)]
pub fn unique_test_prefix(name: &str) -> String {
    format!("{}_{}_", name, rusty_ulid::generate_ulid_string())
}

/// Create the table of `T` with string key attributes if it doesn't exist
#[allow(dead_code)]
pub async fn setup_table<T: DynamoTable>() {
    init_test_client().await;
    let client = T::dynamodb_client().await;

    if client
        .describe_table()
        .table_name(T::TABLE)
        .send()
        .await
        .is_ok()
    {
        return;
    }

    let mut request = client
        .create_table()
        .table_name(T::TABLE)
        .billing_mode(BillingMode::PayPerRequest);

    let keys = std::iter::once((T::PARTITION_KEY, KeyType::Hash))
        .chain(T::SORT_KEY.map(|name| (name, KeyType::Range)));
    for (name, key_type) in keys {
        request = request
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(name)
                    .key_type(key_type)
                    .build()
                    .unwrap(),
            );
    }

    let _ = request.send().await.unwrap();
}
