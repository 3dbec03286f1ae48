/// Scripted in-memory batch provider
///
/// Holds records in memory and answers each submission according to the next
/// scripted [`Step`], recording every call so tests can assert on exactly what
/// the engine sent.
use aws_sdk_dynamodb::operation::batch_get_item::BatchGetItemError;
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::types::error::{InternalServerError, ResourceNotFoundException};
use aws_sdk_dynamodb::types::{AttributeValue, WriteRequest};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::{Response, StatusCode};
use aws_smithy_types::body::SdkBody;
use dynamo_batch::table::{Item, Key, KeySchema};
use dynamo_batch::{
    BatchProvider, CancellationToken, ProviderError, ReadResponse, WriteResponse,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// How the provider answers one submission
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum Step {
    /// Apply every request
    ProcessAll,
    /// Leave the requests with these ids unprocessed, apply the rest
    Defer(Vec<&'static str>),
    /// Fail the round with a transient error
    Throttle,
    /// Fail the round with a permanent error
    Reject,
}

/// Kind of a recorded submission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Write,
    Read,
}

/// One recorded submission
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct Call {
    pub kind: CallKind,
    pub table: String,
    /// Ids of the submitted requests, in submission order
    pub ids: Vec<String>,
    pub consistent_read: bool,
}

#[derive(Debug)]
pub struct ScriptedProvider {
    schema: KeySchema,
    store: Mutex<HashMap<String, Item>>,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<Call>>,
    cancel_on: Mutex<Option<(usize, CancellationToken)>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema,
            store: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: Step::ProcessAll,
            calls: Mutex::new(Vec::new()),
            cancel_on: Mutex::new(None),
        }
    }

    /// Answer the next submissions with these steps, in order
    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script.lock().unwrap().extend(steps);
        self
    }

    /// Answer every submission past the script with `step`
    pub fn otherwise(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    /// Cancel `token` while answering the `call`-th submission (1-based)
    pub fn cancel_during(self, call: usize, token: CancellationToken) -> Self {
        *self.cancel_on.lock().unwrap() = Some((call, token));
        self
    }

    /// Seed a record
    pub fn insert(&self, item: Item) {
        let id = self.id_of(&item);
        let _ = self.store.lock().unwrap().insert(id, item);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.lock().unwrap().contains_key(id)
    }

    pub fn stored(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Id of a record or key: its partition value, then `#sort` if any
    pub fn id_of(&self, attributes: &HashMap<String, AttributeValue>) -> String {
        let mut id = scalar(&attributes[self.schema.partition_key]);
        if let Some(sort_key) = self.schema.sort_key {
            id.push('#');
            id.push_str(&scalar(&attributes[sort_key]));
        }
        id
    }

    fn write_id(&self, request: &WriteRequest) -> String {
        match (&request.put_request, &request.delete_request) {
            (Some(put), _) => self.id_of(&put.item),
            (None, Some(delete)) => self.id_of(&delete.key),
            (None, None) => String::new(),
        }
    }

    fn record(
        &self,
        kind: CallKind,
        table: &str,
        ids: Vec<String>,
        consistent_read: bool,
    ) -> Step {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call {
            kind,
            table: table.to_string(),
            ids,
            consistent_read,
        });

        if let Some((call, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *call == calls.len() {
                token.cancel();
            }
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl BatchProvider for ScriptedProvider {
    async fn submit_write(
        &self,
        table: &str,
        requests: Vec<WriteRequest>,
    ) -> Result<WriteResponse, ProviderError> {
        let ids: Vec<String> = requests.iter().map(|r| self.write_id(r)).collect();
        let deferred = match self.record(CallKind::Write, table, ids, false) {
            Step::ProcessAll => vec![],
            Step::Defer(ids) => ids,
            Step::Throttle => return Err(ProviderError::BatchWriteItem(throttled_write())),
            Step::Reject => return Err(ProviderError::BatchWriteItem(rejected_write())),
        };

        let mut response = WriteResponse::default();
        let mut store = self.store.lock().unwrap();
        for request in requests {
            let id = self.write_id(&request);
            if deferred.iter().any(|d| *d == id) {
                response.unprocessed.push(request);
                continue;
            }

            if let Some(put) = request.put_request {
                let _ = store.insert(id, put.item);
            } else if request.delete_request.is_some() {
                let _ = store.remove(&id);
            }
        }

        Ok(response)
    }

    async fn submit_read(
        &self,
        table: &str,
        keys: Vec<Key>,
        consistent_read: bool,
    ) -> Result<ReadResponse, ProviderError> {
        let ids: Vec<String> = keys.iter().map(|k| self.id_of(k)).collect();
        let deferred = match self.record(CallKind::Read, table, ids, consistent_read) {
            Step::ProcessAll => vec![],
            Step::Defer(ids) => ids,
            Step::Throttle => return Err(ProviderError::BatchGetItem(throttled_read())),
            Step::Reject => return Err(ProviderError::BatchGetItem(rejected_read())),
        };

        let mut response = ReadResponse::default();
        let store = self.store.lock().unwrap();
        for key in keys {
            let id = self.id_of(&key);
            if deferred.iter().any(|d| *d == id) {
                response.unprocessed.push(key);
            } else if let Some(item) = store.get(&id) {
                response.items.push(item.clone());
            }
        }

        // the real service makes no ordering promise either
        response.items.reverse();
        Ok(response)
    }
}

fn scalar(value: &AttributeValue) -> String {
    match value {
        AttributeValue::S(s) | AttributeValue::N(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

fn raw(status: u16) -> Response {
    Response::new(StatusCode::try_from(status).unwrap(), SdkBody::empty())
}

fn throttled_write() -> SdkError<BatchWriteItemError, Response> {
    let err = BatchWriteItemError::InternalServerError(
        InternalServerError::builder().message("try again").build(),
    );
    SdkError::service_error(err, raw(500))
}

fn rejected_write() -> SdkError<BatchWriteItemError, Response> {
    let err = BatchWriteItemError::ResourceNotFoundException(
        ResourceNotFoundException::builder()
            .message("table not found")
            .build(),
    );
    SdkError::service_error(err, raw(400))
}

fn throttled_read() -> SdkError<BatchGetItemError, Response> {
    let err = BatchGetItemError::InternalServerError(
        InternalServerError::builder().message("try again").build(),
    );
    SdkError::service_error(err, raw(500))
}

fn rejected_read() -> SdkError<BatchGetItemError, Response> {
    let err = BatchGetItemError::ResourceNotFoundException(
        ResourceNotFoundException::builder()
            .message("table not found")
            .build(),
    );
    SdkError::service_error(err, raw(400))
}
