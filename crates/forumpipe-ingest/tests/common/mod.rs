//! In-memory fakes for the external capabilities
//!
//! Each fake records what it was asked to do so tests can assert on the
//! traffic a batch produced without any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use forumpipe_ingest::config::Config;
use forumpipe_ingest::context::{Capabilities, PipelineContext};
use forumpipe_ingest::error::{FetchError, QueueError, StoreError};
use forumpipe_ingest::metrics::{Metrics, MetricsBackend};
use forumpipe_ingest::queue::MessageQueue;
use forumpipe_ingest::source::{ForumSource, RawItem};
use forumpipe_ingest::storage::{calculate_sha256, ObjectStore, UploadResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type FetchScript = Vec<Result<Vec<RawItem>, FetchError>>;

/// Forum source answering from a per-collection script
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Result<Vec<RawItem>, FetchError>>>>,
    panics_on: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, collection: &str, responses: FetchScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(collection.to_string(), responses.into());
        self
    }

    /// Panic instead of answering for `collection`
    pub fn panic_on(self, collection: &str) -> Self {
        self.panics_on.lock().unwrap().push(collection.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, collection: &str) -> usize {
        self.calls().iter().filter(|(c, _)| c == collection).count()
    }
}

#[async_trait]
impl ForumSource for ScriptedSource {
    async fn fetch_top(&self, collection: &str, limit: u32) -> Result<Vec<RawItem>, FetchError> {
        self.calls.lock().unwrap().push((collection.to_string(), limit));
        if self.panics_on.lock().unwrap().iter().any(|c| c == collection) {
            panic!("forum client bug while fetching r/{}", collection);
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(collection)
            .and_then(|script| script.pop_front())
            .unwrap_or_else(|| Err(FetchError::NotFound(collection.to_string())))
    }
}

/// Queue that records every payload and can be told to fail
#[derive(Default)]
pub struct RecordingQueue {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
    closes: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let queue = Self::default();
        queue.failing.store(true, Ordering::SeqCst);
        Arc::new(queue)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Attempted sends, including failed ones
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_records(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<String, QueueError> {
        self.sent.lock().unwrap().push((topic.to_string(), payload));
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Transport("connection refused".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg-{}", id))
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Object store backed by a map, keyed by `bucket/key`
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    failing: AtomicBool,
    stalled: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    /// A store whose writes never complete
    pub fn stalled() -> Arc<Self> {
        let store = Self::default();
        store.stalled.store(true, Ordering::SeqCst);
        Arc::new(store)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn write(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadResult, StoreError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("bucket unavailable".to_string()));
        }
        let result = UploadResult {
            key: key.to_string(),
            checksum: calculate_sha256(&bytes),
            size: bytes.len() as i64,
        };
        self.objects.lock().unwrap().insert(
            format!("{}/{}", bucket, key),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(result)
    }
}

/// Metrics backend that keeps running totals
#[derive(Default)]
pub struct RecordingMetrics {
    counters: Mutex<HashMap<String, u64>>,
    latencies: Mutex<Vec<(String, f64)>>,
}

impl RecordingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handle(self: &Arc<Self>) -> Metrics {
        Metrics::new(Arc::clone(self) as Arc<dyn MetricsBackend>)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn latency_count(&self, name: &str) -> usize {
        self.latencies
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .count()
    }
}

impl MetricsBackend for RecordingMetrics {
    fn record_counter(&self, name: &str, value: u64) -> anyhow::Result<()> {
        *self.counters.lock().unwrap().entry(name.to_string()).or_default() += value;
        Ok(())
    }

    fn record_latency(&self, name: &str, millis: f64) -> anyhow::Result<()> {
        self.latencies.lock().unwrap().push((name.to_string(), millis));
        Ok(())
    }
}

pub fn raw_item(id: &str, author: Option<&str>, subreddit: &str) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        title: Some(format!("Post {}", id)),
        score: 42,
        num_comments: 3,
        author: author.map(str::to_string),
        created_utc: Some(1_700_000_000.0),
        url: Some(format!("https://example.com/{}", id)),
        selftext: Some(String::new()),
        subreddit: Some(subreddit.to_string()),
    }
}

pub const TOPIC: &str = "reddit-posts";
pub const DEAD_LETTER_TOPIC: &str = "reddit-posts-dlq";
pub const BUCKET: &str = "reddit-raw";

/// Configuration with every required option set, plus `extra` overrides
pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("PROJECT_ID", "acme-data"),
        ("PUBSUB_TOPIC", TOPIC),
        ("ARCHIVE_BUCKET", BUCKET),
        ("SUBREDDITS", "dataengineering;rust"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(move |key| vars.get(key).cloned()).unwrap()
}

/// The fakes behind one test pipeline, kept for assertions
pub struct Harness {
    pub source: Arc<ScriptedSource>,
    pub queue: Arc<RecordingQueue>,
    pub dead_letter: Arc<RecordingQueue>,
    pub store: Arc<MemoryStore>,
    pub metrics: Arc<RecordingMetrics>,
}

impl Harness {
    pub fn new(source: ScriptedSource) -> Self {
        Self {
            source: Arc::new(source),
            queue: RecordingQueue::new(),
            dead_letter: RecordingQueue::new(),
            store: MemoryStore::new(),
            metrics: RecordingMetrics::new(),
        }
    }

    pub fn pipeline(&self, config: &Config) -> PipelineContext {
        PipelineContext::from_parts(
            config,
            Capabilities {
                source: self.source.clone(),
                queue: self.queue.clone(),
                dead_letter_queue: Some(self.dead_letter.clone() as Arc<dyn MessageQueue>),
                store: self.store.clone(),
            },
            self.metrics.handle(),
        )
    }
}
