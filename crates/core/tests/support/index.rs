//! In-memory blob store, transactional broker, embeddings, and vector index

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use calsync_core::{
    BlobStore, BrokerTransaction, EmbeddingService, MessageBroker, PartitionOffset, VectorIndex,
};
use calsync_domain::{CalSyncError, IndexRecord, Result, SearchHit, VectorQuery};

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.object(key).ok_or_else(|| CalSyncError::NotFound(format!("blob {key}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct BrokerState {
    messages: Vec<PublishedMessage>,
    /// `(group, topic)` to committed offsets.
    offsets: HashMap<(String, String), Vec<PartitionOffset>>,
    /// Offsets committed by each transaction, in commit order.
    committed_offset_sets: Vec<Vec<PartitionOffset>>,
    begun: usize,
    committed: usize,
    aborted: usize,
}

/// Broker whose writes become visible only on commit.
#[derive(Default, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    fail_send: Arc<AtomicBool>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offsets(&self, group: &str, topic: &str, offsets: Vec<PartitionOffset>) {
        self.state
            .lock()
            .unwrap()
            .offsets
            .insert((group.to_string(), topic.to_string()), offsets);
    }

    pub fn fail_send(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    pub fn fail_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn committed_offset_sets(&self) -> Vec<Vec<PartitionOffset>> {
        self.state.lock().unwrap().committed_offset_sets.clone()
    }

    /// `(begun, committed, aborted)` transaction counts.
    pub fn transaction_counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock().unwrap();
        (state.begun, state.committed, state.aborted)
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn committed_offsets(&self, group_id: &str, topic: &str) -> Result<Vec<PartitionOffset>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .offsets
            .get(&(group_id.to_string(), topic.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn BrokerTransaction>> {
        self.state.lock().unwrap().begun += 1;
        Ok(Box::new(MemoryTransaction {
            broker: self.clone(),
            messages: Vec::new(),
            offsets: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    broker: MemoryBroker,
    messages: Vec<PublishedMessage>,
    offsets: Vec<PartitionOffset>,
}

#[async_trait]
impl BrokerTransaction for MemoryTransaction {
    async fn send(&mut self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()> {
        if self.broker.fail_send.load(Ordering::SeqCst) {
            return Err(CalSyncError::Broker("send rejected".into()));
        }
        self.messages.push(PublishedMessage {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload,
        });
        Ok(())
    }

    async fn send_offsets(
        &mut self,
        _group_id: &str,
        _topic: &str,
        offsets: &[PartitionOffset],
    ) -> Result<()> {
        self.offsets.extend_from_slice(offsets);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { broker, messages, offsets } = *self;
        if broker.fail_commit.load(Ordering::SeqCst) {
            return Err(CalSyncError::Broker("commit fenced".into()));
        }
        let mut state = broker.state.lock().unwrap();
        state.messages.extend(messages);
        state.committed_offset_sets.push(offsets);
        state.committed += 1;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.broker.state.lock().unwrap().aborted += 1;
        Ok(())
    }
}

/// Deterministic embeddings: `[char count, word count]`.
#[derive(Default)]
pub struct FakeEmbeddings {
    texts: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeEmbeddings {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CalSyncError::Embedding("model overloaded".into()));
        }
        self.texts.lock().unwrap().push(text.to_string());
        Ok(vec![text.chars().count() as f32, text.split_whitespace().count() as f32])
    }
}

#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<BTreeMap<String, IndexRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> BTreeMap<String, IndexRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<()> {
        let mut stored = self.records.lock().unwrap();
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.records.lock().unwrap();
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<SearchHit>> {
        let stored = self.records.lock().unwrap();
        Ok(stored
            .values()
            .filter(|record| record.user_id == query.user_id)
            .take(query.limit)
            .map(|record| SearchHit {
                id: record.id.clone(),
                score: 1.0,
                start_date: Some(record.start_date.clone()),
                end_date: Some(record.end_date.clone()),
            })
            .collect())
    }
}
