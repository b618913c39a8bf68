//! SQLite-backed transactional topic broker.
//!
//! Each topic is split into a fixed number of partitions. Messages are routed
//! by key hash and numbered by a per-partition offset. Consumer groups track
//! the next offset to read per partition in `broker_offsets`.
//!
//! A [`SqliteBrokerTransaction`] buffers sends and offset updates in memory
//! and writes them in a single `BEGIN IMMEDIATE` transaction on commit, so a
//! published message and the offsets committed with it appear together or not
//! at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use calsync_core::{BrokerTransaction, Delivery, MessageBroker, MessageConsumer, PartitionOffset};
use calsync_domain::{CalSyncError, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::task;
use tracing::{debug, instrument};

use crate::database::sql::{map_sql_error, now_timestamp};
use crate::database::DbManager;
use crate::errors::map_join_error;

/// Producer-side broker handle.
#[derive(Clone)]
pub struct SqliteBroker {
    db: Arc<DbManager>,
    partitions: u32,
}

impl SqliteBroker {
    pub fn new(db: Arc<DbManager>, partitions: u32) -> Self {
        Self { db, partitions: partitions.max(1) }
    }

    pub const fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Partition a key routes to. Keyless messages go to partition 0.
    pub fn partition_for(&self, key: Option<&str>) -> u32 {
        key.map_or(0, |key| fnv1a(key.as_bytes()) % self.partitions)
    }

    /// Consumer for `group_id` reading every partition of `topic`.
    pub fn consumer(
        &self,
        group_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> SqliteTopicConsumer {
        SqliteTopicConsumer {
            db: Arc::clone(&self.db),
            group_id: group_id.into(),
            topic: topic.into(),
            partitions: (0..self.partitions).collect(),
            next_partition: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MessageBroker for SqliteBroker {
    async fn committed_offsets(&self, group_id: &str, topic: &str) -> Result<Vec<PartitionOffset>> {
        let db = Arc::clone(&self.db);
        let group_id = group_id.to_string();
        let topic = topic.to_string();

        task::spawn_blocking(move || -> Result<Vec<PartitionOffset>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT partition_id, committed_offset FROM broker_offsets
                     WHERE group_id = ?1 AND topic = ?2 ORDER BY partition_id",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![group_id, topic], |row| {
                    Ok(PartitionOffset { partition: row.get(0)?, offset: row.get(1)? })
                })
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn begin_transaction(&self) -> Result<Box<dyn BrokerTransaction>> {
        Ok(Box::new(SqliteBrokerTransaction {
            broker: self.clone(),
            messages: Vec::new(),
            offsets: Vec::new(),
        }))
    }
}

struct PendingMessage {
    topic: String,
    partition: u32,
    key: Option<String>,
    payload: Vec<u8>,
}

struct PendingOffsets {
    group_id: String,
    topic: String,
    offsets: Vec<PartitionOffset>,
}

pub struct SqliteBrokerTransaction {
    broker: SqliteBroker,
    messages: Vec<PendingMessage>,
    offsets: Vec<PendingOffsets>,
}

impl SqliteBrokerTransaction {
    fn write(
        conn: &mut Connection,
        messages: &[PendingMessage],
        offsets: &[PendingOffsets],
    ) -> Result<()> {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let created_at = now_timestamp();

        for message in messages {
            let next_offset: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(message_offset) + 1, 0) FROM broker_messages
                     WHERE topic = ?1 AND partition_id = ?2",
                    params![message.topic, message.partition],
                    |row| row.get(0),
                )
                .map_err(map_sql_error)?;
            tx.execute(
                "INSERT INTO broker_messages
                    (topic, partition_id, message_offset, message_key, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.topic,
                    message.partition,
                    next_offset,
                    message.key,
                    message.payload,
                    created_at
                ],
            )
            .map_err(map_sql_error)?;
        }

        for pending in offsets {
            for offset in &pending.offsets {
                commit_offset(
                    &tx,
                    &pending.group_id,
                    &pending.topic,
                    offset.partition,
                    offset.offset,
                )?;
            }
        }

        tx.commit().map_err(map_sql_error)
    }
}

#[async_trait]
impl BrokerTransaction for SqliteBrokerTransaction {
    async fn send(&mut self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()> {
        if topic.trim().is_empty() {
            return Err(CalSyncError::Broker("topic must not be empty".into()));
        }
        self.messages.push(PendingMessage {
            topic: topic.to_string(),
            partition: self.broker.partition_for(key),
            key: key.map(str::to_string),
            payload,
        });
        Ok(())
    }

    async fn send_offsets(
        &mut self,
        group_id: &str,
        topic: &str,
        offsets: &[PartitionOffset],
    ) -> Result<()> {
        self.offsets.push(PendingOffsets {
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            offsets: offsets.to_vec(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { broker, messages, offsets } = *self;
        let db = Arc::clone(&broker.db);

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            Self::write(&mut conn, &messages, &offsets)?;
            debug!(messages = messages.len(), "broker transaction committed");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        debug!(discarded = self.messages.len(), "broker transaction aborted");
        Ok(())
    }
}

/// One consumer group reading one topic, a message at a time.
pub struct SqliteTopicConsumer {
    db: Arc<DbManager>,
    group_id: String,
    topic: String,
    partitions: Vec<u32>,
    next_partition: AtomicUsize,
}

impl SqliteTopicConsumer {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages at or past the group's committed offsets.
    pub async fn pending_count(&self) -> Result<i64> {
        let db = Arc::clone(&self.db);
        let group_id = self.group_id.clone();
        let topic = self.topic.clone();

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT COUNT(*) FROM broker_messages m
                 WHERE m.topic = ?1 AND m.message_offset >= COALESCE(
                    (SELECT committed_offset FROM broker_offsets o
                     WHERE o.group_id = ?2 AND o.topic = m.topic
                       AND o.partition_id = m.partition_id), 0)",
                params![topic, group_id],
                |row| row.get(0),
            )
            .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl MessageConsumer for SqliteTopicConsumer {
    async fn poll(&self) -> Result<Option<Delivery>> {
        let db = Arc::clone(&self.db);
        let group_id = self.group_id.clone();
        let topic = self.topic.clone();
        let partitions = self.partitions.clone();
        let start = self.next_partition.load(Ordering::Relaxed);

        let found = task::spawn_blocking(move || -> Result<Option<(usize, Delivery)>> {
            let conn = db.get_connection()?;
            for step in 0..partitions.len() {
                let index = (start + step) % partitions.len();
                let partition = partitions[index];
                let next = conn
                    .query_row(
                        "SELECT message_offset, message_key, payload FROM broker_messages
                         WHERE topic = ?1 AND partition_id = ?2 AND message_offset >= COALESCE(
                            (SELECT committed_offset FROM broker_offsets
                             WHERE group_id = ?3 AND topic = ?1 AND partition_id = ?2), 0)
                         ORDER BY message_offset LIMIT 1",
                        params![topic, partition, group_id],
                        |row| {
                            Ok(Delivery {
                                topic: topic.clone(),
                                partition,
                                offset: row.get(0)?,
                                key: row.get(1)?,
                                payload: row.get(2)?,
                            })
                        },
                    )
                    .optional()
                    .map_err(map_sql_error)?;
                if let Some(delivery) = next {
                    return Ok(Some((index, delivery)));
                }
            }
            Ok(None)
        })
        .await
        .map_err(map_join_error)??;

        Ok(found.map(|(index, delivery)| {
            let next = (index + 1) % self.partitions.len().max(1);
            self.next_partition.store(next, Ordering::Relaxed);
            delivery
        }))
    }

    #[instrument(
        skip(self, delivery),
        fields(partition = delivery.partition, offset = delivery.offset)
    )]
    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let db = Arc::clone(&self.db);
        let group_id = self.group_id.clone();
        let topic = delivery.topic.clone();
        let partition = delivery.partition;
        let next = delivery.offset + 1;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            commit_offset(&conn, &group_id, &topic, partition, next)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Offsets only move forward; a stale commit never rewinds the group.
fn commit_offset(
    conn: &Connection,
    group_id: &str,
    topic: &str,
    partition: u32,
    offset: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO broker_offsets (group_id, topic, partition_id, committed_offset)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(group_id, topic, partition_id)
         DO UPDATE SET committed_offset = MAX(committed_offset, excluded.committed_offset)",
        params![group_id, topic, partition, offset],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

/// 32-bit FNV-1a; stable across builds so keys keep their partition.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0x811c_9dc5_u32, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(0x0100_0193))
}
