//! Integration tests for the staged enqueue protocol and the vector-index
//! consumer.

mod support;

use calsync_core::{
    BlobStore, ConsumeReport, Delivery, EnqueueSettings, PartitionOffset, VectorIndexConsumer,
    VectorIndexEnqueuer,
};
use calsync_domain::{
    CalSyncError, ChangeMethod, EventResource, QueueMessage, StagedBatch, VectorChangeObject,
};
use support::index::{FakeEmbeddings, MemoryBlobStore, MemoryBroker, MemoryIndex};
use support::{cancelled, timed_event, CALENDAR, USER};

const TOPIC: &str = "calendar-vector-changes";
const GROUP: &str = "calendar-vector-index";

fn settings() -> EnqueueSettings {
    EnqueueSettings { topic: TOPIC.into(), group_id: GROUP.into() }
}

fn change(method: ChangeMethod, event: EventResource) -> VectorChangeObject {
    VectorChangeObject { method, event, calendar_id: CALENDAR.into() }
}

async fn stage(
    blobs: &MemoryBlobStore,
    key: &str,
    events: Vec<VectorChangeObject>,
) -> QueueMessage {
    let batch = StagedBatch { user_id: USER.into(), events };
    blobs.put(key, serde_json::to_vec(&batch).unwrap()).await.unwrap();
    QueueMessage { staged_batch_ref: key.into() }
}

#[tokio::test]
async fn empty_enqueue_touches_nothing() {
    let blobs = MemoryBlobStore::new();
    let broker = MemoryBroker::new();
    let enqueuer = VectorIndexEnqueuer::new(blobs.clone(), broker.clone(), settings());

    let staged = enqueuer.enqueue(USER, &[]).await.unwrap();

    assert_eq!(staged, None);
    assert_eq!(blobs.put_count(), 0);
    assert_eq!(broker.transaction_counts(), (0, 0, 0));
    assert!(broker.messages().is_empty());
}

#[tokio::test]
async fn enqueue_stages_then_publishes_a_reference_with_offsets() {
    let blobs = MemoryBlobStore::new();
    let broker = MemoryBroker::new();
    let offsets = vec![
        PartitionOffset { partition: 0, offset: 41 },
        PartitionOffset { partition: 1, offset: 7 },
    ];
    broker.set_offsets(GROUP, TOPIC, offsets.clone());
    let enqueuer = VectorIndexEnqueuer::new(blobs.clone(), broker.clone(), settings());
    let changes = vec![
        change(ChangeMethod::Upsert, timed_event("e1", "Planning")),
        change(ChangeMethod::Delete, cancelled("e2")),
    ];

    let key = enqueuer.enqueue(USER, &changes).await.unwrap().unwrap();

    assert!(key.starts_with(&format!("{USER}/")));
    assert!(key.ends_with(".json"));
    let staged: StagedBatch = serde_json::from_slice(&blobs.object(&key).unwrap()).unwrap();
    assert_eq!(staged.user_id, USER);
    assert_eq!(staged.events, changes);

    let messages = broker.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, TOPIC);
    assert_eq!(messages[0].key.as_deref(), Some(USER));
    let message: serde_json::Value = serde_json::from_slice(&messages[0].payload).unwrap();
    assert_eq!(message, serde_json::json!({ "fileKey": key }));

    assert_eq!(broker.committed_offset_sets(), vec![offsets]);
    assert_eq!(broker.transaction_counts(), (1, 1, 0));
}

#[tokio::test]
async fn failed_publish_aborts_and_removes_the_staged_blob() {
    let blobs = MemoryBlobStore::new();
    let broker = MemoryBroker::new();
    broker.fail_send();
    let enqueuer = VectorIndexEnqueuer::new(blobs.clone(), broker.clone(), settings());

    let err = enqueuer
        .enqueue(USER, &[change(ChangeMethod::Upsert, timed_event("e1", "a"))])
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::Broker(_)));
    assert_eq!(broker.transaction_counts(), (1, 0, 1));
    assert!(broker.messages().is_empty());
    assert_eq!(blobs.put_count(), 1);
    assert!(blobs.keys().is_empty());
}

#[tokio::test]
async fn failed_commit_leaves_no_message_or_blob() {
    let blobs = MemoryBlobStore::new();
    let broker = MemoryBroker::new();
    broker.fail_commit();
    let enqueuer = VectorIndexEnqueuer::new(blobs.clone(), broker.clone(), settings());

    let changes = [change(ChangeMethod::Upsert, timed_event("e1", "a"))];
    let result = enqueuer.enqueue(USER, &changes).await;

    assert!(result.is_err());
    assert!(broker.messages().is_empty());
    assert!(blobs.keys().is_empty());
}

#[tokio::test]
async fn consumer_indexes_upserts_and_removes_deletes() {
    let blobs = MemoryBlobStore::new();
    let embeddings = FakeEmbeddings::new();
    let index = MemoryIndex::new();
    let consumer = VectorIndexConsumer::new(blobs.clone(), embeddings.clone(), index.clone());

    let mut planning = timed_event("e1", "Planning");
    planning.description = Some("quarterly goals".into());
    let first =
        stage(&blobs, "user-1/a.json", vec![change(ChangeMethod::Upsert, planning)]).await;
    consumer.on_message(&first).await.unwrap();

    let records = index.records();
    let record = &records["e1#cal"];
    assert_eq!(record.user_id, USER);
    assert_eq!(record.raw_text, "Planning:quarterly goals");
    // May is BST in Europe/London
    assert_eq!(record.start_date, "2026-05-04T10:00:00+01:00");
    assert_eq!(record.end_date, "2026-05-04T11:00:00+01:00");
    assert_eq!(embeddings.texts(), vec!["Planning:quarterly goals".to_string()]);
    assert!(blobs.keys().is_empty(), "staged blob must be deleted once read");

    let second = stage(&blobs, "user-1/b.json", vec![change(ChangeMethod::Delete, cancelled("e1"))])
        .await;
    let report = consumer.on_message(&second).await.unwrap();

    assert_eq!(report, ConsumeReport { deleted: 1, upserted: 0, skipped: 0 });
    assert!(index.records().is_empty());
}

#[tokio::test]
async fn redelivered_batches_converge_to_the_same_index_state() {
    let blobs = MemoryBlobStore::new();
    let index = MemoryIndex::new();
    let consumer = VectorIndexConsumer::new(blobs.clone(), FakeEmbeddings::new(), index.clone());
    let events = vec![
        change(ChangeMethod::Upsert, timed_event("e1", "Planning")),
        change(ChangeMethod::Upsert, timed_event("e2", "Retro")),
        change(ChangeMethod::Delete, cancelled("e3")),
    ];

    let message = stage(&blobs, "user-1/a.json", events.clone()).await;
    consumer.on_message(&message).await.unwrap();
    let once = index.records();

    let message = stage(&blobs, "user-1/a.json", events).await;
    consumer.on_message(&message).await.unwrap();

    assert_eq!(index.records(), once);
    assert_eq!(once.len(), 2);
}

#[tokio::test]
async fn embedding_failure_is_returned_for_redelivery() {
    let blobs = MemoryBlobStore::new();
    let embeddings = FakeEmbeddings::new();
    embeddings.fail();
    let index = MemoryIndex::new();
    let consumer = VectorIndexConsumer::new(blobs.clone(), embeddings, index.clone());

    let message =
        stage(&blobs, "user-1/a.json", vec![change(ChangeMethod::Upsert, timed_event("e1", "a"))])
            .await;
    let err = consumer.on_message(&message).await.unwrap_err();

    assert!(matches!(err, CalSyncError::Embedding(_)));
    assert!(index.records().is_empty());
}

#[tokio::test]
async fn events_without_text_or_dates_are_skipped() {
    let blobs = MemoryBlobStore::new();
    let index = MemoryIndex::new();
    let consumer = VectorIndexConsumer::new(blobs.clone(), FakeEmbeddings::new(), index.clone());

    let untitled = timed_event("e1", "");
    let mut undated = timed_event("e2", "Offsite");
    undated.start.date_time = None;
    let message = stage(
        &blobs,
        "user-1/a.json",
        vec![
            change(ChangeMethod::Upsert, untitled),
            change(ChangeMethod::Upsert, undated),
            change(ChangeMethod::Upsert, timed_event("e3", "Sync")),
        ],
    )
    .await;

    let report = consumer.on_message(&message).await.unwrap();

    assert_eq!(report.skipped, 2);
    assert_eq!(report.upserted, 1);
    assert!(index.records().contains_key("e3#cal"));
}

#[tokio::test]
async fn missing_staged_batch_is_not_found() {
    let consumer =
        VectorIndexConsumer::new(MemoryBlobStore::new(), FakeEmbeddings::new(), MemoryIndex::new());

    let err = consumer
        .on_message(&QueueMessage { staged_batch_ref: "user-1/gone.json".into() })
        .await
        .unwrap_err();

    assert!(matches!(err, CalSyncError::NotFound(_)));
}

#[tokio::test]
async fn deliveries_decode_the_file_key() {
    let blobs = MemoryBlobStore::new();
    let index = MemoryIndex::new();
    let consumer = VectorIndexConsumer::new(blobs.clone(), FakeEmbeddings::new(), index.clone());
    stage(&blobs, "user-1/a.json", vec![change(ChangeMethod::Upsert, timed_event("e1", "a"))])
        .await;

    let delivery = Delivery {
        topic: TOPIC.into(),
        partition: 0,
        offset: 3,
        key: Some(USER.into()),
        payload: br#"{"fileKey":"user-1/a.json"}"#.to_vec(),
    };
    consumer.on_delivery(&delivery).await.unwrap();
    assert_eq!(index.records().len(), 1);

    let garbage = Delivery { payload: b"not json".to_vec(), ..delivery };
    assert!(matches!(
        consumer.on_delivery(&garbage).await.unwrap_err(),
        CalSyncError::Serialization(_)
    ));
}
