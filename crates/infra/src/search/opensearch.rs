//! OpenSearch implementation of the vector index port
//!
//! Writes go through the `_bulk` API as NDJSON. Documents carry the owning
//! user, the event window, the embedded text, and the vector under
//! [`EVENT_VECTOR_FIELD`]. Searches are `script_score` k-NN queries filtered
//! by user and start date and cut off at [`MIN_KNN_SCORE`].

use async_trait::async_trait;
use calsync_core::VectorIndex;
use calsync_domain::constants::{EVENT_VECTOR_FIELD, MIN_KNN_SCORE};
use calsync_domain::{CalSyncError, IndexConfig, IndexRecord, Result, SearchHit, VectorQuery};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::http::HttpClient;

pub struct OpenSearchIndex {
    http: HttpClient,
    endpoint: String,
    index_name: String,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Option<HitSource>,
}

#[derive(Debug, Default, Deserialize)]
struct HitSource {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl OpenSearchIndex {
    pub fn new(http: HttpClient, config: &IndexConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            credentials: config
                .username
                .clone()
                .filter(|username| !username.is_empty())
                .map(|username| (username, config.password.clone())),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}/{path}", self.endpoint));
        match &self.credentials {
            Some((username, password)) => builder.basic_auth(username, password.as_deref()),
            None => builder,
        }
    }

    async fn bulk(&self, body: String, tolerate_missing: bool) -> Result<()> {
        let builder = self
            .request(Method::POST, "_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        let response: BulkResponse = self.http.send_json(builder).await.map_err(index_error)?;
        if !response.errors {
            return Ok(());
        }

        let failures: Vec<String> = response
            .items
            .into_iter()
            .filter_map(|mut item| {
                let (_, value) = item.iter_mut().next()?;
                serde_json::from_value::<BulkItem>(value.take()).ok()
            })
            .filter(|item| item.error.is_some() || item.status >= 300)
            .filter(|item| !(tolerate_missing && item.status == StatusCode::NOT_FOUND.as_u16()))
            .map(|item| match item.error {
                Some(error) => format!("{} ({}): {error}", item.id, item.status),
                None => format!("{} ({})", item.id, item.status),
            })
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        warn!(failed = failures.len(), "bulk request had item failures");
        Err(CalSyncError::Index(format!("bulk items failed: {}", failures.join("; "))))
    }
}

#[async_trait]
impl VectorIndex for OpenSearchIndex {
    #[instrument(skip(self, records), fields(index = %self.index_name, count = records.len()))]
    async fn bulk_upsert(&self, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for record in records {
            let action = json!({"index": {"_index": self.index_name, "_id": record.id}});
            let mut document = json!({
                "userId": record.user_id,
                "start_date": record.start_date,
                "end_date": record.end_date,
                "raw_text": record.raw_text,
            });
            document[EVENT_VECTOR_FIELD] = json!(record.vector);
            push_line(&mut body, &action);
            push_line(&mut body, &document);
        }
        self.bulk(body, false).await?;
        debug!("documents indexed");
        Ok(())
    }

    /// Deleting an id the index never saw counts as success.
    #[instrument(skip(self, ids), fields(index = %self.index_name, count = ids.len()))]
    async fn bulk_delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for id in ids {
            push_line(&mut body, &json!({"delete": {"_index": self.index_name, "_id": id}}));
        }
        self.bulk(body, true).await?;
        debug!("documents deleted");
        Ok(())
    }

    #[instrument(skip(self, query), fields(index = %self.index_name, user_id = %query.user_id))]
    async fn search(&self, query: &VectorQuery) -> Result<Vec<SearchHit>> {
        let mut filters = vec![json!({"term": {"userId": query.user_id}})];
        if query.start_after.is_some() || query.start_before.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(after) = &query.start_after {
                range.insert("gte".into(), json!(after));
            }
            if let Some(before) = &query.start_before {
                range.insert("lte".into(), json!(before));
            }
            filters.push(json!({"range": {"start_date": range}}));
        }

        let body = json!({
            "size": query.limit,
            "query": {
                "script_score": {
                    "query": {"bool": {"filter": filters}},
                    "script": {
                        "lang": "knn",
                        "source": "knn_score",
                        "params": {
                            "field": EVENT_VECTOR_FIELD,
                            "query_value": query.vector,
                            "space_type": "cosinesimil"
                        }
                    }
                }
            },
            "min_score": MIN_KNN_SCORE
        });

        let path = format!("{}/_search", self.index_name);
        let builder = self.request(Method::POST, &path).json(&body);
        let response: SearchResponse = self.http.send_json(builder).await.map_err(index_error)?;

        Ok(response
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let source = hit.source.unwrap_or_default();
                SearchHit {
                    id: hit.id,
                    score: hit.score.unwrap_or_default(),
                    start_date: source.start_date,
                    end_date: source.end_date,
                }
            })
            .collect())
    }
}

fn push_line(body: &mut String, value: &Value) {
    body.push_str(&value.to_string());
    body.push('\n');
}

fn index_error(err: CalSyncError) -> CalSyncError {
    match err {
        CalSyncError::Index(_) => err,
        other => CalSyncError::Index(format!("{} ({})", other, other.label())),
    }
}
