//! Firestore REST backend for the document store seam.
//!
//! Reads go through `:runQuery` and plain document GETs; the popularity
//! counter uses a `:commit` write with an `increment` field transform so
//! the adjustment is atomic on the server. Watches are realized by polling
//! at a configurable cadence and emitting only when the snapshot changed.

use reqwest::StatusCode;
use serde_json::{json, Value};
use url::Url;

use async_trait::async_trait;

use super::{
  CollectionQuery, CollectionWatch, Direction, Document, DocumentStore, DocumentWatch, StoreError,
};
use crate::config::Config;

/// Client for one Firestore project.
#[derive(Clone)]
pub struct FirestoreStore {
  http: reqwest::Client,
  /// Resource root, `projects/{p}/databases/(default)/documents`.
  root: String,
  /// REST endpoint for the resource root.
  base: String,
  api_key: String,
  poll_interval: std::time::Duration,
}

impl FirestoreStore {
  /// Build a client from configuration. The API key is read from the
  /// environment, never from the config file.
  pub fn new(config: &Config) -> Result<Self, StoreError> {
    let api_key = Config::api_key().map_err(|e| StoreError::Credentials(e.to_string()))?;

    let http = reqwest::Client::builder().build()?;

    let root = format!(
      "projects/{}/databases/(default)/documents",
      config.firestore.project_id
    );

    Ok(Self {
      http,
      base: format!("https://firestore.googleapis.com/v1/{}", root),
      root,
      api_key,
      poll_interval: std::time::Duration::from_secs(config.store.poll_interval_secs),
    })
  }

  fn url(&self, path: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(&format!("{}{}", self.base, path))?;
    url.query_pairs_mut().append_pair("key", &self.api_key);
    Ok(url)
  }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
  if resp.status().is_success() {
    return Ok(resp);
  }
  let status = resp.status().as_u16();
  let body = resp.text().await.unwrap_or_default();
  Err(StoreError::Status { status, body })
}

/// Decode a Firestore typed value into plain JSON.
fn decode_value(v: &Value) -> Value {
  let Some(obj) = v.as_object() else {
    return Value::Null;
  };

  if let Some(s) = obj.get("stringValue") {
    return s.clone();
  }
  if let Some(s) = obj.get("timestampValue") {
    return s.clone();
  }
  if let Some(raw) = obj.get("integerValue") {
    // Sent as a decimal string, but tolerate a bare number.
    if let Some(n) = raw.as_str().and_then(|s| s.parse::<i64>().ok()).or(raw.as_i64()) {
      return Value::from(n);
    }
  }
  if let Some(n) = obj.get("doubleValue") {
    return n.clone();
  }
  if let Some(b) = obj.get("booleanValue") {
    return b.clone();
  }
  if obj.contains_key("nullValue") {
    return Value::Null;
  }
  if let Some(fields) = obj
    .get("mapValue")
    .and_then(|m| m.get("fields"))
    .and_then(Value::as_object)
  {
    return Value::Object(
      fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect(),
    );
  }
  if let Some(values) = obj
    .get("arrayValue")
    .and_then(|a| a.get("values"))
    .and_then(Value::as_array)
  {
    return Value::Array(values.iter().map(decode_value).collect());
  }

  Value::Null
}

/// Encode plain JSON as a Firestore typed value.
fn encode_value(v: &Value) -> Value {
  match v {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) if n.is_i64() => json!({ "integerValue": n.to_string() }),
    Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => json!({
      "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
    }),
    Value::Object(map) => json!({
      "mapValue": {
        "fields": map
          .iter()
          .map(|(k, v)| (k.clone(), encode_value(v)))
          .collect::<serde_json::Map<_, _>>()
      }
    }),
  }
}

/// Flatten a Firestore document resource into id + plain fields.
fn decode_document(raw: &Value) -> Document {
  let name = raw.get("name").and_then(Value::as_str).unwrap_or_default();
  let id = name.rsplit('/').next().unwrap_or_default().to_string();

  let fields = raw
    .get("fields")
    .and_then(Value::as_object)
    .map(|m| {
      m.iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect::<serde_json::Map<_, _>>()
    })
    .unwrap_or_default();

  Document {
    id,
    fields: Value::Object(fields),
  }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
  async fn query(&self, collection: &str, query: CollectionQuery) -> Result<Vec<Document>, StoreError> {
    let mut structured = json!({ "from": [{ "collectionId": collection }] });

    if let Some((field, value)) = &query.filter {
      structured["where"] = json!({
        "fieldFilter": {
          "field": { "fieldPath": field },
          "op": "EQUAL",
          "value": encode_value(value)
        }
      });
    }
    if let Some(order) = &query.order_by {
      let direction = match order.direction {
        Direction::Ascending => "ASCENDING",
        Direction::Descending => "DESCENDING",
      };
      structured["orderBy"] = json!([{
        "field": { "fieldPath": order.field },
        "direction": direction
      }]);
    }
    if let Some(limit) = query.limit {
      structured["limit"] = json!(limit);
    }

    let url = self.url(":runQuery")?;
    let resp = self
      .http
      .post(url)
      .json(&json!({ "structuredQuery": structured }))
      .send()
      .await?;
    let resp = check_status(resp).await?;

    // Each row wraps an optional document; rows carrying only a read time
    // are skipped.
    let rows: Vec<Value> = resp.json().await?;
    let docs = rows
      .iter()
      .filter_map(|row| row.get("document"))
      .map(decode_document)
      .collect();

    Ok(docs)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
    let url = self.url(&format!("/{}/{}", collection, id))?;
    let resp = self.http.get(url).send().await?;

    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let resp = check_status(resp).await?;
    let raw: Value = resp.json().await?;
    Ok(Some(decode_document(&raw)))
  }

  async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<(), StoreError> {
    let body = json!({
      "writes": [{
        "transform": {
          "document": format!("{}/{}/{}", self.root, collection, id),
          "fieldTransforms": [{
            "fieldPath": field,
            "increment": { "integerValue": delta.to_string() }
          }]
        }
      }]
    });

    let url = self.url(":commit")?;
    let resp = self.http.post(url).json(&body).send().await?;
    check_status(resp).await?;
    Ok(())
  }

  fn watch_document(&self, collection: &str, id: &str) -> DocumentWatch {
    struct State {
      store: FirestoreStore,
      collection: String,
      id: String,
      last: Option<Option<Document>>,
      primed: bool,
    }

    let state = State {
      store: self.clone(),
      collection: collection.to_string(),
      id: id.to_string(),
      last: None,
      primed: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
      loop {
        if st.primed {
          tokio::time::sleep(st.store.poll_interval).await;
        } else {
          st.primed = true;
        }

        match st.store.get(&st.collection, &st.id).await {
          Ok(current) => {
            if st.last.as_ref() != Some(&current) {
              st.last = Some(current.clone());
              return Some((Ok(current), st));
            }
          }
          Err(e) => return Some((Err(e), st)),
        }
      }
    }))
  }

  fn watch_collection(&self, collection: &str) -> CollectionWatch {
    struct State {
      store: FirestoreStore,
      collection: String,
      last: Option<Vec<Document>>,
      primed: bool,
    }

    let state = State {
      store: self.clone(),
      collection: collection.to_string(),
      last: None,
      primed: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
      loop {
        if st.primed {
          tokio::time::sleep(st.store.poll_interval).await;
        } else {
          st.primed = true;
        }

        match st.store.query(&st.collection, CollectionQuery::new()).await {
          Ok(current) => {
            if st.last.as_ref() != Some(&current) {
              st.last = Some(current.clone());
              return Some((Ok(current), st));
            }
          }
          Err(e) => return Some((Err(e), st)),
        }
      }
    }))
  }
}
