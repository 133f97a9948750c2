//! Firestore REST binding.
//!
//! One document per customer in a single collection, document id = customer
//! id. Reads use an unordered `runQuery`; writes and deletes go through `commit`, which
//! applies all of its writes atomically.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use customer_atlas_core::{Customer, CustomerId, SyncStatus};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::FirestoreConfig;

use super::CloudStore;
use super::error::CloudError;

const MAX_LOG_BODY_CHARS: usize = 512;

/// A single typed Firestore value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum FieldValue {
    StringValue(String),
    DoubleValue(f64),
    /// Firestore sends 64-bit integers as decimal strings.
    IntegerValue(String),
    TimestampValue(DateTime<Utc>),
}

impl FieldValue {
    fn as_string(&self) -> Option<String> {
        match self {
            Self::StringValue(s) | Self::IntegerValue(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::DoubleValue(v) => Some(*v),
            Self::IntegerValue(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TimestampValue(ts) => Some(*ts),
            Self::StringValue(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// A document as returned by the REST API.
///
/// Fields stay as raw JSON so value kinds we never write (maps, arrays)
/// do not fail the whole read.
#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
}

impl Document {
    fn field(&self, key: &str) -> Option<FieldValue> {
        self.fields
            .get(key)
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.field(key).and_then(|v| v.as_string())
    }

    /// Id from the `id` field, else the last path segment of the name.
    fn customer_id(&self) -> Option<String> {
        self.string("id").filter(|id| !id.trim().is_empty()).or_else(|| {
            self.name
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    urlencoding::decode(segment)
                        .map_or_else(|_| segment.to_string(), |s| s.into_owned())
                })
        })
    }

    fn into_customer(self) -> Option<Customer> {
        let id = self.customer_id()?;
        let sync_status = self
            .string("syncStatus")
            .and_then(|s| serde_json::from_value::<SyncStatus>(json!(s)).ok());

        Some(Customer {
            id: id.into(),
            name: self.string("name").unwrap_or_default(),
            address: self.string("address").unwrap_or_default(),
            city: self.string("city").unwrap_or_default(),
            lat: self.field("lat").and_then(|v| v.as_f64()),
            lng: self.field("lng").and_then(|v| v.as_f64()),
            map_url: self.string("mapUrl"),
            created_at: self.field("createdAt").and_then(|v| v.as_timestamp()),
            sync_status,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryEntry {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

fn encode_fields(customer: &Customer) -> serde_json::Map<String, serde_json::Value> {
    let mut fields = HashMap::new();
    fields.insert("id", FieldValue::StringValue(customer.id.to_string()));
    fields.insert("name", FieldValue::StringValue(customer.name.clone()));
    fields.insert("address", FieldValue::StringValue(customer.address.clone()));
    fields.insert("city", FieldValue::StringValue(customer.city.clone()));
    if let Some(lat) = customer.lat {
        fields.insert("lat", FieldValue::DoubleValue(lat));
    }
    if let Some(lng) = customer.lng {
        fields.insert("lng", FieldValue::DoubleValue(lng));
    }
    if let Some(map_url) = &customer.map_url {
        fields.insert("mapUrl", FieldValue::StringValue(map_url.clone()));
    }
    if let Some(created_at) = customer.created_at {
        fields.insert("createdAt", FieldValue::TimestampValue(created_at));
    }
    if let Some(status) = customer.sync_status {
        let status = serde_json::to_value(status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        fields.insert("syncStatus", FieldValue::StringValue(status));
    }

    fields
        .into_iter()
        .filter_map(|(key, value)| {
            serde_json::to_value(value)
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .collect()
}

/// Firestore collection accessed over REST with a bearer token.
#[derive(Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    api_url: String,
    project_id: String,
    collection: String,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("api_url", &self.api_url)
            .field("project_id", &self.project_id)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// Build a client for the configured project and collection.
    ///
    /// # Errors
    ///
    /// Returns `CloudError::NotReady` if the token is not a valid header
    /// value or the HTTP client cannot be built.
    pub fn new(config: &FirestoreConfig, timeout: Duration) -> Result<Self, CloudError> {
        let bearer = format!("Bearer {}", config.token.expose_secret());
        let mut auth = HeaderValue::from_str(&bearer)
            .map_err(|_| CloudError::not_ready("token is not a valid header value"))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CloudError::not_ready(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            collection: config.collection.clone(),
        })
    }

    /// `projects/{p}/databases/(default)/documents`
    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, id: &CustomerId) -> String {
        format!(
            "{}/{}/{}",
            self.database_path(),
            self.collection,
            urlencoding::encode(id.as_str())
        )
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{method}", self.api_url, self.database_path())
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<String, CloudError> {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            debug!(%status, method, "Firestore request succeeded");
            return Ok(text);
        }

        Err(Self::parse_error(status.as_u16(), &text))
    }

    fn parse_error(status: u16, body: &str) -> CloudError {
        let message = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
            |_| body.chars().take(MAX_LOG_BODY_CHARS).collect(),
            |envelope| match envelope.error.status {
                Some(code) => format!("{code}: {}", envelope.error.message),
                None => envelope.error.message,
            },
        );
        warn!(status, %message, "Firestore request failed");
        CloudError::api(status, message)
    }

    fn commit_body(writes: Vec<serde_json::Value>) -> serde_json::Value {
        json!({ "writes": writes })
    }
}

impl FirestoreStore {
    /// Query for the whole collection.
    ///
    /// No server-side `orderBy`: Firestore drops documents that lack the
    /// ordered field, and records without `createdAt` must still load. The
    /// pipeline sorts newest first after fetching.
    fn collection_query(&self) -> serde_json::Value {
        json!({
            "structuredQuery": {
                "from": [{ "collectionId": self.collection }]
            }
        })
    }
}

#[async_trait]
impl CloudStore for FirestoreStore {
    async fn ready(&self) -> Result<(), CloudError> {
        if self.project_id.trim().is_empty() {
            return Err(CloudError::not_ready("project id is empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(CloudError::not_ready("collection name is empty"));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn fetch_all(&self) -> Result<Vec<Customer>, CloudError> {
        let body = self.post("runQuery", self.collection_query()).await?;
        let entries: Vec<RunQueryEntry> =
            serde_json::from_str(&body).map_err(|e| CloudError::Decode(e.to_string()))?;

        let customers: Vec<Customer> = entries
            .into_iter()
            .filter_map(|entry| entry.document)
            .filter_map(|doc| {
                let name = doc.name.clone();
                let customer = doc.into_customer();
                if customer.is_none() {
                    warn!(document = %name, "Skipping cloud document without an id");
                }
                customer
            })
            .collect();

        debug!(count = customers.len(), "Fetched cloud documents");
        Ok(customers)
    }

    #[instrument(skip(self, customers), fields(count = customers.len()))]
    async fn upsert_batch(&self, customers: &[Customer]) -> Result<(), CloudError> {
        if customers.is_empty() {
            return Ok(());
        }

        let writes = customers
            .iter()
            .map(|customer| {
                json!({
                    "update": {
                        "name": self.document_name(&customer.id),
                        "fields": encode_fields(customer),
                    },
                    "updateTransforms": [{
                        "fieldPath": "updatedAt",
                        "setToServerValue": "REQUEST_TIME"
                    }]
                })
            })
            .collect();

        self.post("commit", Self::commit_body(writes)).await?;
        Ok(())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn delete_batch(&self, ids: &[CustomerId]) -> Result<(), CloudError> {
        if ids.is_empty() {
            return Ok(());
        }

        let writes = ids
            .iter()
            .map(|id| json!({ "delete": self.document_name(id) }))
            .collect();

        self.post("commit", Self::commit_body(writes)).await?;
        Ok(())
    }
}
