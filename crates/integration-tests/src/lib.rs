//! Integration tests for Customer Atlas.
//!
//! The pipeline runs against a real file-backed store in a temporary
//! directory, with in-process fakes standing in for the Claude gateways and
//! the cloud store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p customer-atlas-integration-tests
//! ```
//!
//! # Fakes
//!
//! - [`ScriptedExtractor`] reads CSV text as `id,name,address,city` lines;
//!   the text `FAIL` makes extraction fail
//! - [`RecordingEnricher`] links every record it is asked about and
//!   remembers which ids those were
//! - [`FakeCloud`] keeps documents in memory and can fail or hold writes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};
use customer_atlas_sync::cloud::{CloudError, CloudStore};
use customer_atlas_sync::gateway::{
    EnrichmentError, Enricher, ExtractionError, ExtractionInput, Extractor, InputFile,
};
use customer_atlas_sync::store::{FileKeyValueStore, LocalStore};
use customer_atlas_sync::{SyncPipeline, SyncPipelineBuilder};
use tempfile::TempDir;
use tokio::sync::Notify;

/// CSV text that makes [`ScriptedExtractor`] fail.
pub const FAILING_SHEET: &str = "FAIL";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A CSV input with one `id,name,address,city` line per `(id, city)`.
#[must_use]
pub fn sheet(name: &str, rows: &[(&str, &str)]) -> InputFile {
    let text = rows
        .iter()
        .map(|(id, city)| format!("{id},Customer {id},{id} Main Street,{city}"))
        .collect::<Vec<_>>()
        .join("\n");
    InputFile::csv(name, text)
}

/// A CSV input the extractor rejects.
#[must_use]
pub fn broken_sheet(name: &str) -> InputFile {
    InputFile::csv(name, FAILING_SHEET)
}

/// Extractor that parses CSV lines itself and records every call.
#[derive(Default)]
pub struct ScriptedExtractor {
    calls: Mutex<Vec<String>>,
}

impl ScriptedExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Input texts in the order they were extracted.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, input: &ExtractionInput) -> Result<Vec<Customer>, ExtractionError> {
        let ExtractionInput::Csv(text) = input else {
            lock(&self.calls).push("<image>".to_string());
            return Ok(Vec::new());
        };
        lock(&self.calls).push(text.clone());

        if text == FAILING_SHEET {
            return Err(ExtractionError::InvalidReply("not a JSON array".to_string()));
        }

        Ok(text
            .lines()
            .filter_map(|line| {
                let mut fields = line.split(',');
                let id = fields.next()?.trim();
                if id.is_empty() {
                    return None;
                }
                let name = fields.next().unwrap_or_default();
                let address = fields.next().unwrap_or_default();
                let city = fields.next().unwrap_or_default();
                Some(Customer::new(id, name, address, city))
            })
            .collect())
    }
}

/// Enricher that links every record it receives, or fails on demand.
#[derive(Default)]
pub struct RecordingEnricher {
    fail: bool,
    seen: Mutex<Vec<CustomerId>>,
}

impl RecordingEnricher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Ids of records that were sent for lookup.
    pub fn seen(&self) -> Vec<CustomerId> {
        lock(&self.seen).clone()
    }

    #[must_use]
    pub fn link_for(id: &CustomerId) -> String {
        format!("https://maps.example/{id}")
    }
}

#[async_trait]
impl Enricher for RecordingEnricher {
    async fn enrich(&self, mut customers: Vec<Customer>) -> Result<Vec<Customer>, EnrichmentError> {
        lock(&self.seen).extend(
            customers
                .iter()
                .filter(|c| c.needs_map_url())
                .map(|c| c.id.clone()),
        );

        if self.fail {
            return Err(EnrichmentError::InvalidReply("lookup failed".to_string()));
        }

        for customer in customers.iter_mut().filter(|c| c.needs_map_url()) {
            customer.map_url = Some(Self::link_for(&customer.id));
        }
        Ok(customers)
    }
}

/// In-memory document store with switchable failures.
#[derive(Default)]
pub struct FakeCloud {
    documents: Mutex<Vec<Customer>>,
    read_failure: Mutex<Option<u16>>,
    write_failure: Mutex<Option<u16>>,
    delete_failure: Mutex<Option<u16>>,
    write_gate: Mutex<Option<Arc<Notify>>>,
    upserts: AtomicUsize,
}

impl FakeCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_documents(documents: Vec<Customer>) -> Self {
        Self {
            documents: Mutex::new(documents),
            ..Self::default()
        }
    }

    pub fn documents(&self) -> Vec<Customer> {
        lock(&self.documents).clone()
    }

    /// Fail reads with the given HTTP status.
    pub fn fail_reads(&self, status: u16) {
        *lock(&self.read_failure) = Some(status);
    }

    /// Fail batch writes with the given HTTP status.
    pub fn fail_writes(&self, status: u16) {
        *lock(&self.write_failure) = Some(status);
    }

    /// Fail deletes with the given HTTP status.
    pub fn fail_deletes(&self, status: u16) {
        *lock(&self.delete_failure) = Some(status);
    }

    /// Stop failing reads, writes and deletes.
    pub fn clear_failures(&self) {
        *lock(&self.read_failure) = None;
        *lock(&self.write_failure) = None;
        *lock(&self.delete_failure) = None;
    }

    /// Make batch writes wait until the returned handle is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.write_gate) = Some(Arc::clone(&gate));
        gate
    }

    /// Number of batch writes attempted.
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudStore for FakeCloud {
    async fn fetch_all(&self) -> Result<Vec<Customer>, CloudError> {
        if let Some(status) = *lock(&self.read_failure) {
            return Err(CloudError::api(status, "read rejected"));
        }
        let mut documents = self.documents();
        customer_atlas_core::sort_newest_first(&mut documents);
        Ok(documents)
    }

    async fn upsert_batch(&self, customers: &[Customer]) -> Result<(), CloudError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);

        let gate = lock(&self.write_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(status) = *lock(&self.write_failure) {
            return Err(CloudError::api(status, "write rejected"));
        }

        let mut documents = lock(&self.documents);
        for customer in customers {
            match documents.iter_mut().find(|d| d.id == customer.id) {
                Some(existing) => existing.clone_from(customer),
                None => documents.push(customer.clone()),
            }
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[CustomerId]) -> Result<(), CloudError> {
        if let Some(status) = *lock(&self.delete_failure) {
            return Err(CloudError::api(status, "delete rejected"));
        }
        lock(&self.documents).retain(|d| !ids.contains(&d.id));
        Ok(())
    }
}

/// A temporary data directory plus the fakes wired into every pipeline
/// built from it.
pub struct TestContext {
    pub dir: TempDir,
    pub extractor: Arc<ScriptedExtractor>,
    pub enricher: Arc<RecordingEnricher>,
}

impl TestContext {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self::with_enricher(RecordingEnricher::new())
    }

    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_enricher(enricher: RecordingEnricher) -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
            extractor: Arc::new(ScriptedExtractor::new()),
            enricher: Arc::new(enricher),
        }
    }

    /// A fresh handle on the snapshot in the temporary directory.
    #[must_use]
    pub fn store(&self) -> LocalStore {
        LocalStore::new(Arc::new(FileKeyValueStore::new(self.dir.path())))
    }

    /// Same as [`store`](Self::store) with a byte quota.
    #[must_use]
    pub fn store_with_quota(&self, bytes: u64) -> LocalStore {
        LocalStore::new(Arc::new(
            FileKeyValueStore::new(self.dir.path()).with_quota(bytes),
        ))
    }

    /// A pipeline builder over [`store`](Self::store) with the fakes wired in.
    #[must_use]
    pub fn builder(&self) -> SyncPipelineBuilder {
        self.builder_over(self.store())
    }

    /// A pipeline builder over `store` with the fakes wired in.
    #[must_use]
    pub fn builder_over(&self, store: LocalStore) -> SyncPipelineBuilder {
        SyncPipeline::builder(store)
            .extractor(self.extractor.clone())
            .enricher(self.enricher.clone())
    }

    #[must_use]
    pub fn pipeline(&self) -> SyncPipeline {
        self.builder().build()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids in collection order.
#[must_use]
pub fn ids(customers: &[Customer]) -> Vec<String> {
    customers.iter().map(|c| c.id.to_string()).collect()
}
