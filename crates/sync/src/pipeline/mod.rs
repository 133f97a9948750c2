//! The coordinator that owns the customer collection.
//!
//! [`SyncPipeline`] is the only writer of application state. Commands that
//! change the collection take a single async write lock, persist first and
//! only then publish the new state on a `watch` channel, so observers never
//! see data that failed to save. Snapshot reads and writes run on the
//! blocking pool. Cloud sync runs as its own task and only reports back
//! through the cloud status fields.

mod state;

use std::collections::HashSet;
use std::sync::Arc;

use customer_atlas_core::{
    CityCount, CloudErrorKind, CloudLinkStatus, Customer, CustomerId, DataSource, SyncStatus,
    aggregate, merge, sort_newest_first,
};
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::claude::{ClaudeClient, ClaudeError};
use crate::cloud::{CloudError, CloudStore, FirestoreStore, UnavailableCloud};
use crate::config::{AtlasConfig, EnrichmentMode, ExtractionPolicy};
use crate::error::{FileFailure, ImportError, SyncError};
use crate::gateway::{
    ClaudeEnricher, ClaudeExtractor, Enricher, Extractor, InputFile, MapSearchEnricher,
    NoopEnricher, enrich_best_effort,
};
use crate::store::{FileKeyValueStore, LocalStore, StoreError};

pub use state::{ImportProgress, ImportReport, LoadOutcome, PipelineState};

/// Application state coordinator.
///
/// Cheaply cloneable; clones share the same state.
#[derive(Clone)]
pub struct SyncPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    extractor: Option<Arc<dyn Extractor>>,
    enricher: Arc<dyn Enricher>,
    store: LocalStore,
    cloud: Option<Arc<dyn CloudStore>>,
    policy: ExtractionPolicy,
    auto_sync: bool,
    state: watch::Sender<PipelineState>,
    write_lock: Mutex<()>,
    /// Held by the running cloud sync, and by `clear_all` so the two never
    /// interleave. Lock order: `sync_gate` before `write_lock`.
    sync_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("store", &self.inner.store)
            .field("has_extractor", &self.inner.extractor.is_some())
            .field("has_cloud", &self.inner.cloud.is_some())
            .field("policy", &self.inner.policy)
            .field("auto_sync", &self.inner.auto_sync)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncPipeline`].
pub struct SyncPipelineBuilder {
    store: LocalStore,
    extractor: Option<Arc<dyn Extractor>>,
    enricher: Arc<dyn Enricher>,
    cloud: Option<Arc<dyn CloudStore>>,
    policy: ExtractionPolicy,
    auto_sync: bool,
}

impl SyncPipelineBuilder {
    #[must_use]
    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    #[must_use]
    pub fn cloud(mut self, cloud: Arc<dyn CloudStore>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    #[must_use]
    pub const fn policy(mut self, policy: ExtractionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start a cloud sync after every import that added records.
    #[must_use]
    pub const fn auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> SyncPipeline {
        let (state, _) = watch::channel(PipelineState::default());
        SyncPipeline {
            inner: Arc::new(PipelineInner {
                extractor: self.extractor,
                enricher: self.enricher,
                store: self.store,
                cloud: self.cloud,
                policy: self.policy,
                auto_sync: self.auto_sync,
                state,
                write_lock: Mutex::new(()),
                sync_gate: Arc::new(Mutex::new(())),
            }),
        }
    }
}

impl SyncPipeline {
    /// Start building a pipeline over `store`.
    ///
    /// Defaults: no extractor, no enrichment, no cloud store, permissive
    /// extraction policy, auto sync off.
    #[must_use]
    pub fn builder(store: LocalStore) -> SyncPipelineBuilder {
        SyncPipelineBuilder {
            store,
            extractor: None,
            enricher: Arc::new(NoopEnricher),
            cloud: None,
            policy: ExtractionPolicy::default(),
            auto_sync: false,
        }
    }

    /// Wire up the production gateways and stores from configuration.
    ///
    /// Without a Claude key the pipeline can still load, export, restore,
    /// sync and clear; only file import is unavailable. A Firestore client
    /// that cannot be built is kept as a store that is never ready, so the
    /// failure surfaces as an initialization error on load.
    ///
    /// # Errors
    ///
    /// Returns `ClaudeError::Config` if the Claude client cannot be built.
    pub fn from_config(config: &AtlasConfig) -> Result<Self, ClaudeError> {
        let mut backend = FileKeyValueStore::new(&config.data_dir);
        if let Some(quota) = config.storage_quota_bytes {
            backend = backend.with_quota(quota);
        }

        let client = config
            .claude
            .as_ref()
            .map(|claude| ClaudeClient::new(claude, config.http_timeout))
            .transpose()?;

        let enricher: Arc<dyn Enricher> = match (config.enrichment, &client) {
            (EnrichmentMode::Off, _) => Arc::new(NoopEnricher),
            (EnrichmentMode::Search, _) => Arc::new(MapSearchEnricher),
            (EnrichmentMode::Claude, Some(client)) => Arc::new(ClaudeEnricher::new(client.clone())),
            (EnrichmentMode::Claude, None) => {
                warn!("ATLAS_ENRICHMENT=claude needs CLAUDE_API_KEY, using map search links");
                Arc::new(MapSearchEnricher)
            }
        };

        let mut builder = Self::builder(LocalStore::new(Arc::new(backend)))
            .enricher(enricher)
            .policy(config.extraction_policy)
            .auto_sync(config.auto_sync);

        if let Some(client) = client {
            builder = builder.extractor(Arc::new(ClaudeExtractor::new(client)));
        }

        if let Some(firestore) = config.firestore() {
            let cloud: Arc<dyn CloudStore> =
                match FirestoreStore::new(firestore, config.http_timeout) {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        warn!(error = %e, "Firestore client unavailable");
                        Arc::new(UnavailableCloud::new(e.to_string()))
                    }
                };
            builder = builder.cloud(cloud);
        }

        Ok(builder.build())
    }

    /// Whether a cloud store is configured.
    #[must_use]
    pub fn has_cloud(&self) -> bool {
        self.inner.cloud.is_some()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.inner.state.borrow().clone()
    }

    /// The collection as currently held in memory.
    #[must_use]
    pub fn customers(&self) -> Vec<Customer> {
        self.inner.state.borrow().customers.clone()
    }

    /// Observe every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.inner.state.subscribe()
    }

    /// Customers per city, most populous first.
    #[must_use]
    pub fn city_stats(&self) -> Vec<CityCount> {
        aggregate(&self.inner.state.borrow().customers)
    }

    /// Load the collection, preferring the cloud copy when one is configured.
    ///
    /// Never fails: cloud problems fall back to the local snapshot and are
    /// reported in [`LoadOutcome::cloud_error`].
    #[instrument(skip(self))]
    pub async fn load_initial(&self) -> LoadOutcome {
        let _guard = self.inner.write_lock.lock().await;

        let Some(cloud) = &self.inner.cloud else {
            let customers = self.read_snapshot().await;
            info!(count = customers.len(), "Loaded local snapshot");
            return self.publish_load(customers, DataSource::Local, CloudLinkStatus::Disconnected, None);
        };

        match fetch_cloud(cloud.as_ref()).await {
            Ok(remote) => {
                let combined = self.keep_unconfirmed(remote).await;
                let customers = match self.persist(combined.clone()).await {
                    Ok(saved) => saved,
                    Err(e) => {
                        warn!(error = %e, "Could not overwrite local snapshot with cloud data");
                        combined
                    }
                };
                info!(count = customers.len(), "Loaded cloud collection");
                self.publish_load(customers, DataSource::Cloud, CloudLinkStatus::Connected, None)
            }
            Err(e) => {
                let kind = e.kind();
                let customers = self.read_snapshot().await;
                warn!(error = %e, %kind, count = customers.len(), "Cloud load failed, using local snapshot");
                self.publish_load(customers, DataSource::Local, CloudLinkStatus::Error, Some(kind))
            }
        }
    }

    /// The cloud copy plus every local record the cloud never confirmed.
    ///
    /// Records marked `synced` locally but missing remotely were deleted
    /// elsewhere and are dropped. Anything else absent from the cloud is
    /// kept and tagged `local` so the next sync uploads it.
    async fn keep_unconfirmed(&self, remote: Vec<Customer>) -> Vec<Customer> {
        let pending: Vec<Customer> = self
            .read_snapshot()
            .await
            .into_iter()
            .filter(|c| c.sync_status != Some(SyncStatus::Synced))
            .map(|mut c| {
                c.sync_status = Some(SyncStatus::Local);
                c
            })
            .collect();

        let outcome = merge(&remote, pending);
        if outcome.added > 0 {
            info!(count = outcome.added, "Keeping local records not yet in the cloud");
        }
        let mut customers = outcome.customers;
        sort_newest_first(&mut customers);
        customers
    }

    fn publish_load(
        &self,
        customers: Vec<Customer>,
        source: DataSource,
        cloud_status: CloudLinkStatus,
        cloud_error: Option<CloudErrorKind>,
    ) -> LoadOutcome {
        self.inner.state.send_modify(|state| {
            state.customers.clone_from(&customers);
            state.source = source;
            state.cloud_status = cloud_status;
            state.cloud_error = cloud_error;
        });
        LoadOutcome {
            customers,
            source,
            cloud_error,
        }
    }

    /// Extract, enrich, merge and persist a batch of files.
    ///
    /// Files are extracted one at a time, in order. What happens when one
    /// fails depends on the configured [`ExtractionPolicy`].
    ///
    /// # Errors
    ///
    /// Returns `ImportError` if extraction is not configured, if the policy
    /// rejects the batch, if nothing was recognized, or if the merged
    /// collection cannot be saved. State is unchanged on `Err`.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn import_files(&self, files: Vec<InputFile>) -> Result<ImportReport, ImportError> {
        let extractor = self
            .inner
            .extractor
            .clone()
            .ok_or(ImportError::NotConfigured)?;

        let report = {
            let _guard = self.inner.write_lock.lock().await;

            let extracted = self.extract_all(extractor.as_ref(), &files).await;
            self.set_progress(None);
            let (records, failed) = extracted?;

            if records.is_empty() {
                return Err(ImportError::NoRecordsFound);
            }

            let enriched = enrich_best_effort(self.inner.enricher.as_ref(), records).await;
            let mut report = self.merge_and_save(enriched).await?;
            report.failed = failed;
            report
        };

        Ok(self.maybe_auto_sync(report))
    }

    async fn extract_all(
        &self,
        extractor: &dyn Extractor,
        files: &[InputFile],
    ) -> Result<(Vec<Customer>, Vec<FileFailure>), ImportError> {
        let total = files.len();
        let mut records = Vec::new();
        let mut failed = Vec::new();

        for (index, file) in files.iter().enumerate() {
            self.set_progress(Some(ImportProgress {
                current: index + 1,
                total,
                file: file.name.clone(),
            }));

            match extractor.extract(&file.input).await {
                Ok(found) => {
                    info!(file = %file.name, count = found.len(), "Extracted records");
                    records.extend(found);
                }
                Err(e) => match self.inner.policy {
                    ExtractionPolicy::AbortOnFailure => {
                        error!(file = %file.name, error = %e, "Extraction failed, aborting batch");
                        return Err(ImportError::Extraction {
                            file: file.name.clone(),
                            source: e,
                        });
                    }
                    ExtractionPolicy::SkipFailed => {
                        warn!(file = %file.name, error = %e, "Extraction failed, skipping file");
                        failed.push(FileFailure {
                            file: file.name.clone(),
                            error: e.to_string(),
                        });
                    }
                },
            }
        }

        if total > 0 && failed.len() == total {
            return Err(ImportError::AllFilesFailed(failed));
        }

        Ok((records, failed))
    }

    fn set_progress(&self, progress: Option<ImportProgress>) {
        self.inner.state.send_modify(|state| state.progress = progress);
    }

    /// Export the collection as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.inner.state.borrow().customers)
    }

    /// Merge a previously exported backup into the collection.
    ///
    /// # Errors
    ///
    /// Returns `ImportError::Parse` if `blob` is not an array of customer
    /// records, `ImportError::Persistence` if the result cannot be saved.
    /// State is unchanged on `Err`.
    #[instrument(skip(self, blob), fields(bytes = blob.len()))]
    pub async fn import_backup(&self, blob: &str) -> Result<ImportReport, ImportError> {
        let records: Vec<Customer> =
            serde_json::from_str(blob).map_err(|e| ImportError::Parse(e.to_string()))?;

        let (records, blank): (Vec<Customer>, Vec<Customer>) =
            records.into_iter().partition(|c| !c.id.is_blank());
        if !blank.is_empty() {
            warn!(count = blank.len(), "Ignoring backup records without an id");
        }

        let report = {
            let _guard = self.inner.write_lock.lock().await;
            self.merge_and_save(records).await?
        };

        Ok(self.maybe_auto_sync(report))
    }

    /// Merge `incoming` into the current collection and persist the result.
    ///
    /// Caller must hold the write lock.
    async fn merge_and_save(&self, incoming: Vec<Customer>) -> Result<ImportReport, ImportError> {
        let extracted = incoming.len();
        let outcome = merge(&self.inner.state.borrow().customers, incoming);

        let report = ImportReport {
            extracted,
            added: outcome.added,
            duplicates: outcome.duplicates,
            ..ImportReport::default()
        };

        if outcome.is_noop() {
            info!(duplicates = outcome.duplicates, "No new records");
            return Ok(report);
        }

        let mut customers = outcome.customers;
        if self.inner.cloud.is_some() {
            for customer in customers.iter_mut().filter(|c| c.sync_status.is_none()) {
                customer.sync_status = Some(SyncStatus::Local);
            }
        }

        let saved = self.persist(customers).await.map_err(|e| {
            error!(error = %e, "Failed to save merged collection");
            ImportError::Persistence(e)
        })?;

        self.inner.state.send_modify(|state| state.customers = saved);
        info!(
            added = report.added,
            duplicates = report.duplicates,
            "Saved merged collection"
        );
        Ok(report)
    }

    fn maybe_auto_sync(&self, mut report: ImportReport) -> ImportReport {
        if !self.inner.auto_sync || report.is_noop() || !self.has_cloud() {
            return report;
        }
        match self.trigger_cloud_sync() {
            Ok(_) => {
                debug!("Started cloud sync after import");
                report.sync_started = true;
            }
            Err(e) => debug!(error = %e, "Cloud sync after import not started"),
        }
        report
    }

    /// Start pushing the whole collection to the cloud store.
    ///
    /// Returns immediately; the sync runs as its own task and reports
    /// progress through the cloud status fields of the published state. The
    /// returned handle resolves to the sync result. Must be called from
    /// within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotConfigured` without a cloud store and
    /// `SyncError::AlreadySyncing` while another sync or a clear is running.
    pub fn trigger_cloud_sync(&self) -> Result<JoinHandle<Result<(), SyncError>>, SyncError> {
        let cloud = self.inner.cloud.clone().ok_or(SyncError::NotConfigured)?;

        let gate: OwnedMutexGuard<()> = Arc::clone(&self.inner.sync_gate)
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadySyncing)?;

        self.inner
            .state
            .send_modify(|state| state.cloud_status = CloudLinkStatus::Syncing);

        let pipeline = self.clone();
        Ok(tokio::spawn(async move {
            let _gate = gate;
            pipeline.run_sync(cloud.as_ref()).await
        }))
    }

    /// Run a cloud sync and wait for it to finish.
    ///
    /// # Errors
    ///
    /// Same as [`trigger_cloud_sync`](Self::trigger_cloud_sync), plus the
    /// failure of the sync itself.
    pub async fn sync_now(&self) -> Result<(), SyncError> {
        let handle = self.trigger_cloud_sync()?;
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Cloud sync task did not complete");
                self.inner.state.send_modify(|state| {
                    state.cloud_status = CloudLinkStatus::Error;
                    state.cloud_error = Some(CloudErrorKind::Other);
                });
                Err(SyncError::Interrupted(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, cloud))]
    async fn run_sync(&self, cloud: &dyn CloudStore) -> Result<(), SyncError> {
        // Upload the state the batch commits, so a later cloud load agrees
        // with the local snapshot.
        let batch: Vec<Customer> = self
            .customers()
            .into_iter()
            .map(|mut c| {
                c.sync_status = Some(SyncStatus::Synced);
                c
            })
            .collect();
        info!(count = batch.len(), "Cloud sync started");

        if let Err(e) = cloud.upsert_batch(&batch).await {
            let kind = e.kind();
            warn!(error = %e, %kind, "Cloud sync failed, local data unchanged");
            self.inner.state.send_modify(|state| {
                state.cloud_status = CloudLinkStatus::Error;
                state.cloud_error = Some(kind);
            });
            return Err(e.into());
        }

        // Records imported while the batch was in flight stay as they are.
        let synced: HashSet<CustomerId> = batch.into_iter().map(|c| c.id).collect();

        let _guard = self.inner.write_lock.lock().await;
        let mut customers = self.customers();
        for customer in customers.iter_mut().filter(|c| synced.contains(&c.id)) {
            customer.sync_status = Some(SyncStatus::Synced);
        }

        match self.persist(customers).await {
            Ok(saved) => {
                info!(count = synced.len(), "Cloud sync complete");
                self.inner.state.send_modify(|state| {
                    state.customers = saved;
                    state.cloud_status = CloudLinkStatus::Connected;
                    state.cloud_error = None;
                });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Cloud sync succeeded but local snapshot was not updated");
                self.inner.state.send_modify(|state| {
                    state.cloud_status = CloudLinkStatus::Error;
                    state.cloud_error = Some(CloudErrorKind::Other);
                });
                Err(e.into())
            }
        }
    }

    /// Delete every record locally, and in the cloud store when configured.
    ///
    /// Waits for a running cloud sync to finish first, and blocks new ones
    /// until done, so a late batch cannot bring the records back. The remote
    /// delete is best-effort: a failure is logged and the local clear still
    /// stands.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the local snapshot cannot be removed, in
    /// which case nothing changes.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let _sync = self.inner.sync_gate.lock().await;
        let _guard = self.inner.write_lock.lock().await;

        let ids: Vec<CustomerId> = self
            .inner
            .state
            .borrow()
            .customers
            .iter()
            .map(|c| c.id.clone())
            .collect();

        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.clear()).await??;
        self.inner.state.send_modify(|state| state.customers.clear());
        info!(count = ids.len(), "Cleared local data");

        if let Some(cloud) = &self.inner.cloud {
            match cloud.delete_batch(&ids).await {
                Ok(()) => info!(count = ids.len(), "Deleted cloud documents"),
                Err(e) => warn!(error = %e, kind = %e.kind(), "Could not delete cloud documents"),
            }
        }

        Ok(())
    }

    /// Save on the blocking pool.
    async fn persist(&self, customers: Vec<Customer>) -> Result<Vec<Customer>, StoreError> {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.save(customers)).await?
    }

    /// Load on the blocking pool.
    async fn read_snapshot(&self) -> Vec<Customer> {
        let store = self.inner.store.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Local snapshot read did not complete, starting empty");
                Vec::new()
            })
    }
}

async fn fetch_cloud(cloud: &dyn CloudStore) -> Result<Vec<Customer>, CloudError> {
    cloud.ready().await?;
    let mut customers = cloud.fetch_all().await?;
    sort_newest_first(&mut customers);
    Ok(customers)
}
