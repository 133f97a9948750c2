//! Subcommand implementations.
//!
//! Every command opens the pipeline from the environment, loads the
//! collection and then runs one operation of the pipeline's command surface.

pub mod data;
pub mod import;
pub mod sync;

use std::path::PathBuf;

use customer_atlas_core::{CloudLinkStatus, Customer};
use customer_atlas_sync::claude::ClaudeError;
use customer_atlas_sync::config::ConfigError;
use customer_atlas_sync::gateway::InputError;
use customer_atlas_sync::store::StoreError;
use customer_atlas_sync::{AtlasConfig, ImportError, LoadOutcome, SyncError, SyncPipeline};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while running a subcommand.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to set up Claude client: {0}")]
    Claude(#[from] ClaudeError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize export: {0}")]
    Export(#[from] serde_json::Error),

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to delete all customers without --yes")]
    NotConfirmed,
}

/// Build the pipeline from the environment and load the collection.
async fn open() -> Result<(SyncPipeline, LoadOutcome), CommandError> {
    let config = AtlasConfig::from_env()?;
    let pipeline = SyncPipeline::from_config(&config)?;
    let outcome = pipeline.load_initial().await;

    match outcome.cloud_error {
        Some(kind) => warn!(
            "Cloud copy unavailable ({kind}), showing {} local customers",
            outcome.customers.len()
        ),
        None => info!(
            "Loaded {} customers from {} storage",
            outcome.customers.len(),
            outcome.source
        ),
    }

    Ok((pipeline, outcome))
}

/// Wait for the background cloud sync an import started and report how it
/// ended.
async fn wait_for_sync(pipeline: &SyncPipeline) {
    let mut rx = pipeline.subscribe();
    let Ok(state) = rx
        .wait_for(|state| state.cloud_status.can_start_sync())
        .await
    else {
        return;
    };

    match (state.cloud_status, state.cloud_error) {
        (CloudLinkStatus::Error, Some(kind)) => {
            warn!("Cloud sync failed ({kind}); local data is saved, retry with `atlas sync`");
        }
        (CloudLinkStatus::Connected, _) => info!("Cloud sync complete"),
        _ => {}
    }
}

fn log_customers(customers: &[Customer]) {
    for customer in customers {
        let created = customer
            .created_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let status = customer
            .sync_status
            .map(|s| format!(" [{s}]"))
            .unwrap_or_default();
        info!(
            "{:<12} {:<24} {:<16} {}{}",
            customer.id,
            customer.name,
            customer.city,
            created,
            status
        );
    }
}
