//! Manual cloud sync.

use tracing::info;

use super::{CommandError, open};

/// Push the whole collection to the cloud store and wait for the result.
///
/// # Errors
///
/// Returns an error if no cloud store is configured or the batch write
/// fails. Local data is left as it was on failure.
pub async fn now() -> Result<(), CommandError> {
    let (pipeline, outcome) = open().await?;

    info!("Syncing {} customers", outcome.customers.len());
    pipeline.sync_now().await?;
    info!("Cloud sync complete");
    Ok(())
}
