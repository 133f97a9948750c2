//! File import.

use std::path::PathBuf;

use customer_atlas_sync::gateway::InputFile;
use tracing::{info, warn};

use super::{CommandError, open, wait_for_sync};

/// Extract customers from `paths` and merge them into the collection.
///
/// All files are read before anything is sent for extraction, so a missing
/// or unsupported file fails the command up front.
///
/// # Errors
///
/// Returns an error if a file cannot be read, extraction is not configured
/// or fails under the active policy, nothing is recognized, or the merged
/// collection cannot be saved.
pub async fn files(paths: &[PathBuf]) -> Result<(), CommandError> {
    let mut inputs = Vec::with_capacity(paths.len());
    for path in paths {
        inputs.push(InputFile::from_path(path).await?);
    }

    let (pipeline, _) = open().await?;

    let mut rx = pipeline.subscribe();
    let progress = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().progress.clone();
            if let Some(p) = current {
                info!("Extracting {}/{}: {}", p.current, p.total, p.file);
            }
        }
    });

    let result = pipeline.import_files(inputs).await;
    progress.abort();
    let report = result?;

    for failure in &report.failed {
        warn!("Skipped {failure}");
    }

    if report.is_noop() {
        info!(
            "No new records: all {} extracted customers are already known",
            report.extracted
        );
        return Ok(());
    }

    info!(
        "Added {} customers ({} already known)",
        report.added, report.duplicates
    );
    if report.sync_started {
        wait_for_sync(&pipeline).await;
    }
    Ok(())
}
