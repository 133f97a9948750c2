//! Listing, backup, restore, clear and stats commands.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use super::{CommandError, log_customers, open, wait_for_sync};

/// Load the collection and list it, newest first.
///
/// # Errors
///
/// Returns an error if configuration is invalid.
pub async fn load() -> Result<(), CommandError> {
    let (_, outcome) = open().await?;
    log_customers(&outcome.customers);
    Ok(())
}

/// File name used when `export` is given no output path.
fn default_export_path() -> PathBuf {
    PathBuf::from(format!("customers-{}.json", Local::now().format("%Y-%m-%d")))
}

/// Write the collection as a pretty-printed JSON backup.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the file cannot be
/// written.
pub async fn export(output: Option<PathBuf>) -> Result<(), CommandError> {
    let (pipeline, _) = open().await?;
    let path = output.unwrap_or_else(default_export_path);

    let json = pipeline.export_snapshot()?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|source| CommandError::Io {
            action: "write",
            path: path.clone(),
            source,
        })?;

    info!(
        "Exported {} customers to {}",
        pipeline.customers().len(),
        path.display()
    );
    Ok(())
}

/// Merge a backup file into the collection.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a customer array, or
/// the merged collection cannot be saved.
pub async fn restore(file: &Path) -> Result<(), CommandError> {
    let blob = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| CommandError::Io {
            action: "read",
            path: file.to_path_buf(),
            source,
        })?;

    let (pipeline, _) = open().await?;
    let report = pipeline.import_backup(&blob).await?;

    if report.is_noop() {
        info!(
            "No new records: all {} customers in the backup are already known",
            report.extracted
        );
    } else {
        info!(
            "Restored {} customers ({} already known)",
            report.added, report.duplicates
        );
        if report.sync_started {
            wait_for_sync(&pipeline).await;
        }
    }
    Ok(())
}

/// Delete the whole collection.
///
/// # Errors
///
/// Returns `CommandError::NotConfirmed` unless `yes` is set, or an error if
/// the local snapshot cannot be removed.
pub async fn clear(yes: bool) -> Result<(), CommandError> {
    if !yes {
        return Err(CommandError::NotConfirmed);
    }

    let (pipeline, outcome) = open().await?;
    pipeline.clear_all().await?;
    info!("Deleted {} customers", outcome.customers.len());
    Ok(())
}

/// Show how many customers live in each city.
///
/// # Errors
///
/// Returns an error if configuration is invalid.
pub async fn stats() -> Result<(), CommandError> {
    let (pipeline, _) = open().await?;

    let stats = pipeline.city_stats();
    if stats.is_empty() {
        info!("No customers with a city yet");
        return Ok(());
    }

    let width = stats.iter().map(|s| s.city.chars().count()).max().unwrap_or(0);
    for entry in stats {
        info!("{:<width$}  {}", entry.city, entry.count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_export_path_is_dated_json() {
        let name = default_export_path().to_string_lossy().into_owned();
        assert!(name.starts_with("customers-"));
        assert!(name.ends_with(".json"));
        assert_eq!(name.len(), "customers-2025-01-01.json".len());
    }
}
