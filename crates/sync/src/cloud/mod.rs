//! Optional cloud mirror of the customer collection.
//!
//! When configured, the cloud copy is authoritative on load and receives
//! the whole collection in one atomic batch on sync.

mod error;
mod firestore;

use async_trait::async_trait;
use customer_atlas_core::{Customer, CustomerId};

pub use error::CloudError;
pub use firestore::FirestoreStore;

/// A remote document collection keyed by customer id.
#[async_trait]
pub trait CloudStore: Send + Sync {
    /// Check that the client can talk to the remote at all.
    ///
    /// Failures here classify as initialization errors.
    async fn ready(&self) -> Result<(), CloudError> {
        Ok(())
    }

    /// Every document, newest `createdAt` first.
    async fn fetch_all(&self) -> Result<Vec<Customer>, CloudError>;

    /// Write every record in one all-or-nothing batch.
    async fn upsert_batch(&self, customers: &[Customer]) -> Result<(), CloudError>;

    /// Delete the given documents in one batch.
    async fn delete_batch(&self, ids: &[CustomerId]) -> Result<(), CloudError>;
}

/// Stand-in for a configured store whose client could not be built.
///
/// Every call fails as not ready, so loads fall back to local data with an
/// initialization error.
#[derive(Debug, Clone)]
pub struct UnavailableCloud {
    reason: String,
}

impl UnavailableCloud {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> CloudError {
        CloudError::not_ready(self.reason.clone())
    }
}

#[async_trait]
impl CloudStore for UnavailableCloud {
    async fn ready(&self) -> Result<(), CloudError> {
        Err(self.error())
    }

    async fn fetch_all(&self) -> Result<Vec<Customer>, CloudError> {
        Err(self.error())
    }

    async fn upsert_batch(&self, _: &[Customer]) -> Result<(), CloudError> {
        Err(self.error())
    }

    async fn delete_batch(&self, _: &[CustomerId]) -> Result<(), CloudError> {
        Err(self.error())
    }
}
