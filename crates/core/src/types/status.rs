//! Status enums for records and the cloud link.

use serde::{Deserialize, Serialize};

/// Cloud reconciliation state of a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Persisted locally, not yet confirmed by the cloud store.
    #[default]
    Local,
    /// Included in a batch write that has not resolved yet.
    Syncing,
    /// Confirmed by the cloud store.
    Synced,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Syncing => write!(f, "syncing"),
            Self::Synced => write!(f, "synced"),
        }
    }
}

/// Per-session status of the link to the cloud store.
///
/// Transitions: `Disconnected -> Connected -> Syncing -> Connected` on
/// success, `Syncing -> Error` on failure. A new sync may be triggered from
/// `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CloudLinkStatus {
    /// No cloud store configured, or it has not been reached yet.
    #[default]
    Disconnected,
    Connected,
    Syncing,
    Error,
}

impl CloudLinkStatus {
    /// Whether a new sync may start from this state.
    #[must_use]
    pub const fn can_start_sync(self) -> bool {
        !matches!(self, Self::Syncing)
    }
}

impl std::fmt::Display for CloudLinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Syncing => write!(f, "syncing"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where the collection shown after a load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Local,
    Cloud,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Classification of a failed cloud read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudErrorKind {
    /// The remote rejected our credentials or security rules.
    PermissionDenied,
    /// Offline, or the remote could not be reached.
    Network,
    /// The remote client never became ready.
    Initialization,
    Other,
}

impl std::fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission-denied"),
            Self::Network => write!(f, "network"),
            Self::Initialization => write!(f, "initialization"),
            Self::Other => write!(f, "other"),
        }
    }
}
