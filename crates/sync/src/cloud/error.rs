//! Cloud store errors.

use customer_atlas_core::CloudErrorKind;
use thiserror::Error;

/// Errors from the remote document store.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Transport failure before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The client could not be set up or is missing its credentials.
    #[error("cloud store not ready: {0}")]
    NotReady(String),

    /// A response body could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl CloudError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady(message.into())
    }

    /// HTTP status of the failed response, if one arrived.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::NotReady(_) | Self::Decode(_) => None,
        }
    }

    /// Classify for the user-facing cloud status.
    #[must_use]
    pub fn kind(&self) -> CloudErrorKind {
        if let Some(status) = self.status_code() {
            return match status {
                401 | 403 => CloudErrorKind::PermissionDenied,
                502..=504 => CloudErrorKind::Network,
                _ => CloudErrorKind::Other,
            };
        }
        match self {
            Self::Http(e) if e.is_connect() || e.is_timeout() => CloudErrorKind::Network,
            Self::NotReady(_) => CloudErrorKind::Initialization,
            Self::Http(_) | Self::Api { .. } | Self::Decode(_) => CloudErrorKind::Other,
        }
    }
}
