//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required for importing files
//! - `CLAUDE_API_KEY` - Anthropic Claude API key
//!
//! ## Optional
//! - `CLAUDE_MODEL` - Claude model ID (default: claude-sonnet-4-20250514)
//! - `CLAUDE_API_URL` - Messages endpoint override (default: Anthropic production)
//! - `ATLAS_DATA_DIR` - Directory holding the local snapshot (default: ./data)
//! - `ATLAS_STORAGE_QUOTA_BYTES` - Maximum snapshot size in bytes
//! - `ATLAS_EXTRACTION_POLICY` - `skip` or `abort` on a failing file (default: skip)
//! - `ATLAS_ENRICHMENT` - `search`, `claude` or `off` (default: search)
//! - `ATLAS_HTTP_TIMEOUT_SECS` - Timeout for gateway and cloud requests (default: 60)
//! - `ATLAS_AUTO_SYNC` - Push to the cloud after every import (default: true)
//!
//! ## Optional (Firestore - enables the cloud mirror)
//! - `FIRESTORE_PROJECT_ID` - Google Cloud project ID
//! - `FIRESTORE_TOKEN` - OAuth bearer token with datastore access
//! - `FIRESTORE_COLLECTION` - Collection name (default: customers)
//! - `FIRESTORE_API_URL` - REST base URL override

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// What to do when one file in an import batch cannot be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionPolicy {
    /// Log the failure and continue with the next file.
    #[default]
    SkipFailed,
    /// Abort the whole batch on the first failure.
    AbortOnFailure,
}

impl FromStr for ExtractionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::SkipFailed),
            "abort" => Ok(Self::AbortOnFailure),
            other => Err(format!("expected `skip` or `abort`, got `{other}`")),
        }
    }
}

/// Which enrichment gateway to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentMode {
    /// Build map search links locally from the address.
    #[default]
    Search,
    /// Ask Claude for map links.
    Claude,
    Off,
}

impl FromStr for EnrichmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "claude" => Ok(Self::Claude),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("expected `search`, `claude` or `off`, got `{other}`")),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Directory holding the local snapshot
    pub data_dir: PathBuf,
    /// Maximum snapshot size in bytes, if limited
    pub storage_quota_bytes: Option<u64>,
    pub extraction_policy: ExtractionPolicy,
    pub enrichment: EnrichmentMode,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
    /// Push to the cloud store after each successful import
    pub auto_sync: bool,
    /// Claude configuration (absent when `CLAUDE_API_KEY` is unset)
    pub claude: Option<ClaudeConfig>,
    /// Firestore configuration (optional - enables the cloud mirror)
    pub firestore: Option<FirestoreConfig>,
}

/// Claude AI API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ClaudeConfig {
    /// Anthropic API key
    pub api_key: SecretString,
    /// Model ID (e.g., claude-sonnet-4-20250514)
    pub model: String,
    /// Messages endpoint
    pub api_url: String,
}

impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Firestore REST configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// OAuth bearer token
    pub token: SecretString,
    /// Collection holding one document per customer
    pub collection: String,
    /// REST base URL
    pub api_url: String,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("token", &"[REDACTED]")
            .field("collection", &self.collection)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl AtlasConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, if the
    /// Firestore variables are only partially set, or if a secret fails
    /// validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`AtlasConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let data_dir = PathBuf::from(env.or_default("ATLAS_DATA_DIR", DEFAULT_DATA_DIR));
        let storage_quota_bytes = env
            .optional("ATLAS_STORAGE_QUOTA_BYTES")
            .map(|v| env.parse::<u64>("ATLAS_STORAGE_QUOTA_BYTES", &v))
            .transpose()?;
        let extraction_policy = env
            .optional("ATLAS_EXTRACTION_POLICY")
            .map(|v| env.parse::<ExtractionPolicy>("ATLAS_EXTRACTION_POLICY", &v))
            .transpose()?
            .unwrap_or_default();
        let enrichment = env
            .optional("ATLAS_ENRICHMENT")
            .map(|v| env.parse::<EnrichmentMode>("ATLAS_ENRICHMENT", &v))
            .transpose()?
            .unwrap_or_default();
        let http_timeout_secs = env
            .optional("ATLAS_HTTP_TIMEOUT_SECS")
            .map(|v| env.parse::<u64>("ATLAS_HTTP_TIMEOUT_SECS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        let auto_sync = env
            .optional("ATLAS_AUTO_SYNC")
            .map(|v| env.parse::<bool>("ATLAS_AUTO_SYNC", &v))
            .transpose()?
            .unwrap_or(true);

        let claude = ClaudeConfig::from_env(&env)?;
        let firestore = FirestoreConfig::from_env(&env)?;

        Ok(Self {
            data_dir,
            storage_quota_bytes,
            extraction_policy,
            enrichment,
            http_timeout: Duration::from_secs(http_timeout_secs),
            auto_sync,
            claude,
            firestore,
        })
    }

    /// Returns a reference to the Firestore configuration, if available.
    ///
    /// Returns `None` if the Firestore variables are not set, which runs the
    /// pipeline in local-only mode.
    #[must_use]
    pub const fn firestore(&self) -> Option<&FirestoreConfig> {
        self.firestore.as_ref()
    }
}

impl ClaudeConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Option<Self>, ConfigError> {
        let Some(key) = env.optional("CLAUDE_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&key, "CLAUDE_API_KEY")?;

        let api_url = env.or_default("CLAUDE_API_URL", DEFAULT_CLAUDE_API_URL);
        validate_url(&api_url, "CLAUDE_API_URL")?;

        Ok(Some(Self {
            api_key: SecretString::from(key),
            model: env.or_default("CLAUDE_MODEL", DEFAULT_CLAUDE_MODEL),
            api_url,
        }))
    }
}

impl FirestoreConfig {
    /// Both `FIRESTORE_PROJECT_ID` and `FIRESTORE_TOKEN` must be set together.
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Option<Self>, ConfigError> {
        let project_id = env.optional("FIRESTORE_PROJECT_ID");
        let token = env.optional("FIRESTORE_TOKEN");

        match (project_id, token) {
            (Some(project_id), Some(token)) => {
                if let Err(e) = validate_secret_strength(&token, "FIRESTORE_TOKEN") {
                    tracing::warn!("FIRESTORE_TOKEN validation warning: {e}");
                }
                let api_url = env.or_default("FIRESTORE_API_URL", DEFAULT_FIRESTORE_API_URL);
                validate_url(&api_url, "FIRESTORE_API_URL")?;

                Ok(Some(Self {
                    project_id,
                    token: SecretString::from(token),
                    collection: env.or_default("FIRESTORE_COLLECTION", "customers"),
                    api_url,
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "FIRESTORE_*".to_string(),
                "Both FIRESTORE_PROJECT_ID and FIRESTORE_TOKEN must be set together".to_string(),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable source; wraps `std::env::var` in production.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

fn validate_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(**p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
