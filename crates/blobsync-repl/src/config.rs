//! Replication configuration, resolved once at startup.

use std::time::Duration;

use crate::credentials::CredentialMaterial;
use crate::error::{ReplError, Result};
use crate::retry::RetryPolicy;

/// Default transfer chunk size: 8 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Largest accepted transfer chunk size: 256 MiB.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024;

/// Destination container name.
pub const ENV_DEST_BUCKET: [&str; 2] = ["DEST_BUCKET", "GCS_BUCKET"];
/// Raw service-account JSON.
pub const ENV_SA_KEY: [&str; 2] = ["DEST_SA_KEY", "GCP_SA_KEY"];
/// Base64-encoded service-account JSON.
pub const ENV_SA_KEY_B64: [&str; 2] = ["DEST_SA_KEY_B64", "GCP_SA_KEY_B64"];
/// Maximum transfer attempts.
pub const ENV_RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
/// Backoff unit in whole seconds.
pub const ENV_RETRY_BACKOFF_SEC: &str = "RETRY_BACKOFF_SEC";
/// Chunk size in bytes.
pub const ENV_CHUNK_BYTES: &str = "TRANSFER_CHUNK_BYTES";

/// Immutable process-wide configuration passed into the orchestrator.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Container objects are replicated into.
    pub destination_container: String,
    /// Retry policy for transfers.
    pub retry: RetryPolicy,
    /// Bytes read and written per chunk.
    pub chunk_size: usize,
    /// Secret used to obtain the destination handle.
    pub credentials: CredentialMaterial,
}

impl ReplConfig {
    /// Create a config with default retry and chunk settings.
    pub fn new(destination_container: &str, credentials: CredentialMaterial) -> Self {
        Self {
            destination_container: destination_container.to_string(),
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            credentials,
        }
    }

    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` for variable values. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| first_set(&lookup, names);

        let destination_container = get(&ENV_DEST_BUCKET[..]).ok_or_else(|| {
            ReplError::config(format!("{} is required", ENV_DEST_BUCKET[0]))
        })?;

        let credentials =
            CredentialMaterial::from_parts(get(&ENV_SA_KEY[..]), get(&ENV_SA_KEY_B64[..]))?;

        let max_attempts: u32 = parse_or(get(&[ENV_RETRY_ATTEMPTS][..]), ENV_RETRY_ATTEMPTS, 3)?;
        if max_attempts == 0 {
            return Err(ReplError::config(format!("{} must be at least 1", ENV_RETRY_ATTEMPTS)));
        }
        let backoff_secs: u64 = parse_or(get(&[ENV_RETRY_BACKOFF_SEC][..]), ENV_RETRY_BACKOFF_SEC, 2)?;

        let chunk_size: usize = parse_or(get(&[ENV_CHUNK_BYTES][..]), ENV_CHUNK_BYTES, DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ReplError::config(format!(
                "{} must be between 1 and {}",
                ENV_CHUNK_BYTES, MAX_CHUNK_SIZE
            )));
        }

        Ok(Self {
            destination_container,
            retry: RetryPolicy::new(max_attempts, Duration::from_secs(backoff_secs)),
            chunk_size,
            credentials,
        })
    }
}

fn first_set<F>(lookup: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> Result<T> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ReplError::config(format!("{} is not a valid number: {:?}", name, v))),
    }
}
