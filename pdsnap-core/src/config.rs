//! Configuration for the volume snapshotter
//!
//! The snapshotter is configured once from a string map handed over by the
//! backup orchestrator. The resolved configuration is immutable afterwards.
//!
//! Resolution rules:
//! - `credentialsFile`, falling back to the `GOOGLE_APPLICATION_CREDENTIALS`
//!   environment variable
//! - `volumeProject`, falling back to the `project_id` of the credentials file
//! - `project`, falling back to the resolved volume project
//! - `snapshotLocation`, informational only

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{PdsnapError, Result};

/// Operating project used for snapshot operations
pub const PROJECT_KEY: &str = "project";
/// Path to a service account credentials payload
pub const CREDENTIALS_FILE_KEY: &str = "credentialsFile";
/// Snapshot storage location label
pub const SNAPSHOT_LOCATION_KEY: &str = "snapshotLocation";
/// Project owning the volumes, used when rewriting volume handles on restore
pub const VOLUME_PROJECT_KEY: &str = "volumeProject";

/// Environment variable consulted when no credentials file is configured
pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const KNOWN_KEYS: [&str; 4] = [
    PROJECT_KEY,
    CREDENTIALS_FILE_KEY,
    SNAPSHOT_LOCATION_KEY,
    VOLUME_PROJECT_KEY,
];

/// Resolved snapshotter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Project where snapshots are created
    pub snapshot_project: Option<String>,
    /// Project owning the source volumes
    pub volume_project: Option<String>,
    /// Snapshot location label
    pub snapshot_location: Option<String>,
    /// Resolved credentials file path
    pub credentials_file: Option<PathBuf>,
}

#[derive(Deserialize)]
struct CredentialsPayload {
    #[serde(default)]
    project_id: Option<String>,
}

impl PluginConfig {
    /// Resolve configuration from the orchestrator's config map and the process environment
    pub fn from_map(config: &HashMap<String, String>) -> Result<Self> {
        Self::from_map_with_env(config, |name| std::env::var(name).ok())
    }

    /// Resolve configuration using the given environment lookup
    ///
    /// # Errors
    /// Returns `PdsnapError::Config` when the credentials file is needed to
    /// resolve the volume project but cannot be read or parsed.
    pub fn from_map_with_env<F>(config: &HashMap<String, String>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in config.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            debug!(key = %key, "Ignoring unrecognized config key");
        }

        let credentials_file = lookup(config, CREDENTIALS_FILE_KEY)
            .or_else(|| env(CREDENTIALS_ENV_VAR).and_then(non_empty))
            .map(PathBuf::from);

        let volume_project = match lookup(config, VOLUME_PROJECT_KEY) {
            Some(project) => Some(project),
            None => match &credentials_file {
                Some(path) => credentials_project_id(path)?,
                None => None,
            },
        };

        let snapshot_project = lookup(config, PROJECT_KEY).or_else(|| volume_project.clone());

        let resolved = Self {
            snapshot_project,
            volume_project,
            snapshot_location: lookup(config, SNAPSHOT_LOCATION_KEY),
            credentials_file,
        };

        debug!(
            snapshot_project = ?resolved.snapshot_project,
            volume_project = ?resolved.volume_project,
            snapshot_location = ?resolved.snapshot_location,
            "Resolved snapshotter configuration"
        );

        Ok(resolved)
    }

    /// Configuration with only a volume project set
    pub fn with_volume_project(project: impl Into<String>) -> Self {
        let project = project.into();
        Self {
            snapshot_project: Some(project.clone()),
            volume_project: Some(project),
            ..Self::default()
        }
    }
}

fn lookup(config: &HashMap<String, String>, key: &str) -> Option<String> {
    config.get(key).cloned().and_then(non_empty)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read the `project_id` field of a service account credentials file
pub fn credentials_project_id(path: &Path) -> Result<Option<String>> {
    let raw = std::fs::read(path).map_err(|e| {
        PdsnapError::config(format!(
            "failed to read credentials file {}: {e}",
            path.display()
        ))
    })?;

    let payload: CredentialsPayload = serde_json::from_slice(&raw).map_err(|e| {
        PdsnapError::config(format!(
            "failed to parse credentials file {}: {e}",
            path.display()
        ))
    })?;

    Ok(payload.project_id.and_then(non_empty))
}
