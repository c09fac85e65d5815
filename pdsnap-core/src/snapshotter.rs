/*!
Volume snapshotter front end.

[`VolumeSnapshotter`] binds the pure codec, zone and tag functions to a resolved
[`PluginConfig`]. It is what the backup orchestrator holds on to: configured
once at startup, then shared read-only across threads.
*/

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::PluginConfig;
use crate::handle::VolumeHandle;
use crate::tags::get_snapshot_tags;
use crate::volume;
use crate::zone::ZoneToken;
use crate::{PdsnapError, Result};

/// Volume identity operations the orchestrator relies on
///
/// Allows callers to hold a `Box<dyn VolumeIdentityCodec>` without naming the
/// concrete snapshotter.
pub trait VolumeIdentityCodec: Send + Sync {
    /// Canonical volume ID, or `""` for volumes provisioned by someone else
    fn get_volume_id(&self, pv: &Value) -> Result<String>;

    /// Copy of `pv` rewritten to reference `volume_id`
    fn set_volume_id(&self, pv: &Value, volume_id: &str) -> Result<Value>;
}

/// Configured volume snapshotter
///
/// # Example
/// ```rust
/// use pdsnap_core::{PluginConfig, VolumeSnapshotter};
/// use serde_json::json;
///
/// let snapshotter = VolumeSnapshotter::new(PluginConfig::with_volume_project("restore-project"));
///
/// let pv = json!({
///     "spec": {
///         "csi": {
///             "driver": "pd.csi.storage.gke.io",
///             "volumeHandle": "projects/source-project/zones/us-central1-f/disks/pvc-1"
///         }
///     }
/// });
///
/// assert_eq!(snapshotter.get_volume_id(&pv).unwrap(), "pvc-1");
///
/// let restored = snapshotter.set_volume_id(&pv, "restore-1").unwrap();
/// assert_eq!(
///     restored["spec"]["csi"]["volumeHandle"],
///     "projects/restore-project/zones/us-central1-f/disks/restore-1"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct VolumeSnapshotter {
    config: Arc<PluginConfig>,
}

impl VolumeSnapshotter {
    /// Create a snapshotter from a resolved configuration
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Resolve configuration from the orchestrator's config map and create a snapshotter
    pub fn init(config: &HashMap<String, String>) -> Result<Self> {
        PluginConfig::from_map(config).map(Self::new)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Project where snapshots are created
    pub fn snapshot_project(&self) -> Option<&str> {
        self.config.snapshot_project.as_deref()
    }

    /// Project owning the volumes
    pub fn volume_project(&self) -> Option<&str> {
        self.config.volume_project.as_deref()
    }

    pub fn snapshot_location(&self) -> Option<&str> {
        self.config.snapshot_location.as_deref()
    }

    /// See [`volume::get_volume_id`]
    pub fn get_volume_id(&self, pv: &Value) -> Result<String> {
        volume::get_volume_id(pv)
    }

    /// See [`volume::set_volume_id`]; the configured volume project, if any,
    /// replaces the project of rewritten CSI handles.
    pub fn set_volume_id(&self, pv: &Value, volume_id: &str) -> Result<Value> {
        volume::set_volume_id(pv, volume_id, self.volume_project())
    }

    /// Whether the volume behind `volume_handle` lives outside the configured volume project.
    ///
    /// An unparseable handle answers `false`. With no configured volume project
    /// every parseable handle counts as cross-project.
    pub fn is_volume_created_cross_projects(&self, volume_handle: &str) -> bool {
        let handle = match VolumeHandle::parse(volume_handle) {
            Ok(handle) => handle,
            Err(e) => {
                debug!(error = %e, "Cannot tell whether volume is cross-project");
                return false;
            }
        };

        Some(handle.project.as_str()) != self.volume_project()
    }

    /// Encoded tags for a snapshot of a disk; see [`get_snapshot_tags`]
    pub fn snapshot_tags<I, K, V>(&self, operator_tags: I, disk_description: &str) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        get_snapshot_tags(operator_tags, disk_description)
    }

    /// Replica zone URLs for restoring a multi-zone disk; empty for a single zone.
    ///
    /// Zones are addressed within the volume project, falling back to the
    /// snapshot project.
    ///
    /// # Errors
    /// - `PdsnapError::RegionParse` for a malformed zone token
    /// - `PdsnapError::Config` when a multi-zone token needs a project and none is configured
    pub fn replica_zones(&self, zone_token: &str) -> Result<Vec<String>> {
        let token = ZoneToken::parse(zone_token)?;
        if !token.is_multi_zone() {
            return Ok(Vec::new());
        }

        let project = self
            .volume_project()
            .or_else(|| self.snapshot_project())
            .ok_or_else(|| {
                PdsnapError::config("no volume or snapshot project configured for replica zones")
            })?;

        Ok(token.replica_zone_urls(project))
    }
}

impl VolumeIdentityCodec for VolumeSnapshotter {
    fn get_volume_id(&self, pv: &Value) -> Result<String> {
        self.get_volume_id(pv)
    }

    fn set_volume_id(&self, pv: &Value, volume_id: &str) -> Result<Value> {
        self.set_volume_id(pv, volume_id)
    }
}
