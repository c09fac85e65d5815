/*!
CSI volume handle grammar.

The persistent-disk CSI driver identifies a disk with a resource path of the
form `projects/<project>/zones/<zone>/disks/<name>`. Anything else is rejected.
*/

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::{PdsnapError, Result};

/// Driver name that makes a CSI volume handle authoritative for this codec
pub const PD_CSI_DRIVER: &str = "pd.csi.storage.gke.io";

static VOLUME_HANDLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^projects/(?P<project>[^/]+)/zones/(?P<zone>[^/]+)/disks/(?P<disk>[^/]+)$")
        .expect("Invalid volume handle regex")
});

/// A parsed CSI volume handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    pub project: String,
    pub zone: String,
    pub disk: String,
}

impl VolumeHandle {
    /// Create a handle from its three components
    pub fn new(project: impl Into<String>, zone: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            disk: disk.into(),
        }
    }

    /// Parse a handle string
    ///
    /// # Errors
    /// Returns `PdsnapError::InvalidHandle` carrying the full input when the
    /// string is not exactly `projects/<p>/zones/<z>/disks/<d>`.
    ///
    /// # Example
    /// ```rust
    /// use pdsnap_core::VolumeHandle;
    ///
    /// let handle = VolumeHandle::parse("projects/p1/zones/us-central1-f/disks/pvc-1").unwrap();
    /// assert_eq!(handle.project, "p1");
    /// assert_eq!(handle.zone, "us-central1-f");
    /// assert_eq!(handle.disk, "pvc-1");
    /// ```
    pub fn parse(handle: &str) -> Result<Self> {
        let captures = VOLUME_HANDLE_REGEX
            .captures(handle)
            .ok_or_else(|| PdsnapError::invalid_handle(handle))?;

        Ok(Self::new(
            &captures["project"],
            &captures["zone"],
            &captures["disk"],
        ))
    }

    /// Same handle pointing at another disk
    pub fn with_disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = disk.into();
        self
    }

    /// Same handle owned by another project
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }
}

impl fmt::Display for VolumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/zones/{}/disks/{}",
            self.project, self.zone, self.disk
        )
    }
}
