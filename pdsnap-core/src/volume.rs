/*!
Volume identity codec.

Persistent volumes arrive as loosely typed JSON (the shape of a Kubernetes
`PersistentVolume`). A single classification pass turns the interesting part of
`spec` into a [`VolumeSource`]; reading and writing the volume ID then match on
that variant.

Two provisioning schemes are understood:
- the in-tree `spec.gcePersistentDisk` source, whose `pdName` is the volume ID
- the `spec.csi` source of the persistent-disk CSI driver, whose volume handle
  `projects/<p>/zones/<z>/disks/<d>` carries the disk name as its last segment

Volumes provisioned any other way are "not ours": reading yields an empty ID
and no error.
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::observability::PdsnapMetrics;
use crate::handle::{VolumeHandle, PD_CSI_DRIVER};
use crate::{PdsnapError, Result};

/// Key of the in-tree persistent disk source under `spec`
pub const GCE_PERSISTENT_DISK_KEY: &str = "gcePersistentDisk";
/// Key of the CSI source under `spec`
pub const CSI_KEY: &str = "csi";

const GCE_PD_POINTER: &str = "/spec/gcePersistentDisk";
const CSI_POINTER: &str = "/spec/csi";

/// In-tree persistent disk volume source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcePersistentDiskSource {
    pub pd_name: Option<String>,
    pub fs_type: Option<String>,
    pub partition: Option<i64>,
    pub read_only: Option<bool>,
}

/// CSI volume source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsiVolumeSource {
    #[serde(default)]
    pub driver: String,
    #[serde(default)]
    pub volume_handle: String,
    pub fs_type: Option<String>,
    pub read_only: Option<bool>,
    #[serde(default)]
    pub volume_attributes: BTreeMap<String, String>,
}

impl CsiVolumeSource {
    /// Whether the persistent-disk CSI driver provisioned this volume
    pub fn is_pd_driver(&self) -> bool {
        self.driver == PD_CSI_DRIVER
    }

    /// Parse the volume handle, reporting failures as a malformed volume
    pub fn handle(&self) -> Result<VolumeHandle> {
        VolumeHandle::parse(&self.volume_handle).map_err(|e| {
            PdsnapError::malformed_volume(format!("spec.csi.volumeHandle: {e}"))
        })
    }
}

/// How a persistent volume was provisioned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    /// `spec.gcePersistentDisk` is present
    LegacyDisk(GcePersistentDiskSource),
    /// `spec.csi` is present
    Csi(CsiVolumeSource),
    /// Neither source is present
    Other,
}

impl VolumeSource {
    /// Classify a persistent volume.
    ///
    /// The in-tree source is checked before the CSI source. A JSON `null` in
    /// either position counts as absent.
    ///
    /// # Errors
    /// `PdsnapError::MalformedVolume` when the in-tree source, or the CSI source
    /// of the persistent-disk driver, does not have the expected shape. Other
    /// CSI drivers only need a `driver` field to be recognized as foreign.
    pub fn classify(pv: &Value) -> Result<Self> {
        if let Some(gce) = present(pv.pointer(GCE_PD_POINTER)) {
            let source = serde_json::from_value(gce.clone()).map_err(|e| {
                PdsnapError::malformed_volume(format!("spec.{GCE_PERSISTENT_DISK_KEY}: {e}"))
            })?;
            return Ok(Self::LegacyDisk(source));
        }

        if let Some(csi) = present(pv.pointer(CSI_POINTER)) {
            let fields = csi.as_object().ok_or_else(|| {
                PdsnapError::malformed_volume(format!("spec.{CSI_KEY} is not an object"))
            })?;
            let driver = fields.get("driver").and_then(Value::as_str).unwrap_or_default();

            // Only the persistent-disk driver's payload has to be well formed
            let source = match serde_json::from_value(csi.clone()) {
                Ok(source) => source,
                Err(e) if driver == PD_CSI_DRIVER => {
                    return Err(PdsnapError::malformed_volume(format!("spec.{CSI_KEY}: {e}")));
                }
                Err(_) => CsiVolumeSource {
                    driver: driver.to_string(),
                    ..CsiVolumeSource::default()
                },
            };
            return Ok(Self::Csi(source));
        }

        Ok(Self::Other)
    }

    /// Short name of the provisioning scheme
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::LegacyDisk(_) => GCE_PERSISTENT_DISK_KEY,
            Self::Csi(_) => CSI_KEY,
            Self::Other => "other",
        }
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Read the canonical volume ID of a persistent volume.
///
/// Returns an empty string for volumes this codec does not own.
///
/// # Errors
/// `PdsnapError::MalformedVolume` when the in-tree source lacks a `pdName`, or
/// the persistent-disk CSI source carries an unparseable handle.
pub fn get_volume_id(pv: &Value) -> Result<String> {
    #[cfg(feature = "metrics")]
    PdsnapMetrics::global().record_volume_id_read();

    let result = match VolumeSource::classify(pv)? {
        VolumeSource::LegacyDisk(source) => match source.pd_name {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(PdsnapError::malformed_volume(
                "spec.gcePersistentDisk.pdName is missing or empty",
            )),
        },
        VolumeSource::Csi(source) if source.is_pd_driver() => {
            source.handle().map(|handle| handle.disk)
        }
        VolumeSource::Csi(source) => {
            debug!(driver = %source.driver, "Skipping CSI volume from another driver");
            Ok(String::new())
        }
        VolumeSource::Other => Ok(String::new()),
    };

    #[cfg(feature = "metrics")]
    {
        if matches!(result, Err(PdsnapError::MalformedVolume(_))) {
            PdsnapMetrics::global().record_malformed_volume();
        }
    }

    result
}

/// Produce a copy of the persistent volume pointing at another volume ID.
///
/// For CSI volumes the handle is rebuilt from the existing one: the zone is
/// kept, the project becomes `volume_project` when given and non-empty,
/// otherwise the handle's own project.
///
/// # Errors
/// - `PdsnapError::MalformedVolume` when the existing CSI handle is unparseable
/// - `PdsnapError::UnsupportedVolumeType` for volumes of another CSI driver or
///   without any recognized source
pub fn set_volume_id(pv: &Value, volume_id: &str, volume_project: Option<&str>) -> Result<Value> {
    let mut updated = pv.clone();

    match VolumeSource::classify(pv)? {
        VolumeSource::LegacyDisk(_) => {
            let gce = updated
                .pointer_mut(GCE_PD_POINTER)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    PdsnapError::malformed_volume("spec.gcePersistentDisk is not an object")
                })?;
            gce.insert("pdName".to_string(), Value::String(volume_id.to_string()));
        }
        VolumeSource::Csi(source) if source.is_pd_driver() => {
            let original = source.handle()?;
            let project = volume_project
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| original.project.clone());
            let handle = original.with_project(project).with_disk(volume_id);

            let csi = updated
                .pointer_mut(CSI_POINTER)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| PdsnapError::malformed_volume("spec.csi is not an object"))?;
            csi.insert("volumeHandle".to_string(), Value::String(handle.to_string()));

            debug!(volume_handle = %handle, "Rewrote CSI volume handle");
        }
        VolumeSource::Csi(source) => {
            return Err(PdsnapError::unsupported_volume_type(format!(
                "CSI driver {:?} is not {PD_CSI_DRIVER}",
                source.driver
            )));
        }
        VolumeSource::Other => {
            return Err(PdsnapError::unsupported_volume_type(
                "unable to find spec.gcePersistentDisk or spec.csi",
            ));
        }
    }

    #[cfg(feature = "metrics")]
    PdsnapMetrics::global().record_volume_id_write();

    Ok(updated)
}

/// Identity summary of a persistent volume, for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeIdentity {
    pub scheme: String,
    pub driver: Option<String>,
    pub project: Option<String>,
    pub zone: Option<String>,
    pub volume_id: String,
}

impl VolumeIdentity {
    /// Inspect a persistent volume
    pub fn inspect(pv: &Value) -> Result<Self> {
        let source = VolumeSource::classify(pv)?;
        let volume_id = get_volume_id(pv)?;

        let mut identity = Self {
            scheme: source.scheme().to_string(),
            volume_id,
            ..Self::default()
        };

        if let VolumeSource::Csi(csi) = source {
            if csi.is_pd_driver() {
                let handle = csi.handle()?;
                identity.project = Some(handle.project);
                identity.zone = Some(handle.zone);
            }
            identity.driver = Some(csi.driver);
        }

        Ok(identity)
    }
}

/// Name for a disk created from a snapshot during restore
pub fn restore_disk_name() -> String {
    format!("restore-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HANDLE: &str =
        "projects/velero-gcp/zones/us-central1-f/disks/pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d";

    fn csi_pv(csi: Value) -> Value {
        json!({ "spec": { "csi": csi } })
    }

    #[test]
    fn test_get_volume_id_legacy() {
        // missing spec.gcePersistentDisk -> no error
        let mut pv = json!({});
        assert_eq!(get_volume_id(&pv).unwrap(), "");

        // missing spec.gcePersistentDisk.pdName -> error
        pv = json!({ "spec": { "gcePersistentDisk": {} } });
        let err = get_volume_id(&pv).unwrap_err();
        assert!(matches!(err, PdsnapError::MalformedVolume(_)));

        pv = json!({ "spec": { "gcePersistentDisk": { "pdName": "" } } });
        assert!(get_volume_id(&pv).is_err());

        pv = json!({ "spec": { "gcePersistentDisk": { "pdName": "abc123" } } });
        assert_eq!(get_volume_id(&pv).unwrap(), "abc123");
    }

    #[test]
    fn test_get_volume_id_csi() {
        let pv = csi_pv(json!({
            "driver": "pd.csi.storage.gke.io",
            "fsType": "ext4",
            "volumeAttributes": {
                "storage.kubernetes.io/csiProvisionerIdentity": "1637243273131-8081-pd.csi.storage.gke.io"
            },
            "volumeHandle": HANDLE
        }));
        assert_eq!(
            get_volume_id(&pv).unwrap(),
            "pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d"
        );

        let pv = csi_pv(json!({
            "driver": "pd.csi.storage.gke.io",
            "fsType": "ext4",
            "volumeHandle": "pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d"
        }));
        let err = get_volume_id(&pv).unwrap_err();
        assert!(matches!(err, PdsnapError::MalformedVolume(_)));

        let pv = csi_pv(json!({
            "driver": "xxx.csi.storage.gke.io",
            "fsType": "ext4",
            "volumeHandle": "pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d"
        }));
        assert_eq!(get_volume_id(&pv).unwrap(), "");
    }

    #[test]
    fn test_classify_prefers_legacy_and_ignores_null() {
        let pv = json!({
            "spec": {
                "gcePersistentDisk": { "pdName": "legacy" },
                "csi": { "driver": PD_CSI_DRIVER, "volumeHandle": HANDLE }
            }
        });
        assert!(matches!(
            VolumeSource::classify(&pv).unwrap(),
            VolumeSource::LegacyDisk(_)
        ));

        let pv = json!({ "spec": { "gcePersistentDisk": null, "csi": null } });
        assert_eq!(VolumeSource::classify(&pv).unwrap(), VolumeSource::Other);
    }

    #[test]
    fn test_classify_rejects_wrong_shapes() {
        let pv = json!({ "spec": { "gcePersistentDisk": "disk-1" } });
        assert!(matches!(
            VolumeSource::classify(&pv),
            Err(PdsnapError::MalformedVolume(_))
        ));

        let pv = json!({ "spec": { "gcePersistentDisk": { "pdName": 42 } } });
        assert!(VolumeSource::classify(&pv).is_err());

        let pv = csi_pv(json!(["not", "an", "object"]));
        assert!(VolumeSource::classify(&pv).is_err());

        let pv = csi_pv(json!({ "driver": PD_CSI_DRIVER, "volumeAttributes": { "size": 10 } }));
        assert!(matches!(
            VolumeSource::classify(&pv),
            Err(PdsnapError::MalformedVolume(_))
        ));
    }

    #[test]
    fn test_foreign_csi_driver_with_unexpected_fields() {
        let pv = csi_pv(json!({
            "driver": "ebs.csi.aws.com",
            "volumeHandle": "vol-0123",
            "volumeAttributes": { "iops": 3000, "encrypted": true }
        }));

        match VolumeSource::classify(&pv).unwrap() {
            VolumeSource::Csi(source) => {
                assert_eq!(source.driver, "ebs.csi.aws.com");
                assert!(!source.is_pd_driver());
            }
            other => panic!("Expected CSI source, got {other:?}"),
        }
        assert_eq!(get_volume_id(&pv).unwrap(), "");
        assert!(matches!(
            set_volume_id(&pv, "restore-1", None),
            Err(PdsnapError::UnsupportedVolumeType(_))
        ));
    }

    #[test]
    fn test_set_volume_id_legacy() {
        // missing spec.gcePersistentDisk -> error
        let err = set_volume_id(&json!({}), "abc123", None).unwrap_err();
        assert!(matches!(err, PdsnapError::UnsupportedVolumeType(_)));

        let pv = json!({ "spec": { "gcePersistentDisk": { "fsType": "ext4" } } });
        let updated = set_volume_id(&pv, "123abc", None).unwrap();
        assert_eq!(updated["spec"]["gcePersistentDisk"]["pdName"], "123abc");
        assert_eq!(updated["spec"]["gcePersistentDisk"]["fsType"], "ext4");
        assert_eq!(get_volume_id(&updated).unwrap(), "123abc");

        // input untouched
        assert!(pv["spec"]["gcePersistentDisk"].get("pdName").is_none());
    }

    #[test]
    fn test_set_volume_id_csi() {
        let new_id = "restore-fd9729b5-868b-4544-9568-1c5d9121dabc";
        let pv = csi_pv(json!({
            "driver": "pd.csi.storage.gke.io",
            "fsType": "ext4",
            "volumeHandle": HANDLE
        }));

        let updated = set_volume_id(&pv, new_id, Some("velero-gcp")).unwrap();
        assert_eq!(
            updated["spec"]["csi"]["volumeHandle"],
            format!("projects/velero-gcp/zones/us-central1-f/disks/{new_id}")
        );
        assert_eq!(updated["spec"]["csi"]["fsType"], "ext4");

        let updated = set_volume_id(&pv, new_id, Some("velero-gcp-2")).unwrap();
        assert_eq!(
            updated["spec"]["csi"]["volumeHandle"],
            format!("projects/velero-gcp-2/zones/us-central1-f/disks/{new_id}")
        );

        let updated = set_volume_id(&pv, new_id, None).unwrap();
        assert_eq!(
            updated["spec"]["csi"]["volumeHandle"],
            format!("projects/velero-gcp/zones/us-central1-f/disks/{new_id}")
        );
        assert_eq!(get_volume_id(&updated).unwrap(), new_id);
        assert_eq!(pv["spec"]["csi"]["volumeHandle"], HANDLE);
    }

    #[test]
    fn test_set_volume_id_csi_empty_project_keeps_handle_project() {
        let pv = csi_pv(json!({ "driver": PD_CSI_DRIVER, "volumeHandle": HANDLE }));

        let updated = set_volume_id(&pv, "restore-1", Some("")).unwrap();
        assert_eq!(
            updated["spec"]["csi"]["volumeHandle"],
            "projects/velero-gcp/zones/us-central1-f/disks/restore-1"
        );
        assert_eq!(get_volume_id(&updated).unwrap(), "restore-1");
    }

    #[test]
    fn test_set_volume_id_csi_errors() {
        let pv = csi_pv(json!({
            "driver": "pd.csi.storage.gke.io",
            "volumeHandle": "pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d"
        }));
        assert!(matches!(
            set_volume_id(&pv, "restore-1", Some("velero-gcp")),
            Err(PdsnapError::MalformedVolume(_))
        ));

        let pv = csi_pv(json!({
            "driver": "xxx.csi.storage.gke.io",
            "volumeHandle": HANDLE
        }));
        assert!(matches!(
            set_volume_id(&pv, "restore-1", Some("velero-gcp")),
            Err(PdsnapError::UnsupportedVolumeType(_))
        ));
    }

    #[test]
    fn test_inspect_csi_volume() {
        let pv = csi_pv(json!({ "driver": PD_CSI_DRIVER, "volumeHandle": HANDLE }));
        let identity = VolumeIdentity::inspect(&pv).unwrap();
        assert_eq!(identity.scheme, "csi");
        assert_eq!(identity.driver.as_deref(), Some(PD_CSI_DRIVER));
        assert_eq!(identity.project.as_deref(), Some("velero-gcp"));
        assert_eq!(identity.zone.as_deref(), Some("us-central1-f"));
        assert_eq!(identity.volume_id, "pvc-a970184f-6cc1-4769-85ad-61dcaf8bf51d");

        let identity = VolumeIdentity::inspect(&json!({})).unwrap();
        assert_eq!(identity.scheme, "other");
        assert_eq!(identity.volume_id, "");
    }

    #[test]
    fn test_restore_disk_name() {
        let first = restore_disk_name();
        let second = restore_disk_name();
        assert!(first.starts_with("restore-"));
        assert_eq!(first.len(), "restore-".len() + 36);
        assert_ne!(first, second);
    }
}
