/*!
# pdsnap Core

Volume identity codec and snapshot tag reconciler for persistent-disk backups.

This crate holds the parsing and decision rules a backup orchestrator needs when
snapshotting and restoring persistent-disk volumes:

- Reading and writing the canonical volume ID of a persistent volume, for both
  the in-tree `gcePersistentDisk` source and the persistent-disk CSI driver
- Parsing zone tokens, including multi-zone tokens of regional disks
- Merging operator tags with tags encoded in a disk's description
- Detecting volumes provisioned in another project

Everything here is synchronous and side-effect free apart from logging. Remote
API calls, credentials and retries belong to the caller.

## Usage

```rust
use std::collections::HashMap;
use pdsnap_core::{get_snapshot_tags, zone, PluginConfig, VolumeSnapshotter};
use serde_json::json;

let snapshotter = VolumeSnapshotter::new(PluginConfig::with_volume_project("velero-gcp"));

let pv = json!({ "spec": { "gcePersistentDisk": { "pdName": "disk-1" } } });
assert_eq!(snapshotter.get_volume_id(&pv)?, "disk-1");

let restored = snapshotter.set_volume_id(&pv, "restore-disk-1")?;
assert_eq!(snapshotter.get_volume_id(&restored)?, "restore-disk-1");

assert_eq!(zone::parse_region("us-central1-a__us-central1-b")?, "us-central1");

let tags = get_snapshot_tags(HashMap::from([("k", "v")]), "");
assert_eq!(tags, r#"{"k":"v"}"#);
# Ok::<(), pdsnap_core::PdsnapError>(())
```
*/

pub mod config;
pub mod error;
pub mod handle;
pub mod observability;
pub mod snapshotter;
pub mod tags;
pub mod volume;
pub mod zone;


pub use config::PluginConfig;
pub use error::{PdsnapError, Result};
pub use handle::{VolumeHandle, PD_CSI_DRIVER};
pub use snapshotter::{VolumeIdentityCodec, VolumeSnapshotter};
pub use tags::{get_snapshot_tags, reconcile_tags, TagDecodeWarning, TagReconciliation, TagSet};
pub use volume::{get_volume_id, restore_disk_name, set_volume_id, VolumeIdentity, VolumeSource};
pub use zone::{is_multi_zone, parse_region, ZoneToken};
