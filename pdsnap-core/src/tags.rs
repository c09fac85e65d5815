/*!
Snapshot tag reconciliation.

Disks created before native labels existed carry their tags as a JSON object in
the free-form description field. When a snapshot is taken, those tags are merged
with the tags supplied by the operator; operator tags win on collision.

A description that cannot be decoded never fails the snapshot. It is reported
as a [`TagDecodeWarning`] and the disk contributes no tags.
*/

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use crate::observability::PdsnapMetrics;

/// Tag key/value map. Ordered so encoded output is stable.
pub type TagSet = BTreeMap<String, String>;

/// Why a disk description could not be used as a tag source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDecodeWarning {
    /// The description as found on the disk
    pub description: String,
    /// Decoder error message
    pub reason: String,
}

impl fmt::Display for TagDecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to decode disk description {:?} as JSON tags: {}",
            self.description, self.reason
        )
    }
}

/// Outcome of merging operator tags with disk description tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReconciliation {
    /// Disk tags overlaid with operator tags
    pub tags: TagSet,
    /// Set when the disk description could not be decoded
    pub warning: Option<TagDecodeWarning>,
}

impl TagReconciliation {
    /// Whether the merge produced no tags at all
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Encode the merged tags as a JSON object, or `""` when there are none
    pub fn encode(&self) -> String {
        if self.tags.is_empty() {
            return String::new();
        }

        match serde_json::to_string(&self.tags) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode snapshot tags");
                String::new()
            }
        }
    }
}

/// Decode a disk description into tags.
///
/// A JSON `null` is an empty tag set; anything that is not an object of
/// string values is a warning.
pub fn decode_disk_tags(description: &str) -> Result<TagSet, TagDecodeWarning> {
    serde_json::from_str::<Option<TagSet>>(description)
        .map(Option::unwrap_or_default)
        .map_err(|e| TagDecodeWarning {
            description: description.to_string(),
            reason: e.to_string(),
        })
}

/// Merge disk description tags with operator tags, operator tags taking precedence.
pub fn reconcile_tags<I, K, V>(operator_tags: I, disk_description: &str) -> TagReconciliation
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let (mut tags, warning) = match decode_disk_tags(disk_description) {
        Ok(disk_tags) => (disk_tags, None),
        Err(warning) => (TagSet::new(), Some(warning)),
    };

    for (key, value) in operator_tags {
        tags.insert(key.into(), value.into());
    }

    TagReconciliation { tags, warning }
}

/// Compute the encoded tag string for a snapshot of a disk.
///
/// Decode failures of the description are logged and otherwise ignored.
///
/// # Example
/// ```rust
/// use std::collections::HashMap;
/// use pdsnap_core::get_snapshot_tags;
///
/// let operator = HashMap::from([("backup".to_string(), "nightly".to_string())]);
/// let tags = get_snapshot_tags(&operator, r#"{"team":"storage"}"#);
/// assert_eq!(tags, r#"{"backup":"nightly","team":"storage"}"#);
///
/// assert_eq!(get_snapshot_tags(HashMap::<String, String>::new(), ""), "");
/// ```
pub fn get_snapshot_tags<I, K, V>(operator_tags: I, disk_description: &str) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let reconciliation = reconcile_tags(operator_tags, disk_description);

    if let Some(warning) = &reconciliation.warning {
        warn!(
            description = %warning.description,
            error = %warning.reason,
            "Unable to decode disk description as JSON tags, applying operator tags only"
        );
        #[cfg(feature = "metrics")]
        PdsnapMetrics::global().record_tag_decode_fallback();
    }

    debug!(tag_count = reconciliation.tags.len(), "Reconciled snapshot tags");
    reconciliation.encode()
}
