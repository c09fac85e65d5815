/*!
Zone token parsing.

A zone token names a single zone (`us-central1-a`) or, for regional disks
replicated across zones, several zones joined by [`MULTI_ZONE_SEPARATOR`]
(`us-central1-a__us-central1-b`). Every zone in a token belongs to one region.
*/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{PdsnapError, Result};

/// Separator joining the zones of a multi-zone token
pub const MULTI_ZONE_SEPARATOR: &str = "__";

static ZONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<region>[a-z0-9]+(?:-[a-z0-9]+)*)-(?P<suffix>[a-z])$")
        .expect("Invalid zone regex")
});

/// Returns true when the token joins more than one zone.
///
/// Purely syntactic; a malformed token can still be multi-zone.
pub fn is_multi_zone(token: &str) -> bool {
    token.contains(MULTI_ZONE_SEPARATOR)
}

/// Region shared by every zone in the token.
///
/// # Errors
/// `PdsnapError::RegionParse` naming the whole token when any zone is malformed
/// or when the zones do not share a region.
///
/// # Example
/// ```rust
/// use pdsnap_core::zone::parse_region;
///
/// assert_eq!(parse_region("us-central1-a__us-central1-b").unwrap(), "us-central1");
/// assert!(parse_region("us^central1^a").is_err());
/// ```
pub fn parse_region(token: &str) -> Result<String> {
    ZoneToken::parse(token).map(|parsed| parsed.region)
}

/// A validated zone token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneToken {
    /// Zones in the order they appear in the token
    pub zones: Vec<String>,
    /// Region common to all zones
    pub region: String,
}

impl ZoneToken {
    /// Parse and validate a zone token
    pub fn parse(token: &str) -> Result<Self> {
        let mut zones = Vec::new();
        let mut region: Option<&str> = None;

        for zone in token.split(MULTI_ZONE_SEPARATOR) {
            let zone_region = region_of(zone).ok_or_else(|| PdsnapError::region_parse(token))?;

            match region {
                Some(existing) if existing != zone_region => {
                    return Err(PdsnapError::region_parse(token));
                }
                Some(_) => {}
                None => region = Some(zone_region),
            }

            zones.push(zone.to_string());
        }

        let region = region.ok_or_else(|| PdsnapError::region_parse(token))?;

        Ok(Self {
            zones,
            region: region.to_string(),
        })
    }

    /// Whether the disk spans more than one zone
    pub fn is_multi_zone(&self) -> bool {
        self.zones.len() > 1
    }

    /// Zone resource URLs (`projects/<project>/zones/<zone>`) for regional disk replicas
    pub fn replica_zone_urls(&self, project: &str) -> Vec<String> {
        self.zones
            .iter()
            .map(|zone| format!("projects/{project}/zones/{zone}"))
            .collect()
    }
}

fn region_of(zone: &str) -> Option<&str> {
    ZONE_REGEX
        .captures(zone)
        .and_then(|captures| captures.name("region"))
        .map(|region| region.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_helpers() {
        let cases = [
            ("us-central1-a__us-central1-b", Some("us-central1"), true),
            (
                "us-central1-a__us-central1-b__us-central1-f__us-central1-e",
                Some("us-central1"),
                true,
            ),
            ("us-central1-a", Some("us-central1"), false),
            ("europe-west4-c", Some("europe-west4"), false),
            ("us^central1^a", None, false),
            ("us^central1^a__us^central1^b", None, true),
        ];

        for (token, expected_region, expected_multi_zone) in cases {
            assert_eq!(is_multi_zone(token), expected_multi_zone, "{token}");
            match expected_region {
                Some(region) => assert_eq!(parse_region(token).unwrap(), region),
                None => {
                    let err = parse_region(token).unwrap_err();
                    assert_eq!(
                        err.to_string(),
                        format!("failed to parse region from zone: \"{token}\"")
                    );
                }
            }
        }
    }

    #[test]
    fn test_error_names_full_multi_zone_token() {
        let token = "us-central1-a__bogus";
        let err = parse_region(token).unwrap_err();
        assert!(matches!(err, PdsnapError::RegionParse { ref zone } if zone == token));
    }

    #[test]
    fn test_mixed_regions_rejected() {
        let token = "us-central1-a__europe-west4-b";
        assert!(is_multi_zone(token));
        let err = parse_region(token).unwrap_err();
        assert!(err.to_string().contains(token));
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(parse_region("").is_err());
        assert!(parse_region("us-central1-a__").is_err());
        assert!(parse_region("__us-central1-a").is_err());
        assert!(parse_region("us-central1").is_err());
        assert!(parse_region("us-central1-A").is_err());
    }

    #[test]
    fn test_zone_token_replica_urls() {
        let token = ZoneToken::parse("us-central1-a__us-central1-b").unwrap();
        assert!(token.is_multi_zone());
        assert_eq!(
            token.replica_zone_urls("velero-gcp"),
            vec![
                "projects/velero-gcp/zones/us-central1-a".to_string(),
                "projects/velero-gcp/zones/us-central1-b".to_string(),
            ]
        );

        let single = ZoneToken::parse("us-central1-f").unwrap();
        assert!(!single.is_multi_zone());
        assert_eq!(single.zones, vec!["us-central1-f".to_string()]);
    }
}
