/*!
Error types for the pdsnap core.
*/

use thiserror::Error;

/// Result type used throughout the pdsnap core.
pub type Result<T> = std::result::Result<T, PdsnapError>;

/// Errors that can occur while translating volume identities.
///
/// A volume that belongs to another provisioner is not an error: the codec
/// reports it as an empty volume ID instead.
#[derive(Error, Debug)]
pub enum PdsnapError {
    /// A recognized volume scheme is present but its payload is missing or invalid
    #[error("Malformed volume: {0}")]
    MalformedVolume(String),

    /// The volume matches no scheme this codec can write to
    #[error("Unsupported volume type: {0}")]
    UnsupportedVolumeType(String),

    /// A zone token does not follow the `<region>-<letter>` grammar
    #[error("failed to parse region from zone: {zone:?}")]
    RegionParse { zone: String },

    /// A CSI volume handle does not follow `projects/<p>/zones/<z>/disks/<d>`
    #[error("invalid volume handle: {handle:?}")]
    InvalidHandle { handle: String },

    /// Configuration could not be resolved
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PdsnapError {
    /// Create a new malformed volume error
    pub fn malformed_volume<S: Into<String>>(msg: S) -> Self {
        Self::MalformedVolume(msg.into())
    }

    /// Create a new unsupported volume type error
    pub fn unsupported_volume_type<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedVolumeType(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a region parse error for the full, original zone token
    pub fn region_parse<S: Into<String>>(zone: S) -> Self {
        Self::RegionParse { zone: zone.into() }
    }

    /// Create an invalid handle error
    pub fn invalid_handle<S: Into<String>>(handle: S) -> Self {
        Self::InvalidHandle {
            handle: handle.into(),
        }
    }
}
