use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the inspector.
///
/// Only `ArchiveOpen` and `ExternalLoad` abort a load; every other variant
/// is contained to the object or entity it names and logged where it occurs.
#[derive(Debug, Error)]
pub enum InspectError {
    /// The archive is unreadable, corrupt, or reports itself encrypted.
    #[error("failed to open archive {}: {reason}", path.display())]
    ArchiveOpen { path: PathBuf, reason: String },

    /// A single archive object failed to decode; the scan continues past it.
    #[error("object {id} ({tag}) could not be decoded: {reason}")]
    ObjectDecode {
        id: i64,
        tag: &'static str,
        reason: String,
    },

    /// The GPU rejected the entity's image data; it renders untextured.
    #[error("texture upload rejected for {name}: {reason}")]
    TextureUpload { name: String, reason: String },

    /// A generic model file could not be read or parsed.
    #[error("failed to load model file {}: {reason}", path.display())]
    ExternalLoad { path: PathBuf, reason: String },

    /// A single entity failed to export; the batch continues past it.
    #[error("failed to export {name}: {reason}")]
    Export { name: String, reason: String },
}
