//! Error types for the filter builder

use crate::types::{ClauseId, GroupId};
use thiserror::Error;

/// Result type alias for filter-builder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for filter-builder operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("Field catalog has not finished loading")]
    CatalogNotLoaded,

    #[error("Field catalog is already loaded")]
    CatalogAlreadyLoaded,

    #[error("Malformed field catalog: {0}")]
    MalformedCatalog(#[source] serde_json::Error),

    #[error("Field not found in catalog: {0}")]
    FieldNotFound(String),

    #[error("Field {field:?} is already used by clause {owner}")]
    FieldCollision { field: String, owner: ClauseId },

    #[error("No unused field left to filter on")]
    NoAvailableField,

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Clause not found: {0}")]
    ClauseNotFound(ClauseId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
