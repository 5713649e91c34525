//! BIMS Filter Core - advanced spatial filter builder
//!
//! The in-memory model behind the advanced spatial filter of the BIMS
//! biodiversity portal: a catalog of filterable fields, groups of clauses
//! over those fields, and the expression handed to the search endpoint.
//!
//! # Features
//! - One-time field catalog load from the backend's nested payload
//! - Global field exclusivity: a field is filtered by at most one clause
//! - Exclusive ALL selection per clause
//! - Human-readable preview and boolean search expression
//! - Restore from a serialized selection (URL, bookmark), deferred until the
//!   catalog is loaded
//!
//! # Quick Start
//! ```rust,no_run
//! use bims_filter_core::{FilterBuilder, FilterConfig, ValueToken};
//!
//! let payload = r#"[{"name": "Boundaries", "children": [
//!     {"name": "Province", "key": "admin.province",
//!      "value": [{"query": "Western Cape"}, {"query": "Eastern Cape"}]}
//! ]}]"#;
//!
//! let mut builder = FilterBuilder::new(FilterConfig::default()).unwrap();
//! builder.on_catalog_json(payload).unwrap();
//!
//! // Loading seeds one group with a clause on the first field
//! let clause = builder.groups()[0].clauses[0].id;
//! builder
//!     .set_clause_values(clause, &[ValueToken::value("Western Cape")])
//!     .unwrap();
//!
//! assert_eq!(builder.to_expr(), r#"Province == "Western Cape""#);
//! ```

pub mod autocomplete;
pub mod builder;
pub mod catalog;
pub mod error;
pub mod filter;
pub mod layers;
pub mod restore;
pub mod selection;
pub mod tree;
pub mod types;

// Re-exports
pub use autocomplete::{AutocompleteHit, AutocompleteQuery, AutocompleteTracker, Ticket};
pub use builder::{
    Availability, Clause, ClauseAvailability, ClauseSeed, FilterBuilder, Group,
    GroupAvailability, GroupSeed, SelectedFilter,
};
pub use catalog::{
    FieldDefinition, FilterFieldCatalog, LayerMeta, ScaleNode, ScaleValue, ValueMode, ValueOption,
};
pub use error::{Error, Result};
pub use filter::{Filter, NO_FILTERS};
pub use layers::SelectedLayers;
pub use restore::{
    DropReason, DroppedClause, RestoreOutcome, RestoreReport, SerializedClause, SerializedGroup,
};
pub use selection::{Applied, Selection, ValueToken, ALL_LABEL, ALL_TOKEN};
pub use types::{ClauseId, GroupId};

use serde::{Deserialize, Serialize};

/// Backend endpoints the filter talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoints {
    /// Spatial scale filter list (field catalog)
    pub catalog_url: String,
    /// Location-context autocomplete
    pub autocomplete_url: String,
    /// Search endpoint receiving the expression
    pub search_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            catalog_url: "/api/spatial-scale-filter-list/".to_string(),
            autocomplete_url: "/api/location-context-autocomplete/".to_string(),
            search_url: "/api/collection/search/".to_string(),
        }
    }
}

/// Filter builder configuration.
///
/// Everything the widget needs from its host page is passed in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    pub endpoints: Endpoints,
    /// CSRF token attached to backend requests
    pub csrf_token: Option<String>,
    /// Selection restored once the catalog has loaded
    pub initial_selection: Option<Vec<SerializedGroup>>,
    /// Shortest search term that triggers an autocomplete lookup
    pub autocomplete_min_chars: usize,
    /// How long a field-collision warning stays visible
    pub warning_timeout_ms: u32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            csrf_token: None,
            initial_selection: None,
            autocomplete_min_chars: 0,
            warning_timeout_ms: 3000,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        let endpoints = [
            ("catalogUrl", &self.endpoints.catalog_url),
            ("autocompleteUrl", &self.endpoints.autocomplete_url),
            ("searchUrl", &self.endpoints.search_url),
        ];
        for (name, url) in endpoints {
            if url.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}
