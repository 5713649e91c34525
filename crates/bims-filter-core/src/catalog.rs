//! Field catalog
//!
//! Parses the backend's "spatial scale filter list" payload into a flat,
//! ordered set of [`FieldDefinition`]s. The payload is a list of scale
//! groups; every direct child of a scale group describes one filterable
//! attribute.
//!
//! ```json
//! [
//!   {"name": "Administrative", "children": [
//!     {"name": "Province", "key": "admin.province",
//!      "value": [{"query": "Western Cape"}, {"query": "Eastern Cape"}]},
//!     {"name": "Site", "key": "site.code", "autocomplete": true}
//!   ]}
//! ]
//! ```
//!
//! The catalog is loaded exactly once and is read-only afterwards.

use crate::error::{Error, Result};
use crate::selection::{ValueToken, ALL_LABEL, ALL_TOKEN};
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

// =============================================================================
// Wire payload
// =============================================================================

/// One node of the nested catalog payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleNode {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub autocomplete: bool,
    #[serde(default)]
    pub value: Vec<ScaleValue>,
    #[serde(default, alias = "layerName")]
    pub layer_name: Option<String>,
    #[serde(default, alias = "wmsUrl")]
    pub wms_url: Option<String>,
    #[serde(default, alias = "wmsFormat")]
    pub wms_format: Option<String>,
    #[serde(default, alias = "layerIdentifier")]
    pub layer_identifier: Option<String>,
    #[serde(default)]
    pub children: Vec<ScaleNode>,
}

impl TreeNode for ScaleNode {
    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl ScaleNode {
    /// The node key, treating an empty string like a missing one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    fn layer_meta(&self) -> LayerMeta {
        LayerMeta {
            layer_name: self.layer_name.clone().unwrap_or_default(),
            wms_url: self.wms_url.clone().unwrap_or_default(),
            wms_format: self.wms_format.clone().unwrap_or_default(),
            layer_identifier: self.layer_identifier.clone().unwrap_or_default(),
        }
    }
}

/// A preloaded value entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaleValue {
    pub query: String,
}

/// Parse a catalog payload from JSON text.
pub fn parse_payload(json: &str) -> Result<Vec<ScaleNode>> {
    serde_json::from_str(json).map_err(Error::MalformedCatalog)
}

/// Read and parse a catalog payload stored on disk.
pub fn read_payload(path: impl AsRef<Path>) -> Result<Vec<ScaleNode>> {
    let json = std::fs::read_to_string(path)?;
    parse_payload(&json)
}

// =============================================================================
// Field definitions
// =============================================================================

/// Map-layer metadata attached to a catalog key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMeta {
    pub layer_name: String,
    pub wms_url: String,
    pub wms_format: String,
    pub layer_identifier: String,
}

/// How the selectable values of a field are obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ValueMode {
    /// Fixed, deduplicated list taken from the payload.
    StaticList { values: Vec<String> },
    /// Values are searched remotely as the user types.
    Autocomplete,
}

/// One filterable attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    /// Dotted `<group>.<layer>` backend identifier, empty when the field has
    /// no map layer.
    pub key: String,
    pub value_mode: ValueMode,
    pub supports_all: bool,
    pub layer_meta: Option<LayerMeta>,
}

impl FieldDefinition {
    pub fn is_autocomplete(&self) -> bool {
        matches!(self.value_mode, ValueMode::Autocomplete)
    }

    /// Preloaded values; empty for autocomplete fields.
    pub fn static_values(&self) -> &[String] {
        match &self.value_mode {
            ValueMode::StaticList { values } => values,
            ValueMode::Autocomplete => &[],
        }
    }

    /// Widget options for a static-list field: ALL first when supported,
    /// then the catalog values in payload order.
    pub fn static_options(&self) -> Vec<ValueOption> {
        let mut options = Vec::with_capacity(self.static_values().len() + 1);
        if self.supports_all {
            options.push(ValueOption::all());
        }
        options.extend(self.static_values().iter().map(|v| ValueOption::value(v)));
        options
    }
}

/// A choice offered by a value widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueOption {
    pub id: String,
    pub text: String,
}

impl ValueOption {
    pub fn all() -> Self {
        Self {
            id: ALL_TOKEN.to_string(),
            text: ALL_LABEL.to_string(),
        }
    }

    pub fn value(value: &str) -> Self {
        Self {
            id: value.to_string(),
            text: value.to_string(),
        }
    }

    pub fn token(&self) -> ValueToken {
        ValueToken::from(self.id.clone())
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// The set of filterable fields, in first-registration order.
#[derive(Debug, Clone, Default)]
pub struct FilterFieldCatalog {
    fields: Vec<FieldDefinition>,
    by_name: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
    layer_meta: HashMap<String, LayerMeta>,
    loaded: bool,
}

impl FilterFieldCatalog {
    /// Create an empty, not-yet-loaded catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a loaded catalog from a parsed payload
    pub fn from_payload(payload: &[ScaleNode]) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load(payload)?;
        Ok(catalog)
    }

    /// Register every field described by `payload` and mark the catalog
    /// loaded. Returns the number of selectable fields.
    ///
    /// Children with neither `autocomplete` nor a usable value list are not
    /// selectable, but their layer metadata is still recorded by key.
    pub fn load(&mut self, payload: &[ScaleNode]) -> Result<usize> {
        if self.loaded {
            return Err(Error::CatalogAlreadyLoaded);
        }

        for scale in payload {
            for child in &scale.children {
                if let Some(key) = child.key() {
                    self.layer_meta
                        .entry(key.to_string())
                        .or_insert_with(|| child.layer_meta());
                }
                self.register(child);
            }
        }

        self.loaded = true;
        info!(fields = self.fields.len(), "Field catalog loaded");
        Ok(self.fields.len())
    }

    /// Parse and load a JSON payload
    pub fn load_json(&mut self, json: &str) -> Result<usize> {
        let payload = parse_payload(json)?;
        self.load(&payload)
    }

    fn register(&mut self, child: &ScaleNode) {
        let value_mode = if child.autocomplete {
            ValueMode::Autocomplete
        } else {
            let mut values: Vec<String> = Vec::new();
            for entry in &child.value {
                if !values.contains(&entry.query) {
                    values.push(entry.query.clone());
                }
            }
            if values.is_empty() {
                debug!(field = %child.name, "Skipping field without values");
                return;
            }
            ValueMode::StaticList { values }
        };

        if self.by_name.contains_key(&child.name) {
            warn!(field = %child.name, "Duplicate field name in catalog, keeping the first");
            return;
        }

        let key = child.key().unwrap_or_default().to_string();
        let layer_meta = child.key().map(|_| child.layer_meta());
        let index = self.fields.len();

        self.by_name.insert(child.name.clone(), index);
        if !key.is_empty() {
            self.by_key.entry(key.clone()).or_insert(index);
        }
        self.fields.push(FieldDefinition {
            name: child.name.clone(),
            key,
            value_mode,
            supports_all: true,
            layer_meta,
        });
    }

    /// Whether the one-time load has completed
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Field names in first-registration order
    pub fn fields_in_definition_order(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// All field definitions in first-registration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Look up a field by its display name
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    /// Look up a field by its backend key
    pub fn field_by_key(&self, key: &str) -> Option<&FieldDefinition> {
        self.by_key.get(key).map(|&i| &self.fields[i])
    }

    /// Layer metadata for a key, including keys of non-selectable children
    pub fn layer_meta(&self, key: &str) -> Option<&LayerMeta> {
        self.layer_meta.get(key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn first(&self) -> Option<&FieldDefinition> {
        self.fields.first()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Vec<ScaleNode> {
        serde_json::from_value(json!([
            {
                "name": "Administrative",
                "children": [
                    {
                        "name": "Province",
                        "key": "admin.province",
                        "layer_name": "Provinces",
                        "wms_url": "https://maps.example/wms",
                        "wms_format": "image/png",
                        "layer_identifier": "province",
                        "value": [
                            {"query": "Western Cape"},
                            {"query": "Eastern Cape"},
                            {"query": "Western Cape"}
                        ]
                    },
                    {"name": "Empty", "key": "admin.empty", "layerName": "Nothing", "value": []},
                    {"name": "Site", "key": "site.code", "autocomplete": true}
                ]
            },
            {"name": "No children"},
            {
                "name": "Hydrology",
                "children": [
                    {"name": "River", "value": [{"query": "Berg"}, {"query": "Breede"}]},
                    {"name": "Province", "key": "other.province", "value": [{"query": "X"}]}
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_load_registers_in_order() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        assert!(catalog.is_loaded());
        let names: Vec<&str> = catalog.fields_in_definition_order().collect();
        assert_eq!(names, vec!["Province", "Site", "River"]);
    }

    #[test]
    fn test_static_values_are_deduplicated() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        let province = catalog.get("Province").unwrap();
        assert_eq!(province.static_values(), ["Western Cape", "Eastern Cape"]);
        assert!(province.supports_all);
        assert_eq!(province.key, "admin.province");
        assert_eq!(
            province.layer_meta.as_ref().unwrap().layer_identifier,
            "province"
        );
    }

    #[test]
    fn test_autocomplete_field_has_no_values() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        let site = catalog.get("Site").unwrap();
        assert!(site.is_autocomplete());
        assert!(site.static_values().is_empty());
        assert!(site.supports_all);
    }

    #[test]
    fn test_empty_field_dropped_but_layer_meta_kept() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        assert!(catalog.get("Empty").is_none());
        assert_eq!(catalog.layer_meta("admin.empty").unwrap().layer_name, "Nothing");
    }

    #[test]
    fn test_lookup_by_key() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        assert_eq!(catalog.field_by_key("site.code").unwrap().name, "Site");
        assert!(catalog.field_by_key("other.province").is_none());
        assert_eq!(catalog.get("River").unwrap().key, "");
    }

    #[test]
    fn test_load_only_once() {
        let mut catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        assert!(matches!(
            catalog.load(&payload()),
            Err(Error::CatalogAlreadyLoaded)
        ));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_malformed_payload_leaves_catalog_unloaded() {
        let mut catalog = FilterFieldCatalog::new();
        let err = catalog.load_json(r#"{"children": 5}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedCatalog(_)));
        assert!(!catalog.is_loaded());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_static_options_put_all_first() {
        let catalog = FilterFieldCatalog::from_payload(&payload()).unwrap();
        let options = catalog.get("River").unwrap().static_options();
        assert_eq!(options[0], ValueOption::all());
        assert_eq!(options[1].id, "Berg");
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].token(), ValueToken::All);
    }
}
