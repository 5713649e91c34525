//! Hand-off of the current selection to the map highlighter

use crate::builder::FilterBuilder;
use crate::catalog::LayerMeta;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selected values per catalog key, with the layer metadata of each key.
///
/// A [`Selection::All`] entry means "highlight the whole layer".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedLayers {
    pub layers: BTreeMap<String, Selection>,
    pub meta: BTreeMap<String, LayerMeta>,
}

impl SelectedLayers {
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl FilterBuilder {
    /// Layers touched by clauses that have a key and at least one value
    pub fn get_selected_layers(&self) -> SelectedLayers {
        let mut selected = SelectedLayers::default();
        for clause in self.groups.iter().flat_map(|g| g.clauses.iter()) {
            if clause.key.is_empty() || clause.selection.is_empty() {
                continue;
            }
            selected
                .layers
                .insert(clause.key.clone(), clause.selection.clone());
            if let Some(meta) = self.catalog.layer_meta(&clause.key) {
                selected.meta.insert(clause.key.clone(), meta.clone());
            }
        }
        selected
    }
}
