//! BIMS Filter WebAssembly Bindings
//!
//! JavaScript bindings for the advanced spatial filter builder. The page
//! keeps rendering groups, clauses and Select2 widgets; every decision about
//! what they show comes from here.
//!
//! # Example (JavaScript)
//! ```javascript
//! import init, { SpatialFilter } from 'bims-filter-wasm';
//!
//! await init();
//!
//! const filter = new SpatialFilter({ csrfToken, endpoints: { catalogUrl: '/api/spatial-scale-filter-list/' } });
//! const response = await fetch(filter.catalogUrl());
//! response.ok ? filter.loadCatalog(await response.json()) : filter.catalogFailed(response.statusText);
//!
//! const change = filter.setValues(clauseId, $select.val());
//! if (change && change.resync) {
//!   filter.beginSync();
//!   $select.val(change.values).trigger('change');
//!   filter.endSync();
//! }
//! render(filter.availability(), filter.preview());
//! ```

mod session;

pub use session::{AutocompleteRequest, FieldChange, FilterSession, ValueChange, WidgetSync};

use bims_filter_core::{
    AutocompleteHit, ClauseId, FilterConfig, GroupId, ScaleNode, SerializedGroup, Ticket,
    ValueToken,
};
use serde::Serialize;
use thiserror::Error;
use wasm_bindgen::prelude::*;

// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

// =============================================================================
// Error Handling
// =============================================================================

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Core(#[from] bims_filter_core::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),
}

impl From<serde_wasm_bindgen::Error> for FilterError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        FilterError::Argument(err.to_string())
    }
}

impl From<FilterError> for JsValue {
    fn from(err: FilterError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

// Plain objects rather than `Map`s, so layer lookups work with `obj[key]`.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value
        .serialize(&serializer)
        .map_err(|e| FilterError::from(e).into())
}

// =============================================================================
// Main Filter Class
// =============================================================================

/// SpatialFilter - the advanced spatial filter builder for the browser
#[wasm_bindgen]
pub struct SpatialFilter {
    inner: FilterSession,
}

#[wasm_bindgen]
impl SpatialFilter {
    /// Create a filter waiting for its catalog
    ///
    /// @param config - Optional `{endpoints, csrfToken, initialSelection, autocompleteMinChars, warningTimeoutMs}`
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<SpatialFilter, JsValue> {
        let config: FilterConfig = if config.is_undefined() || config.is_null() {
            FilterConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(FilterError::from)?
        };
        let inner = FilterSession::new(config).map_err(FilterError::from)?;
        Ok(SpatialFilter { inner })
    }

    /// URL the catalog must be fetched from
    #[wasm_bindgen(js_name = catalogUrl)]
    pub fn catalog_url(&self) -> String {
        self.inner.builder().config().endpoints.catalog_url.clone()
    }

    /// URL the expression is submitted to
    #[wasm_bindgen(js_name = searchUrl)]
    pub fn search_url(&self) -> String {
        self.inner.builder().config().endpoints.search_url.clone()
    }

    #[wasm_bindgen(js_name = csrfToken)]
    pub fn csrf_token(&self) -> Option<String> {
        self.inner.builder().config().csrf_token.clone()
    }

    // -------------------------------------------------------------------------
    // Catalog lifecycle
    // -------------------------------------------------------------------------

    /// Install the fetched catalog payload
    #[wasm_bindgen(js_name = loadCatalog)]
    pub fn load_catalog(&mut self, payload: JsValue) -> Result<(), JsValue> {
        let payload: Vec<ScaleNode> = match serde_wasm_bindgen::from_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.inner.builder_mut().on_catalog_failed(e.to_string());
                return Err(FilterError::from(e).into());
            }
        };
        self.inner
            .builder_mut()
            .on_catalog_loaded(&payload)
            .map_err(|e| FilterError::from(e).into())
    }

    /// Report a failed catalog fetch; the filter stays disabled
    #[wasm_bindgen(js_name = catalogFailed)]
    pub fn catalog_failed(&mut self, reason: String) {
        self.inner.builder_mut().on_catalog_failed(reason);
    }

    #[wasm_bindgen(js_name = isLoaded)]
    pub fn is_loaded(&self) -> bool {
        self.inner.builder().is_loaded()
    }

    /// Field names in catalog order
    #[wasm_bindgen]
    pub fn fields(&self) -> js_sys::Array {
        self.inner
            .builder()
            .catalog()
            .fields_in_definition_order()
            .map(JsValue::from_str)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Structure
    // -------------------------------------------------------------------------

    /// Add a group with one clause on the first unused field
    ///
    /// @returns the new group id
    #[wasm_bindgen(js_name = addGroup)]
    pub fn add_group(&mut self) -> Result<u32, JsValue> {
        self.inner
            .builder_mut()
            .add_group(None)
            .map(|id| id.0)
            .map_err(|e| FilterError::from(e).into())
    }

    /// Add a clause to a group
    ///
    /// @returns the new clause id, or undefined when no field is left
    #[wasm_bindgen(js_name = addClause)]
    pub fn add_clause(&mut self, group: u32) -> Option<u32> {
        self.inner
            .builder_mut()
            .add_clause_to_group(GroupId(group))
            .map(|id| id.0)
    }

    #[wasm_bindgen(js_name = removeClause)]
    pub fn remove_clause(&mut self, clause: u32) -> Result<(), JsValue> {
        self.inner
            .remove_clause(ClauseId(clause))
            .map_err(|e| FilterError::from(e).into())
    }

    #[wasm_bindgen(js_name = removeGroup)]
    pub fn remove_group(&mut self, group: u32) -> Result<(), JsValue> {
        self.inner
            .remove_group(GroupId(group))
            .map_err(|e| FilterError::from(e).into())
    }

    /// Drop every group and start over with one default group
    #[wasm_bindgen(js_name = clearAll)]
    pub fn clear_all(&mut self) {
        self.inner.clear_all();
    }

    // -------------------------------------------------------------------------
    // Clause edits
    // -------------------------------------------------------------------------

    /// Change a clause's field
    ///
    /// @returns `{accepted, field, warning, clearAfterMs}`
    #[wasm_bindgen(js_name = reassignField)]
    pub fn reassign_field(&mut self, clause: u32, field: String) -> Result<JsValue, JsValue> {
        let change = self
            .inner
            .reassign_field(ClauseId(clause), &field)
            .map_err(FilterError::from)?;
        to_js(&change)
    }

    /// Apply a value widget change
    ///
    /// @param raw - the widget's selected option ids
    /// @returns `{values, resync}`, or null while a programmatic sync runs
    #[wasm_bindgen(js_name = setValues)]
    pub fn set_values(&mut self, clause: u32, raw: JsValue) -> Result<JsValue, JsValue> {
        let raw: Vec<String> = if raw.is_undefined() || raw.is_null() {
            Vec::new()
        } else {
            serde_wasm_bindgen::from_value(raw).map_err(FilterError::from)?
        };
        let raw: Vec<ValueToken> = raw.into_iter().map(ValueToken::from).collect();
        match self
            .inner
            .set_values(ClauseId(clause), &raw)
            .map_err(FilterError::from)?
        {
            Some(change) => to_js(&change),
            None => Ok(JsValue::NULL),
        }
    }

    /// Options for a clause's value widget
    #[wasm_bindgen]
    pub fn options(&self, clause: u32) -> Result<JsValue, JsValue> {
        let options = self
            .inner
            .builder()
            .options_for_clause(ClauseId(clause))
            .map_err(FilterError::from)?;
        to_js(&options)
    }

    /// Mark the start of a programmatic widget update
    #[wasm_bindgen(js_name = beginSync)]
    pub fn begin_sync(&mut self) {
        self.inner.sync_mut().begin();
    }

    #[wasm_bindgen(js_name = endSync)]
    pub fn end_sync(&mut self) {
        self.inner.sync_mut().end();
    }

    #[wasm_bindgen(js_name = isSyncing)]
    pub fn is_syncing(&self) -> bool {
        self.inner.is_syncing()
    }

    // -------------------------------------------------------------------------
    // Autocomplete
    // -------------------------------------------------------------------------

    /// Start an autocomplete lookup
    ///
    /// @returns `{ticket, url}`, or null for static fields and short terms
    #[wasm_bindgen(js_name = autocompleteRequest)]
    pub fn autocomplete_request(&mut self, clause: u32, term: String) -> Result<JsValue, JsValue> {
        match self
            .inner
            .autocomplete_request(ClauseId(clause), &term)
            .map_err(FilterError::from)?
        {
            Some(request) => to_js(&request),
            None => Ok(JsValue::NULL),
        }
    }

    /// Map an autocomplete response body into widget options
    ///
    /// @returns options, or null when the response is stale
    #[wasm_bindgen(js_name = autocompleteResponse)]
    pub fn autocomplete_response(&mut self, ticket: JsValue, body: JsValue) -> Result<JsValue, JsValue> {
        let ticket: Ticket = serde_wasm_bindgen::from_value(ticket).map_err(FilterError::from)?;
        let hits: Vec<AutocompleteHit> =
            serde_wasm_bindgen::from_value(body).map_err(FilterError::from)?;
        match self
            .inner
            .autocomplete_response(ticket, &hits)
            .map_err(FilterError::from)?
        {
            Some(options) => to_js(&options),
            None => Ok(JsValue::NULL),
        }
    }

    // -------------------------------------------------------------------------
    // Read out
    // -------------------------------------------------------------------------

    /// Human-readable preview
    #[wasm_bindgen]
    pub fn preview(&self) -> String {
        self.inner.builder().preview().to_string()
    }

    /// Expression for the search endpoint
    #[wasm_bindgen]
    pub fn expression(&self) -> String {
        self.inner.builder().to_expr()
    }

    /// `{expression, human, groups}`
    #[wasm_bindgen(js_name = getSelected)]
    pub fn get_selected(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.builder().get_selected())
    }

    /// `{layers, meta}` for the map highlighter
    #[wasm_bindgen(js_name = getSelectedLayers)]
    pub fn get_selected_layers(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.builder().get_selected_layers())
    }

    /// Disabled field options and enabled affordances
    #[wasm_bindgen]
    pub fn availability(&self) -> Result<JsValue, JsValue> {
        to_js(self.inner.builder().availability())
    }

    #[wasm_bindgen]
    pub fn groups(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.builder().groups())
    }

    #[wasm_bindgen]
    pub fn revision(&self) -> f64 {
        self.inner.builder().revision() as f64
    }

    /// Serializable selection for URLs and bookmarks
    #[wasm_bindgen]
    pub fn serialize(&self) -> Result<JsValue, JsValue> {
        to_js(&self.inner.builder().to_serializable())
    }

    /// Serializable selection as a JSON string
    #[wasm_bindgen(js_name = serializeJson)]
    pub fn serialize_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.builder().to_serializable())
            .map_err(|e| FilterError::from(bims_filter_core::Error::from(e)).into())
    }

    /// Restore a serialized selection (deferred until the catalog loads)
    #[wasm_bindgen]
    pub fn restore(&mut self, groups: JsValue) -> Result<JsValue, JsValue> {
        let groups: Vec<SerializedGroup> =
            serde_wasm_bindgen::from_value(groups).map_err(FilterError::from)?;
        let outcome = self.inner.restore(groups);
        to_js(&outcome)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Get the bims-filter version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Log a message to the browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}
