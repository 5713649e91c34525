//! Filter builder state machine
//!
//! The builder owns an ordered list of [`Group`]s, each holding an ordered
//! list of [`Clause`]s. Clauses in a group are ORed, groups are ANDed.
//!
//! A field can be the subject of at most one clause across the whole
//! builder. Every mutation re-renders the preview and recomputes which
//! fields are still selectable ([`Availability`]), so a view only ever
//! needs to read state back after calling a method.

use crate::catalog::{FieldDefinition, FilterFieldCatalog, ScaleNode, ValueOption};
use crate::error::{Error, Result};
use crate::filter::{to_expr, to_human};
use crate::restore::{RestoreOutcome, SerializedGroup};
use crate::selection::{Applied, Selection, ValueToken};
use crate::types::{ClauseId, GroupId, Sequence};
use crate::FilterConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One field-equals-one-of-these-values condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clause {
    pub id: ClauseId,
    pub field: String,
    pub key: String,
    pub selection: Selection,
}

/// A set of clauses combined with OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub clauses: Vec<Clause>,
}

/// Clause template for [`FilterBuilder::add_group`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseSeed {
    pub field: String,
    pub selection: Selection,
}

/// Group template for [`FilterBuilder::add_group`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupSeed {
    pub clauses: Vec<ClauseSeed>,
}

/// What a view may offer the user right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    /// Catalog still loading (or failed to load).
    pub loading: bool,
    pub can_add_group: bool,
    pub groups: Vec<GroupAvailability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAvailability {
    pub group: GroupId,
    pub can_add_clause: bool,
    pub clauses: Vec<ClauseAvailability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseAvailability {
    pub clause: ClauseId,
    /// Field options to render disabled in this clause's field selector,
    /// in catalog order.
    pub disabled_fields: Vec<String>,
}

/// Current selection, ready to attach to a search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFilter {
    pub expression: String,
    pub human: String,
    pub groups: Vec<Group>,
}

/// The advanced spatial filter builder.
#[derive(Debug)]
pub struct FilterBuilder {
    pub(crate) config: FilterConfig,
    pub(crate) catalog: FilterFieldCatalog,
    pub(crate) groups: Vec<Group>,
    pub(crate) group_seq: Sequence,
    pub(crate) clause_seq: Sequence,
    pub(crate) pending_restore: Option<Vec<SerializedGroup>>,
    load_failure: Option<String>,
    preview: String,
    availability: Availability,
    revision: u64,
}

impl FilterBuilder {
    /// Create a builder waiting for its field catalog
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = Self {
            config,
            catalog: FilterFieldCatalog::new(),
            groups: Vec::new(),
            group_seq: Sequence::default(),
            clause_seq: Sequence::default(),
            pending_restore: None,
            load_failure: None,
            preview: String::new(),
            availability: Availability::default(),
            revision: 0,
        };
        builder.refresh();
        Ok(builder)
    }

    /// Create a builder and load its catalog in one step
    pub fn with_catalog(config: FilterConfig, payload: &[ScaleNode]) -> Result<Self> {
        let mut builder = Self::new(config)?;
        builder.on_catalog_loaded(payload)?;
        Ok(builder)
    }

    // =========================================================================
    // Catalog lifecycle
    // =========================================================================

    /// Install the fetched catalog, then replay the pending restore, the
    /// configured initial selection, or seed one default group.
    pub fn on_catalog_loaded(&mut self, payload: &[ScaleNode]) -> Result<()> {
        self.catalog.load(payload)?;
        self.load_failure = None;

        if let Some(pending) = self.pending_restore.take() {
            debug!("Replaying deferred restore");
            self.restore_loaded(&pending);
        } else if let Some(initial) = self.config.initial_selection.clone() {
            self.restore_loaded(&initial);
        } else if self.groups.is_empty() {
            self.seed_default_group();
        }

        self.refresh();
        Ok(())
    }

    /// Parse and install a JSON catalog. A malformed payload counts as a
    /// failed load.
    pub fn on_catalog_json(&mut self, json: &str) -> Result<()> {
        match crate::catalog::parse_payload(json) {
            Ok(payload) => self.on_catalog_loaded(&payload),
            Err(e) => {
                self.on_catalog_failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Record that the catalog fetch failed. The builder stays disabled; no
    /// retry is attempted.
    pub fn on_catalog_failed(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "Field catalog failed to load");
        self.load_failure = Some(reason);
        self.refresh();
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.is_loaded()
    }

    pub fn load_failure(&self) -> Option<&str> {
        self.load_failure.as_deref()
    }

    pub fn catalog(&self) -> &FilterFieldCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn clause(&self, id: ClauseId) -> Option<&Clause> {
        self.groups
            .iter()
            .flat_map(|g| g.clauses.iter())
            .find(|c| c.id == id)
    }

    fn clause_mut(&mut self, id: ClauseId) -> Option<&mut Clause> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.clauses.iter_mut())
            .find(|c| c.id == id)
    }

    /// The clause currently filtering on `field`, if any
    pub fn find_clause_owner(&self, field: &str) -> Option<ClauseId> {
        self.groups
            .iter()
            .flat_map(|g| g.clauses.iter())
            .find(|c| c.field == field)
            .map(|c| c.id)
    }

    /// Rendered preview, refreshed after every mutation
    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// Selectable fields and enabled affordances, refreshed after every
    /// mutation
    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Bumped on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // =========================================================================
    // Field availability
    // =========================================================================

    fn used_fields(&self) -> HashSet<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.clauses.iter())
            .map(|c| c.field.as_str())
            .collect()
    }

    /// First catalog field not claimed by any clause
    pub fn first_unused_global(&self) -> Option<&str> {
        let used = self.used_fields();
        self.catalog
            .fields_in_definition_order()
            .find(|name| !used.contains(name))
    }

    /// First catalog field claimed neither globally nor inside `group`
    pub fn first_unused_for_group(&self, group: GroupId) -> Option<&str> {
        let group = self.group(group)?;
        let used = self.used_fields();
        self.catalog
            .fields_in_definition_order()
            .find(|name| !used.contains(name) && !group.clauses.iter().any(|c| c.field == *name))
    }

    fn compute_availability(&self) -> Availability {
        let loaded = self.catalog.is_loaded();
        let used = self.used_fields();

        let groups = self
            .groups
            .iter()
            .map(|group| GroupAvailability {
                group: group.id,
                can_add_clause: loaded && self.first_unused_for_group(group.id).is_some(),
                clauses: group
                    .clauses
                    .iter()
                    .map(|clause| ClauseAvailability {
                        clause: clause.id,
                        disabled_fields: self
                            .catalog
                            .fields_in_definition_order()
                            .filter(|name| used.contains(name) && *name != clause.field)
                            .map(str::to_string)
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Availability {
            loading: !loaded,
            can_add_group: loaded && self.first_unused_global().is_some(),
            groups,
        }
    }

    pub(crate) fn refresh(&mut self) {
        self.preview = to_human(&self.groups);
        self.availability = self.compute_availability();
        self.revision += 1;
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn new_clause(&mut self, field: &FieldDefinition, selection: Selection) -> Clause {
        Clause {
            id: ClauseId(self.clause_seq.next()),
            field: field.name.clone(),
            key: field.key.clone(),
            selection,
        }
    }

    /// Append a group.
    ///
    /// Without a seed the group gets one empty clause on the first unused
    /// field; when every field is taken the call is refused with
    /// [`Error::NoAvailableField`]. A seed creates one clause per entry,
    /// verbatim, provided none of its fields is already in use.
    pub fn add_group(&mut self, seed: Option<GroupSeed>) -> Result<GroupId> {
        if !self.catalog.is_loaded() {
            return Err(Error::CatalogNotLoaded);
        }

        let seed = match seed {
            Some(seed) => seed,
            None => {
                let field = self
                    .first_unused_global()
                    .ok_or(Error::NoAvailableField)?
                    .to_string();
                GroupSeed {
                    clauses: vec![ClauseSeed {
                        field,
                        selection: Selection::default(),
                    }],
                }
            }
        };

        let mut seen: HashSet<&str> = HashSet::new();
        for entry in &seed.clauses {
            if !self.catalog.contains(&entry.field) {
                return Err(Error::FieldNotFound(entry.field.clone()));
            }
            if let Some(owner) = self.find_clause_owner(&entry.field) {
                return Err(Error::FieldCollision {
                    field: entry.field.clone(),
                    owner,
                });
            }
            if !seen.insert(entry.field.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "field {:?} appears twice in one group seed",
                    entry.field
                )));
            }
        }

        let id = self.push_group(seed);
        self.refresh();
        Ok(id)
    }

    // Caller guarantees every seed field exists and is unused.
    pub(crate) fn push_group(&mut self, seed: GroupSeed) -> GroupId {
        let id = GroupId(self.group_seq.next());
        let mut clauses = Vec::with_capacity(seed.clauses.len());
        for entry in seed.clauses {
            if let Some(field) = self.catalog.get(&entry.field).cloned() {
                clauses.push(self.new_clause(&field, entry.selection));
            }
        }
        debug!(group = %id, clauses = clauses.len(), "Added group");
        self.groups.push(Group { id, clauses });
        id
    }

    /// Seed one default group; a group without clauses when no field is
    /// left.
    pub(crate) fn seed_default_group(&mut self) -> GroupId {
        let seed = match self.first_unused_global() {
            Some(field) => GroupSeed {
                clauses: vec![ClauseSeed {
                    field: field.to_string(),
                    selection: Selection::default(),
                }],
            },
            None => GroupSeed::default(),
        };
        self.push_group(seed)
    }

    /// Add an empty clause on the first unused field. `None` when the group
    /// does not exist or no field is left.
    pub fn add_clause_to_group(&mut self, group: GroupId) -> Option<ClauseId> {
        let field = self.first_unused_for_group(group)?.to_string();
        let field = self.catalog.get(&field)?.clone();
        let clause = self.new_clause(&field, Selection::default());
        let id = clause.id;

        self.groups.iter_mut().find(|g| g.id == group)?.clauses.push(clause);
        debug!(group = %group, clause = %id, field = %field.name, "Added clause");
        self.refresh();
        Some(id)
    }

    /// Remove a clause. A group left without clauses is kept.
    pub fn remove_clause(&mut self, id: ClauseId) -> Result<()> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.clauses.iter().any(|c| c.id == id))
            .ok_or(Error::ClauseNotFound(id))?;
        group.clauses.retain(|c| c.id != id);
        debug!(clause = %id, "Removed clause");
        self.refresh();
        Ok(())
    }

    pub fn remove_group(&mut self, id: GroupId) -> Result<()> {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != id);
        if self.groups.len() == before {
            return Err(Error::GroupNotFound(id));
        }
        debug!(group = %id, "Removed group");
        self.refresh();
        Ok(())
    }

    /// Point a clause at another field, clearing its values.
    ///
    /// Refused with [`Error::FieldCollision`] when another clause already
    /// filters on `field`; the clause is left untouched in that case.
    pub fn reassign_clause_field(&mut self, id: ClauseId, field: &str) -> Result<()> {
        let current = self.clause(id).ok_or(Error::ClauseNotFound(id))?;
        if current.field == field {
            return Ok(());
        }

        if let Some(owner) = self.find_clause_owner(field) {
            warn!(clause = %id, %field, %owner, "Field already in use");
            return Err(Error::FieldCollision {
                field: field.to_string(),
                owner,
            });
        }

        let key = self
            .catalog
            .get(field)
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))?
            .key
            .clone();

        if let Some(clause) = self.clause_mut(id) {
            clause.field = field.to_string();
            clause.key = key;
            clause.selection = Selection::default();
        }
        debug!(clause = %id, %field, "Reassigned clause field");
        self.refresh();
        Ok(())
    }

    /// Apply a raw widget selection to a clause. ALL is exclusive; see
    /// [`Selection::apply`]. When the returned `resync_widget` is set the
    /// widget must be reset to the returned selection.
    pub fn set_clause_values(&mut self, id: ClauseId, raw: &[ValueToken]) -> Result<Applied> {
        let clause = self.clause_mut(id).ok_or(Error::ClauseNotFound(id))?;
        let applied = clause.selection.apply(raw);
        clause.selection = applied.selection.clone();
        self.refresh();
        Ok(applied)
    }

    /// Discard every group and reseed one default group. Ids keep counting.
    pub fn clear_all(&mut self) {
        self.groups.clear();
        if self.catalog.is_loaded() {
            self.seed_default_group();
        }
        info!("Cleared all filters");
        self.refresh();
    }

    // =========================================================================
    // Output
    // =========================================================================

    pub fn to_human(&self) -> String {
        to_human(&self.groups)
    }

    pub fn to_expr(&self) -> String {
        to_expr(&self.groups)
    }

    pub fn get_selected(&self) -> SelectedFilter {
        SelectedFilter {
            expression: self.to_expr(),
            human: self.to_human(),
            groups: self.groups.clone(),
        }
    }

    /// Options for a clause's value widget: the catalog list for
    /// static-list fields, otherwise ALL plus whatever is already selected
    /// (the rest arrives through autocomplete).
    pub fn options_for_clause(&self, id: ClauseId) -> Result<Vec<ValueOption>> {
        let clause = self.clause(id).ok_or(Error::ClauseNotFound(id))?;
        let field = self
            .catalog
            .get(&clause.field)
            .ok_or_else(|| Error::FieldNotFound(clause.field.clone()))?;

        if !field.is_autocomplete() {
            return Ok(field.static_options());
        }

        let mut options = Vec::new();
        if field.supports_all {
            options.push(ValueOption::all());
        }
        options.extend(clause.selection.concrete().iter().map(|v| ValueOption::value(v)));
        Ok(options)
    }

    /// Restore a serialized selection, or hold it until the catalog loads.
    pub fn restore_groups(&mut self, groups: Vec<SerializedGroup>) -> RestoreOutcome {
        if !self.catalog.is_loaded() {
            debug!(groups = groups.len(), "Catalog not loaded, deferring restore");
            self.pending_restore = Some(groups);
            return RestoreOutcome::Deferred;
        }
        let report = self.restore_loaded(&groups);
        self.refresh();
        RestoreOutcome::Restored(report)
    }
}
