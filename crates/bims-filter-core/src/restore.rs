//! Serialized selections
//!
//! The persisted form of a selection (URL, bookmark, saved search) is
//!
//! ```json
//! [{"clauses": [{"field": "Province", "key": "admin.province", "values": ["Western Cape"]}]}]
//! ```
//!
//! `field` wins over `key` when both resolve. An ALL selection is written as
//! `"all": true` with an empty value list; a value list containing the
//! legacy ALL token is read the same way.

use crate::builder::{ClauseSeed, FilterBuilder, GroupSeed};
use crate::selection::{Selection, ValueToken};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedGroup {
    #[serde(default)]
    pub clauses: Vec<SerializedClause>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub all: bool,
}

impl SerializedClause {
    /// The stored selection. A legacy ALL token anywhere in `values` wins
    /// over the concrete values next to it.
    pub fn selection(&self) -> Selection {
        if self.all {
            return Selection::All;
        }
        let tokens: Vec<ValueToken> = self.values.iter().cloned().map(ValueToken::from).collect();
        Selection::default().apply(&tokens).selection
    }
}

/// Result of [`FilterBuilder::restore_groups`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Held until the catalog finishes loading.
    Deferred,
    Restored(RestoreReport),
}

/// Why a serialized clause was left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    /// Neither `field` nor `key` names a catalog field.
    Unresolvable {
        field: Option<String>,
        key: Option<String>,
    },
    /// An earlier clause of the payload already claimed the field.
    DuplicateField(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedClause {
    pub group_index: usize,
    pub clause_index: usize,
    #[serde(flatten)]
    pub reason: DropReason,
}

/// What a restore rebuilt and what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub groups_restored: usize,
    pub clauses_restored: usize,
    /// Groups that ended up without a single valid clause.
    pub groups_dropped: usize,
    pub dropped_clauses: Vec<DroppedClause>,
    /// Nothing survived and one default group was seeded instead.
    pub seeded_default: bool,
}

impl RestoreReport {
    pub fn is_lossless(&self) -> bool {
        self.groups_dropped == 0 && self.dropped_clauses.is_empty()
    }
}

impl FilterBuilder {
    /// Serializable form of the current groups, without runtime ids.
    pub fn to_serializable(&self) -> Vec<SerializedGroup> {
        self.groups
            .iter()
            .map(|group| SerializedGroup {
                clauses: group
                    .clauses
                    .iter()
                    .map(|clause| SerializedClause {
                        field: Some(clause.field.clone()),
                        key: Some(clause.key.clone()).filter(|k| !k.is_empty()),
                        values: clause.selection.concrete().to_vec(),
                        all: clause.selection.is_all(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn resolve_field(&self, clause: &SerializedClause) -> Option<String> {
        if let Some(field) = clause.field.as_deref() {
            if self.catalog.contains(field) {
                return Some(field.to_string());
            }
        }
        clause
            .key
            .as_deref()
            .and_then(|key| self.catalog.field_by_key(key))
            .map(|f| f.name.clone())
    }

    // Catalog must be loaded. Wipes groups and counters; the caller refreshes.
    pub(crate) fn restore_loaded(&mut self, groups: &[SerializedGroup]) -> RestoreReport {
        self.groups.clear();
        self.group_seq.reset();
        self.clause_seq.reset();

        let mut report = RestoreReport::default();
        let mut claimed: HashSet<String> = HashSet::new();

        for (group_index, group) in groups.iter().enumerate() {
            if group.clauses.is_empty() {
                continue;
            }

            let mut seed = GroupSeed::default();
            for (clause_index, clause) in group.clauses.iter().enumerate() {
                let reason = match self.resolve_field(clause) {
                    Some(field) if claimed.insert(field.clone()) => {
                        seed.clauses.push(ClauseSeed {
                            field,
                            selection: clause.selection(),
                        });
                        continue;
                    }
                    Some(field) => DropReason::DuplicateField(field),
                    None => DropReason::Unresolvable {
                        field: clause.field.clone(),
                        key: clause.key.clone(),
                    },
                };
                warn!(group_index, clause_index, ?reason, "Dropping serialized clause");
                report.dropped_clauses.push(DroppedClause {
                    group_index,
                    clause_index,
                    reason,
                });
            }

            if seed.clauses.is_empty() {
                report.groups_dropped += 1;
                continue;
            }
            report.clauses_restored += seed.clauses.len();
            report.groups_restored += 1;
            self.push_group(seed);
        }

        if self.groups.is_empty() {
            self.seed_default_group();
            report.seeded_default = true;
        }

        info!(
            groups = report.groups_restored,
            clauses = report.clauses_restored,
            dropped = report.dropped_clauses.len(),
            "Restored filter groups"
        );
        report
    }
}
