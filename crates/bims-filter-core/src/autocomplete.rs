//! Remote value search for autocomplete fields
//!
//! Autocomplete fields carry no preloaded values. As the user types, the
//! binding layer asks the backend's location-context endpoint with
//! `q`, `groupKey` and `layerIdentifier`, the latter two being the halves of
//! the field key around its first dot.
//!
//! Responses can arrive out of order. [`AutocompleteTracker`] hands out a
//! ticket per request and only the newest ticket of a clause is accepted.

use crate::builder::FilterBuilder;
use crate::catalog::{FieldDefinition, ValueOption};
use crate::error::{Error, Result};
use crate::types::ClauseId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use url::form_urlencoded;

/// Query parameters of one autocomplete lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteQuery {
    pub q: String,
    pub group_key: String,
    pub layer_identifier: String,
}

impl AutocompleteQuery {
    /// Split `key` at its first dot. A key without a dot is all group key.
    pub fn from_key(key: &str, term: &str) -> Self {
        let (group_key, layer_identifier) = key.split_once('.').unwrap_or((key, ""));
        Self {
            q: term.to_string(),
            group_key: group_key.to_string(),
            layer_identifier: layer_identifier.to_string(),
        }
    }

    /// `None` for static-list fields.
    pub fn for_field(field: &FieldDefinition, term: &str) -> Option<Self> {
        field
            .is_autocomplete()
            .then(|| Self::from_key(&field.key, term))
    }

    pub fn to_query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("q", &self.q)
            .append_pair("groupKey", &self.group_key)
            .append_pair("layerIdentifier", &self.layer_identifier)
            .finish()
    }

    /// `base` may be relative and may already carry a query string.
    pub fn to_url(&self, base: &str) -> String {
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}{}", base, sep, self.to_query_string())
    }
}

/// One entry of the autocomplete response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteHit {
    pub value: String,
}

pub fn parse_response(json: &str) -> Result<Vec<AutocompleteHit>> {
    Ok(serde_json::from_str(json)?)
}

/// Widget options for a response: ALL first when the field supports it,
/// then the hits in response order without duplicates.
pub fn map_response(field: &FieldDefinition, hits: &[AutocompleteHit]) -> Vec<ValueOption> {
    let mut options = Vec::with_capacity(hits.len() + 1);
    if field.supports_all {
        options.push(ValueOption::all());
    }
    for hit in hits {
        if !options.iter().any(|o| o.id == hit.value) {
            options.push(ValueOption::value(&hit.value));
        }
    }
    options
}

/// Identifies one in-flight lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub clause: ClauseId,
    pub seq: u64,
}

/// Sequences lookups so stale responses can be dropped.
#[derive(Debug, Clone, Default)]
pub struct AutocompleteTracker {
    min_chars: usize,
    next: u64,
    latest: HashMap<ClauseId, u64>,
}

impl AutocompleteTracker {
    pub fn new(min_chars: usize) -> Self {
        Self {
            min_chars,
            ..Self::default()
        }
    }

    /// Start a lookup for `clause`, superseding any earlier one. Terms
    /// shorter than the configured minimum cancel the clause's lookup and
    /// yield no ticket.
    pub fn begin(&mut self, clause: ClauseId, term: &str) -> Option<Ticket> {
        if term.chars().count() < self.min_chars {
            self.cancel(clause);
            return None;
        }
        self.next += 1;
        self.latest.insert(clause, self.next);
        Some(Ticket {
            clause,
            seq: self.next,
        })
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.get(&ticket.clause) == Some(&ticket.seq)
    }

    /// Accept the response for `ticket` if it is still the newest one.
    pub fn finish(&mut self, ticket: Ticket) -> bool {
        if self.is_current(ticket) {
            self.latest.remove(&ticket.clause);
            true
        } else {
            debug!(clause = %ticket.clause, seq = ticket.seq, "Dropping stale autocomplete response");
            false
        }
    }

    pub fn cancel(&mut self, clause: ClauseId) {
        self.latest.remove(&clause);
    }

    /// Drop every pending lookup. Sequence numbers keep counting, so a
    /// ticket issued before the call never matches a later one, even when
    /// clause ids are handed out again.
    pub fn cancel_all(&mut self) {
        self.latest.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.latest.len()
    }
}

impl FilterBuilder {
    /// The lookup for a clause's value widget, or `None` when its field has
    /// a static list.
    pub fn autocomplete_query(&self, id: ClauseId, term: &str) -> Result<Option<AutocompleteQuery>> {
        let clause = self.clause(id).ok_or(Error::ClauseNotFound(id))?;
        let field = self
            .catalog()
            .get(&clause.field)
            .ok_or_else(|| Error::FieldNotFound(clause.field.clone()))?;
        Ok(AutocompleteQuery::for_field(field, term))
    }

    /// Full request URL for a clause's lookup against the configured
    /// endpoint.
    pub fn autocomplete_url(&self, id: ClauseId, term: &str) -> Result<Option<String>> {
        Ok(self
            .autocomplete_query(id, term)?
            .map(|q| q.to_url(&self.config().endpoints.autocomplete_url)))
    }

    /// Widget options for an autocomplete response on a clause.
    pub fn autocomplete_options(&self, id: ClauseId, hits: &[AutocompleteHit]) -> Result<Vec<ValueOption>> {
        let clause = self.clause(id).ok_or(Error::ClauseNotFound(id))?;
        let field = self
            .catalog()
            .get(&clause.field)
            .ok_or_else(|| Error::FieldNotFound(clause.field.clone()))?;
        Ok(map_response(field, hits))
    }
}
