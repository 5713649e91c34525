//! Widget-facing session state
//!
//! Everything the JS class needs that is not plain builder state: the
//! programmatic-sync flag, autocomplete sequencing and the shape of the
//! replies the view acts on. Kept free of `JsValue` so it runs natively.

use bims_filter_core::{
    AutocompleteHit, AutocompleteTracker, ClauseId, Error, FilterBuilder, FilterConfig, GroupId,
    RestoreOutcome, Result, SerializedGroup, Ticket, ValueOption, ValueToken,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Suppresses change notifications while the view updates a widget
/// programmatically. Nested syncs are counted.
#[derive(Debug, Default, Clone)]
pub struct WidgetSync {
    depth: u32,
}

impl WidgetSync {
    pub fn begin(&mut self) {
        self.depth += 1;
    }

    pub fn end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }
}

/// Reply to a field-selector change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub accepted: bool,
    /// Field the selector must show afterwards
    pub field: String,
    /// Inline warning for a refused change
    pub warning: Option<String>,
    /// When to clear the warning
    pub clear_after_ms: u32,
}

/// Reply to a value-widget change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange {
    /// Tokens the clause now holds
    pub values: Vec<ValueToken>,
    /// The widget must be reset to `values`
    pub resync: bool,
}

/// An autocomplete lookup the view should issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteRequest {
    pub ticket: Ticket,
    pub url: String,
}

pub struct FilterSession {
    builder: FilterBuilder,
    sync: WidgetSync,
    tracker: AutocompleteTracker,
}

impl FilterSession {
    pub fn new(config: FilterConfig) -> Result<Self> {
        let tracker = AutocompleteTracker::new(config.autocomplete_min_chars);
        Ok(Self {
            builder: FilterBuilder::new(config)?,
            sync: WidgetSync::default(),
            tracker,
        })
    }

    pub fn builder(&self) -> &FilterBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut FilterBuilder {
        &mut self.builder
    }

    pub fn sync_mut(&mut self) -> &mut WidgetSync {
        &mut self.sync
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_active()
    }

    pub fn reassign_field(&mut self, clause: ClauseId, field: &str) -> Result<FieldChange> {
        let timeout = self.builder.config().warning_timeout_ms;
        match self.builder.reassign_clause_field(clause, field) {
            Ok(()) => {
                self.tracker.cancel(clause);
                Ok(FieldChange {
                    accepted: true,
                    field: field.to_string(),
                    warning: None,
                    clear_after_ms: 0,
                })
            }
            Err(Error::FieldCollision { field, .. }) => {
                let current = self
                    .builder
                    .clause(clause)
                    .map(|c| c.field.clone())
                    .unwrap_or_default();
                Ok(FieldChange {
                    accepted: false,
                    field: current,
                    warning: Some(format!("\"{}\" is already used by another filter", field)),
                    clear_after_ms: timeout,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a widget change. Changes echoed back while a programmatic sync
    /// is running are ignored and yield `None`.
    pub fn set_values(&mut self, clause: ClauseId, raw: &[ValueToken]) -> Result<Option<ValueChange>> {
        if self.sync.is_active() {
            debug!(clause = %clause, "Ignoring change during programmatic sync");
            return Ok(None);
        }
        let applied = self.builder.set_clause_values(clause, raw)?;
        Ok(Some(ValueChange {
            values: applied.selection.tokens(),
            resync: applied.resync_widget,
        }))
    }

    pub fn remove_clause(&mut self, clause: ClauseId) -> Result<()> {
        self.builder.remove_clause(clause)?;
        self.tracker.cancel(clause);
        Ok(())
    }

    pub fn remove_group(&mut self, group: GroupId) -> Result<()> {
        let clauses: Vec<ClauseId> = self
            .builder
            .group(group)
            .map(|g| g.clauses.iter().map(|c| c.id).collect())
            .unwrap_or_default();
        self.builder.remove_group(group)?;
        for clause in clauses {
            self.tracker.cancel(clause);
        }
        Ok(())
    }

    /// Drop every group and reseed; pending lookups are abandoned.
    pub fn clear_all(&mut self) {
        self.builder.clear_all();
        self.tracker.cancel_all();
    }

    /// Restore a serialized selection. Restoring hands out clause ids from
    /// the start again, so no lookup issued before it may be delivered.
    pub fn restore(&mut self, groups: Vec<SerializedGroup>) -> RestoreOutcome {
        let outcome = self.builder.restore_groups(groups);
        self.tracker.cancel_all();
        outcome
    }

    pub fn autocomplete_request(&mut self, clause: ClauseId, term: &str) -> Result<Option<AutocompleteRequest>> {
        let Some(url) = self.builder.autocomplete_url(clause, term)? else {
            return Ok(None);
        };
        Ok(self
            .tracker
            .begin(clause, term)
            .map(|ticket| AutocompleteRequest { ticket, url }))
    }

    /// Options for a finished lookup, `None` when a newer lookup for the
    /// same clause superseded it or the clause is gone.
    pub fn autocomplete_response(&mut self, ticket: Ticket, hits: &[AutocompleteHit]) -> Result<Option<Vec<ValueOption>>> {
        if !self.tracker.finish(ticket) || self.builder.clause(ticket.clause).is_none() {
            return Ok(None);
        }
        self.builder.autocomplete_options(ticket.clause, hits).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bims_filter_core::ALL_TOKEN;

    const CATALOG: &str = r#"[{"name": "Spatial", "children": [
        {"name": "Province", "key": "admin.province", "value": [{"query": "Western Cape"}]},
        {"name": "Site", "key": "sites.code", "autocomplete": true}
    ]}]"#;

    fn session() -> FilterSession {
        let mut session = FilterSession::new(FilterConfig::default()).unwrap();
        session.builder_mut().on_catalog_json(CATALOG).unwrap();
        session
    }

    #[test]
    fn test_sync_flag_suppresses_echo() {
        let mut s = session();
        let clause = s.builder().groups()[0].clauses[0].id;

        let change = s
            .set_values(clause, &[ValueToken::value("Western Cape"), ValueToken::from(ALL_TOKEN)])
            .unwrap()
            .unwrap();
        assert!(change.resync);
        assert_eq!(change.values, vec![ValueToken::All]);

        s.sync_mut().begin();
        assert!(s.set_values(clause, &[ValueToken::All]).unwrap().is_none());
        s.sync_mut().end();
        s.sync_mut().end();
        assert!(!s.is_syncing());
    }

    #[test]
    fn test_collision_reply_reverts_selector() {
        let mut s = session();
        let group = s.builder().groups()[0].id;
        let province = s.builder().groups()[0].clauses[0].id;
        let site = s.builder_mut().add_clause_to_group(group).unwrap();

        let change = s.reassign_field(site, "Province").unwrap();
        assert!(!change.accepted);
        assert_eq!(change.field, "Site");
        assert_eq!(change.clear_after_ms, 3000);
        assert!(change.warning.unwrap().contains("Province"));

        s.remove_clause(province).unwrap();
        let change = s.reassign_field(site, "Province").unwrap();
        assert!(change.accepted);
        assert!(s.reassign_field(site, "Nope").is_err());
    }

    #[test]
    fn test_autocomplete_round_trip() {
        let mut s = session();
        let group = s.builder().groups()[0].id;
        let province = s.builder().groups()[0].clauses[0].id;
        let site = s.builder_mut().add_clause_to_group(group).unwrap();

        assert!(s.autocomplete_request(province, "x").unwrap().is_none());

        let stale = s.autocomplete_request(site, "b").unwrap().unwrap();
        let fresh = s.autocomplete_request(site, "be").unwrap().unwrap();
        assert!(fresh.url.contains("q=be"));

        let hits = vec![AutocompleteHit { value: "BERG01".into() }];
        assert!(s.autocomplete_response(stale.ticket, &hits).unwrap().is_none());
        let options = s.autocomplete_response(fresh.ticket, &hits).unwrap().unwrap();
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_restore_abandons_lookups_for_reused_ids() {
        let mut s = FilterSession::new(FilterConfig::default()).unwrap();
        s.builder_mut()
            .on_catalog_json(
                r#"[{"name": "Spatial", "children": [
                    {"name": "Site", "key": "sites.code", "autocomplete": true},
                    {"name": "Farm", "key": "farms.name", "autocomplete": true}
                ]}]"#,
            )
            .unwrap();
        let site = s.builder().groups()[0].clauses[0].id;
        let stale = s.autocomplete_request(site, "berg").unwrap().unwrap();

        let groups = serde_json::from_str(r#"[{"clauses": [{"field": "Farm"}]}]"#).unwrap();
        assert!(matches!(s.restore(groups), RestoreOutcome::Restored(_)));
        let farm = s.builder().groups()[0].clauses[0].clone();
        assert_eq!(farm.id, site);
        assert_eq!(farm.field, "Farm");

        let hits = vec![AutocompleteHit { value: "BERG-SITE-01".into() }];
        assert!(s.autocomplete_response(stale.ticket, &hits).unwrap().is_none());

        let fresh = s.autocomplete_request(farm.id, "be").unwrap().unwrap();
        assert!(s.autocomplete_response(fresh.ticket, &hits).unwrap().is_some());
    }

    #[test]
    fn test_clear_all_abandons_lookups() {
        let mut s = session();
        let group = s.builder().groups()[0].id;
        let site = s.builder_mut().add_clause_to_group(group).unwrap();
        let request = s.autocomplete_request(site, "be").unwrap().unwrap();

        s.clear_all();
        assert_eq!(s.builder().groups().len(), 1);
        let hits = vec![AutocompleteHit { value: "BERG01".into() }];
        assert!(s.autocomplete_response(request.ticket, &hits).unwrap().is_none());
    }

    #[test]
    fn test_removed_clause_drops_pending_lookup() {
        let mut s = session();
        let group = s.builder().groups()[0].id;
        let site = s.builder_mut().add_clause_to_group(group).unwrap();
        let request = s.autocomplete_request(site, "be").unwrap().unwrap();

        s.remove_group(group).unwrap();
        let hits = vec![AutocompleteHit { value: "BERG01".into() }];
        assert!(s.autocomplete_response(request.ticket, &hits).unwrap().is_none());
    }
}
