use crate::builder::{Clause, Group};
use crate::selection::Selection;
use serde::{Deserialize, Serialize};

/// Placeholder returned by [`to_human`] when nothing is selected.
pub const NO_FILTERS: &str = "— (no filters) —";

/// Boolean filter over catalog fields, built from the builder's groups.
///
/// Clauses inside a group are ORed, groups are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Every value of the field
    All(String),
    /// Exact match: field == value
    Exact(String, String),
    /// One of: field in [values]
    OneOf(String, Vec<String>),
    /// Logical AND
    And(Vec<Filter>),
    /// Logical OR
    Or(Vec<Filter>),
}

impl Filter {
    /// The filter for one clause, or `None` when the clause has no values.
    pub fn from_clause(clause: &Clause) -> Option<Filter> {
        match &clause.selection {
            Selection::All => Some(Filter::All(clause.field.clone())),
            Selection::Values(values) => match values.as_slice() {
                [] => None,
                [single] => Some(Filter::Exact(clause.field.clone(), single.clone())),
                _ => Some(Filter::OneOf(clause.field.clone(), values.clone())),
            },
        }
    }

    /// OR of the group's non-empty clauses.
    pub fn from_group(group: &Group) -> Option<Filter> {
        let clauses: Vec<Filter> = group.clauses.iter().filter_map(Filter::from_clause).collect();
        if clauses.is_empty() {
            None
        } else {
            Some(Filter::Or(clauses))
        }
    }

    /// AND of every non-empty group.
    pub fn from_groups(groups: &[Group]) -> Option<Filter> {
        let groups: Vec<Filter> = groups.iter().filter_map(Filter::from_group).collect();
        if groups.is_empty() {
            None
        } else {
            Some(Filter::And(groups))
        }
    }

    /// Expression handed to the search endpoint.
    pub fn expr(&self) -> String {
        match self {
            Filter::All(_) => "TRUE".to_string(),
            Filter::Exact(field, value) => format!("{} == {}", field, quote(value)),
            Filter::OneOf(field, values) => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| format!("{} == {}", field, quote(v)))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            Filter::And(filters) => join(filters, " AND ", Filter::expr),
            Filter::Or(filters) => join(filters, " OR ", Filter::expr),
        }
    }

    /// Human readable preview. Values are wrapped in plain quotes, unescaped.
    pub fn human(&self) -> String {
        match self {
            Filter::All(field) => format!("{}: All", field),
            Filter::Exact(field, value) => format!("{} = \"{}\"", field, value),
            Filter::OneOf(field, values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
                format!("{} IN [{}]", field, quoted.join(", "))
            }
            Filter::And(filters) => join(filters, " AND ", Filter::human),
            Filter::Or(filters) => join(filters, " OR ", Filter::human),
        }
    }
}

/// Expression for a whole builder; empty when nothing is selected.
pub fn to_expr(groups: &[Group]) -> String {
    Filter::from_groups(groups)
        .map(|f| f.expr())
        .unwrap_or_default()
}

/// Preview string for a whole builder.
pub fn to_human(groups: &[Group]) -> String {
    Filter::from_groups(groups)
        .map(|f| f.human())
        .unwrap_or_else(|| NO_FILTERS.to_string())
}

// Only ORs of more than one operand get parentheses; a group is ANDed with
// its neighbours, so its alternatives must stay together.
fn join(filters: &[Filter], sep: &str, render: fn(&Filter) -> String) -> String {
    let parts: Vec<String> = filters.iter().map(render).collect();
    let wrap = sep == " OR " && parts.len() > 1;
    let joined = parts.join(sep);
    if wrap {
        format!("({})", joined)
    } else {
        joined
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClauseId, GroupId};

    fn clause(id: u32, field: &str, selection: Selection) -> Clause {
        Clause {
            id: ClauseId(id),
            field: field.to_string(),
            key: String::new(),
            selection,
        }
    }

    fn group(id: u32, clauses: Vec<Clause>) -> Group {
        Group {
            id: GroupId(id),
            clauses,
        }
    }

    #[test]
    fn test_single_value() {
        let groups = vec![group(1, vec![clause(1, "Province", Selection::values(["Western Cape"]))])];
        assert_eq!(to_human(&groups), r#"Province = "Western Cape""#);
        assert_eq!(to_expr(&groups), r#"Province == "Western Cape""#);
    }

    #[test]
    fn test_all_selection() {
        let groups = vec![group(1, vec![clause(1, "Province", Selection::All)])];
        assert_eq!(to_human(&groups), "Province: All");
        assert_eq!(to_expr(&groups), "TRUE");
    }

    #[test]
    fn test_group_or_is_parenthesized() {
        let groups = vec![
            group(
                1,
                vec![
                    clause(1, "Province", Selection::values(["A"])),
                    clause(2, "River", Selection::values(["Berg", "Breede"])),
                    clause(3, "Empty", Selection::default()),
                ],
            ),
            group(2, vec![clause(4, "Site", Selection::All)]),
        ];
        assert_eq!(
            to_human(&groups),
            r#"(Province = "A" OR River IN ["Berg", "Breede"]) AND Site: All"#
        );
        assert_eq!(
            to_expr(&groups),
            r#"(Province == "A" OR (River == "Berg" OR River == "Breede")) AND TRUE"#
        );
    }

    #[test]
    fn test_empty_groups_render_placeholder() {
        let groups = vec![
            group(1, vec![]),
            group(2, vec![clause(1, "Province", Selection::default())]),
        ];
        assert_eq!(to_human(&groups), NO_FILTERS);
        assert_eq!(to_expr(&groups), "");
        assert_eq!(to_human(&[]), NO_FILTERS);
    }

    #[test]
    fn test_values_are_json_quoted() {
        let groups = vec![group(1, vec![clause(1, "Site", Selection::values([r#"A "quoted" name"#]))])];
        assert_eq!(to_expr(&groups), r#"Site == "A \"quoted\" name""#);
    }

    #[test]
    fn test_human_preview_is_not_escaped() {
        let groups = vec![group(
            1,
            vec![
                clause(1, "Site", Selection::values([r#"A "quoted" name"#])),
                clause(2, "Path", Selection::values([r"C:\data", "plain"])),
            ],
        )];
        assert_eq!(
            to_human(&groups),
            r#"(Site = "A "quoted" name" OR Path IN ["C:\data", "plain"])"#
        );
    }
}
