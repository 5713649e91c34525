use bims_filter_core::{
    ClauseId, FilterBuilder, FilterConfig, GroupId, ScaleNode, Selection, ValueToken, NO_FILTERS,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

const FIELDS: usize = 5;

fn catalog() -> Vec<ScaleNode> {
    let children: Vec<_> = (0..FIELDS)
        .map(|i| {
            if i == FIELDS - 1 {
                json!({"name": format!("field{i}"), "key": format!("layer{i}.attr"), "autocomplete": true})
            } else {
                json!({
                    "name": format!("field{i}"),
                    "key": format!("layer{i}.attr"),
                    "value": [{"query": "a"}, {"query": "b"}, {"query": "c"}]
                })
            }
        })
        .collect();
    serde_json::from_value(json!([{"name": "scale", "children": children}])).unwrap()
}

#[derive(Debug, Clone)]
enum Op {
    AddGroup,
    AddClause(usize),
    RemoveClause(usize),
    RemoveGroup(usize),
    Reassign(usize, usize),
    SetValues(usize, Vec<u8>),
    ClearAll,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::AddGroup),
        any::<usize>().prop_map(Op::AddClause),
        any::<usize>().prop_map(Op::RemoveClause),
        any::<usize>().prop_map(Op::RemoveGroup),
        (any::<usize>(), 0..FIELDS).prop_map(|(c, f)| Op::Reassign(c, f)),
        (any::<usize>(), prop::collection::vec(0u8..5, 0..5)).prop_map(|(c, v)| Op::SetValues(c, v)),
        Just(Op::ClearAll),
    ]
}

fn token(i: u8) -> ValueToken {
    match i {
        0 => ValueToken::All,
        1 => ValueToken::value("a"),
        2 => ValueToken::value("b"),
        3 => ValueToken::value("c"),
        _ => ValueToken::value("d"),
    }
}

fn clause_ids(b: &FilterBuilder) -> Vec<ClauseId> {
    b.groups()
        .iter()
        .flat_map(|g| g.clauses.iter().map(|c| c.id))
        .collect()
}

fn pick<T: Copy>(items: &[T], i: usize) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[i % items.len()])
    }
}

fn apply(b: &mut FilterBuilder, op: &Op) {
    match op {
        Op::AddGroup => {
            let _ = b.add_group(None);
        }
        Op::AddClause(i) => {
            let groups: Vec<GroupId> = b.groups().iter().map(|g| g.id).collect();
            if let Some(g) = pick(&groups, *i) {
                b.add_clause_to_group(g);
            }
        }
        Op::RemoveClause(i) => {
            if let Some(c) = pick(&clause_ids(b), *i) {
                b.remove_clause(c).unwrap();
            }
        }
        Op::RemoveGroup(i) => {
            let groups: Vec<GroupId> = b.groups().iter().map(|g| g.id).collect();
            if let Some(g) = pick(&groups, *i) {
                b.remove_group(g).unwrap();
            }
        }
        Op::Reassign(i, f) => {
            if let Some(c) = pick(&clause_ids(b), *i) {
                let _ = b.reassign_clause_field(c, &format!("field{f}"));
            }
        }
        Op::SetValues(i, raw) => {
            if let Some(c) = pick(&clause_ids(b), *i) {
                let raw: Vec<ValueToken> = raw.iter().copied().map(token).collect();
                b.set_clause_values(c, &raw).unwrap();
            }
        }
        Op::ClearAll => b.clear_all(),
    }
}

fn field_map(b: &FilterBuilder) -> Vec<Vec<(String, Selection)>> {
    b.groups()
        .iter()
        .filter(|g| !g.clauses.is_empty())
        .map(|g| {
            g.clauses
                .iter()
                .map(|c| (c.field.clone(), c.selection.clone()))
                .collect()
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(op(), 0..40)) {
        let mut b = FilterBuilder::with_catalog(FilterConfig::default(), &catalog()).unwrap();
        let mut seen_groups: HashSet<GroupId> = b.groups().iter().map(|g| g.id).collect();
        let mut seen_clauses: HashSet<ClauseId> = clause_ids(&b).into_iter().collect();

        for op in &ops {
            let groups_before: HashSet<GroupId> = b.groups().iter().map(|g| g.id).collect();
            let clauses_before: HashSet<ClauseId> = clause_ids(&b).into_iter().collect();
            apply(&mut b, op);

            // Global exclusivity
            let mut fields = HashSet::new();
            for g in b.groups() {
                for c in &g.clauses {
                    prop_assert!(fields.insert(c.field.clone()), "field {} used twice", c.field);
                }
            }

            // ALL exclusivity and no duplicate values
            for g in b.groups() {
                for c in &g.clauses {
                    if let Selection::Values(values) = &c.selection {
                        let unique: HashSet<_> = values.iter().collect();
                        prop_assert_eq!(unique.len(), values.len());
                    }
                }
            }

            // Ids are unique and never reused
            let group_ids: Vec<GroupId> = b.groups().iter().map(|g| g.id).collect();
            let unique: HashSet<_> = group_ids.iter().collect();
            prop_assert_eq!(unique.len(), group_ids.len());
            for id in &group_ids {
                if !groups_before.contains(id) {
                    prop_assert!(seen_groups.insert(*id), "group id {} reused", id);
                }
            }
            let ids = clause_ids(&b);
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
            for id in &ids {
                if !clauses_before.contains(id) {
                    prop_assert!(seen_clauses.insert(*id), "clause id {} reused", id);
                }
            }

            prop_assert_eq!(b.preview(), b.to_human());
        }
    }

    #[test]
    fn prop_restore_round_trip(ops in prop::collection::vec(op(), 0..40)) {
        let mut b = FilterBuilder::with_catalog(FilterConfig::default(), &catalog()).unwrap();
        for op in ops.iter().filter(|op| !matches!(op, Op::ClearAll)) {
            apply(&mut b, op);
        }

        let before = field_map(&b);
        let expr = b.to_expr();
        let human = b.to_human();

        let mut restored = FilterBuilder::with_catalog(FilterConfig::default(), &catalog()).unwrap();
        restored.restore_groups(b.to_serializable());

        if !before.is_empty() {
            prop_assert_eq!(field_map(&restored), before);
        }
        prop_assert_eq!(restored.to_expr(), expr);
        prop_assert_eq!(restored.to_human(), human);
    }

    #[test]
    fn prop_empty_selection_renders_nothing(adds in 0usize..6) {
        let mut b = FilterBuilder::with_catalog(FilterConfig::default(), &catalog()).unwrap();
        for i in 0..adds {
            if i % 2 == 0 {
                let _ = b.add_group(None);
            } else if let Some(g) = b.groups().first().map(|g| g.id) {
                b.add_clause_to_group(g);
            }
        }
        prop_assert_eq!(b.to_human(), NO_FILTERS);
        prop_assert_eq!(b.to_expr(), "");
    }
}
