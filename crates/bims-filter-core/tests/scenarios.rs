use bims_filter_core::{
    Error, FilterBuilder, FilterConfig, RestoreOutcome, ScaleNode, SerializedGroup, ValueToken,
    ALL_TOKEN, NO_FILTERS,
};
use serde_json::json;

fn province_river() -> Vec<ScaleNode> {
    serde_json::from_value(json!([
        {"name": "Spatial", "children": [
            {"name": "Province", "key": "admin.province",
             "value": [{"query": "Western Cape"}, {"query": "Eastern Cape"}]},
            {"name": "River", "key": "rivers.name",
             "value": [{"query": "Berg"}, {"query": "Breede"}]}
        ]}
    ]))
    .unwrap()
}

fn builder() -> FilterBuilder {
    FilterBuilder::with_catalog(FilterConfig::default(), &province_river()).unwrap()
}

#[test]
fn test_single_value_clause() {
    let mut b = builder();
    let clause = b.groups()[0].clauses[0].id;
    assert_eq!(b.clause(clause).unwrap().field, "Province");

    b.set_clause_values(clause, &[ValueToken::value("Western Cape")])
        .unwrap();
    assert_eq!(b.to_human(), "Province = \"Western Cape\"");
    assert_eq!(b.to_expr(), "Province == \"Western Cape\"");
}

#[test]
fn test_all_clause() {
    let mut b = builder();
    let clause = b.groups()[0].clauses[0].id;
    b.set_clause_values(clause, &[ValueToken::All]).unwrap();
    assert_eq!(b.to_human(), "Province: All");
    assert_eq!(b.to_expr(), "TRUE");
}

#[test]
fn test_two_groups_are_anded() {
    let mut b = builder();
    let province = b.groups()[0].clauses[0].id;
    b.set_clause_values(
        province,
        &[
            ValueToken::value("Western Cape"),
            ValueToken::value("Eastern Cape"),
        ],
    )
    .unwrap();

    let second = b.add_group(None).unwrap();
    let river = b.group(second).unwrap().clauses[0].id;
    assert_eq!(b.clause(river).unwrap().field, "River");
    b.set_clause_values(river, &[ValueToken::value("Berg")]).unwrap();

    assert_eq!(
        b.to_expr(),
        r#"(Province == "Western Cape" OR Province == "Eastern Cape") AND River == "Berg""#
    );
    assert_eq!(
        b.to_human(),
        r#"Province IN ["Western Cape", "Eastern Cape"] AND River = "Berg""#
    );
}

#[test]
fn test_collision_is_rejected() {
    let mut b = builder();
    let province = b.groups()[0].clauses[0].id;
    let second = b.add_group(None).unwrap();
    let river = b.group(second).unwrap().clauses[0].id;

    let before = b.groups().to_vec();
    let err = b.reassign_clause_field(river, "Province").unwrap_err();
    match err {
        Error::FieldCollision { field, owner } => {
            assert_eq!(field, "Province");
            assert_eq!(owner, province);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(b.groups(), before.as_slice());
}

#[test]
fn test_restore_by_key() {
    let payload: Vec<ScaleNode> = serde_json::from_value(json!([
        {"name": "Layers", "children": [
            {"name": "Region", "key": "layerA.attr1", "value": [{"query": "X"}, {"query": "Y"}]}
        ]}
    ]))
    .unwrap();
    let mut b = FilterBuilder::with_catalog(FilterConfig::default(), &payload).unwrap();

    let saved: Vec<SerializedGroup> =
        serde_json::from_value(json!([{"clauses": [{"key": "layerA.attr1", "values": ["X"]}]}]))
            .unwrap();
    assert!(matches!(b.restore_groups(saved), RestoreOutcome::Restored(_)));

    assert_eq!(b.groups().len(), 1);
    let clause = &b.groups()[0].clauses[0];
    assert_eq!(clause.field, "Region");
    assert_eq!(clause.selection.concrete(), ["X"]);
}

#[test]
fn test_fresh_builder_has_no_filters() {
    let b = builder();
    assert_eq!(b.to_human(), NO_FILTERS);
    assert_eq!(b.to_expr(), "");
    assert_eq!(b.preview(), NO_FILTERS);
}

#[test]
fn test_widget_keeps_all_token_around() {
    let mut b = builder();
    let clause = b.groups()[0].clauses[0].id;
    b.set_clause_values(clause, &[ValueToken::from(ALL_TOKEN)])
        .unwrap();
    let applied = b
        .set_clause_values(
            clause,
            &[ValueToken::from(ALL_TOKEN), ValueToken::value("Berg")],
        )
        .unwrap();
    assert!(applied.resync_widget);
    assert_eq!(applied.selection.tokens(), vec![ValueToken::value("Berg")]);
}
