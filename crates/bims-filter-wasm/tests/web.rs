//! Browser tests, run with `wasm-pack test --headless --firefox`

#![cfg(target_arch = "wasm32")]

use bims_filter_wasm::SpatialFilter;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn catalog() -> JsValue {
    js_sys::JSON::parse(
        r#"[{"name": "Spatial", "children": [
            {"name": "Province", "key": "admin.province",
             "value": [{"query": "Western Cape"}, {"query": "Eastern Cape"}]},
            {"name": "River", "key": "rivers.name", "value": [{"query": "Berg"}]}
        ]}]"#,
    )
    .unwrap()
}

#[wasm_bindgen_test]
fn test_load_and_preview() {
    let mut filter = SpatialFilter::new(JsValue::UNDEFINED).unwrap();
    assert!(!filter.is_loaded());
    filter.load_catalog(catalog()).unwrap();
    assert!(filter.is_loaded());
    assert_eq!(filter.fields().length(), 2);

    let values = js_sys::JSON::parse(r#"["Western Cape"]"#).unwrap();
    filter.set_values(1, values).unwrap();
    assert_eq!(filter.expression(), r#"Province == "Western Cape""#);
    assert_eq!(filter.preview(), r#"Province = "Western Cape""#);
}

#[wasm_bindgen_test]
fn test_sync_ignores_echo() {
    let mut filter = SpatialFilter::new(JsValue::UNDEFINED).unwrap();
    filter.load_catalog(catalog()).unwrap();
    filter.begin_sync();
    let values = js_sys::JSON::parse(r#"["Berg"]"#).unwrap();
    assert!(filter.set_values(1, values).unwrap().is_null());
    filter.end_sync();
    assert_eq!(filter.expression(), "");
}

#[wasm_bindgen_test]
fn test_malformed_catalog_keeps_filter_disabled() {
    let mut filter = SpatialFilter::new(JsValue::UNDEFINED).unwrap();
    assert!(filter.load_catalog(JsValue::from_str("nope")).is_err());
    assert!(!filter.is_loaded());
    assert!(filter.add_group().is_err());
}
