use serde_json::{Map, Value, json};

use metadata_registration::normalize::{
    DEFAULT_JSON_FIELD, NormalizeOptions, denormalize_all, denormalize_one, denormalized_rows,
    denormalized_table, expand_embedded_json, flatten,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

fn nested_records() -> Vec<Map<String, Value>> {
    vec![
        object(json!({
            "a": 11,
            "b": {"c": 21, "d": {"e": 31, "f": 41}},
            "g": [{"g1": 511, "g2": 611}, {"g1": 512, "g2": 612}]
        })),
        object(json!({
            "a": 12,
            "b": {"c": 22, "d": {"e": 32, "f": 42}},
            "g": [{"g1": 521, "g2": 621}, {"g1": 522, "g2": 622}]
        })),
    ]
}

#[test]
fn flatten_with_parent_keys() {
    let input = object(json!({"a": 1, "c": {"a": 2, "b": {"x": 5, "y": 10}}, "d": [1, 2, 3]}));
    let output = flatten(&input, ".", true);
    assert_eq!(
        output,
        object(json!({"a": 1, "c.a": 2, "c.b.x": 5, "d": [1, 2, 3], "c.b.y": 10}))
    );
}

#[test]
fn flatten_without_parent_keys() {
    let input = object(json!({"a": 1, "b": {"c": 2, "d": {"e": 5, "f": 10}}, "g": [1, 2, 3]}));
    let output = flatten(&input, ".", false);
    assert_eq!(output, object(json!({"a": 1, "c": 2, "e": 5, "f": 10, "g": [1, 2, 3]})));
}

#[test]
fn flatten_is_deterministic() {
    let input = nested_records().remove(0);
    let first = serde_json::to_string(&flatten(&input, ".", true)).unwrap();
    let second = serde_json::to_string(&flatten(&input, ".", true)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn denormalize_one_keeps_other_lists() {
    let input = object(json!({"a": 1, "b": 2, "c": [31, 32], "d": [41, 42]}));
    assert_eq!(
        denormalize_one(&input, "c").unwrap(),
        vec![
            object(json!({"a": 1, "b": 2, "c": 31, "d": [41, 42]})),
            object(json!({"a": 1, "b": 2, "c": 32, "d": [41, 42]})),
        ]
    );
}

#[test]
fn denormalize_all_is_a_cross_product() {
    let input = vec![object(json!({"a": 1, "c": [1, 2], "d": ["x", "y", "z"]}))];
    let output = denormalize_all(&input, &["c", "d"]).unwrap();
    assert_eq!(output.len(), 6);
    assert_eq!(output[0], object(json!({"a": 1, "c": 1, "d": "x"})));
    assert_eq!(output[5], object(json!({"a": 1, "c": 2, "d": "z"})));
}

#[test]
fn rows_with_parent_keys() {
    let rows = denormalized_rows(&nested_records(), &["g"], &NormalizeOptions::default()).unwrap();
    assert_eq!(
        rows,
        vec![
            object(json!({"a": 11, "b.c": 21, "b.d.e": 31, "b.d.f": 41, "g.g1": 511, "g.g2": 611})),
            object(json!({"a": 11, "b.c": 21, "b.d.e": 31, "b.d.f": 41, "g.g1": 512, "g.g2": 612})),
            object(json!({"a": 12, "b.c": 22, "b.d.e": 32, "b.d.f": 42, "g.g1": 521, "g.g2": 621})),
            object(json!({"a": 12, "b.c": 22, "b.d.e": 32, "b.d.f": 42, "g.g1": 522, "g.g2": 622})),
        ]
    );
}

#[test]
fn rows_without_parent_keys() {
    let options = NormalizeOptions {
        use_parent_key: false,
        ..NormalizeOptions::default()
    };
    let rows = denormalized_rows(&nested_records(), &["g"], &options).unwrap();
    assert_eq!(
        rows[3],
        object(json!({"a": 12, "c": 22, "e": 32, "f": 42, "g1": 522, "g2": 622}))
    );
}

#[test]
fn table_columns() {
    let table =
        denormalized_table(&nested_records(), &["g"], &NormalizeOptions::default()).unwrap();
    assert_eq!(table["a"], vec![json!(11), json!(11), json!(12), json!(12)]);
    assert_eq!(table["b.d.f"], vec![json!(41), json!(41), json!(42), json!(42)]);
    assert_eq!(table["g.g1"], vec![json!(511), json!(512), json!(521), json!(522)]);
    assert_eq!(table["g.g2"], vec![json!(611), json!(612), json!(621), json!(622)]);
    assert_eq!(table.len(), 6);
}

#[test]
fn embedded_json_is_expanded_at_every_level() {
    let input = object(json!({
        "a": 123,
        "b": {"a": "abc", "user_defined_json_data": "{\"aaa\":123, \"bbb\":\"abc\"}"},
        "user_defined_json_data": "{\"aaa\":456, \"bbb\":\"def\"}"
    }));
    let output = expand_embedded_json(&input, &[DEFAULT_JSON_FIELD]);
    assert_eq!(
        output,
        object(json!({
            "a": 123,
            "b": {"a": "abc", "aaa": 123, "bbb": "abc"},
            "aaa": 456,
            "bbb": "def"
        }))
    );
}
