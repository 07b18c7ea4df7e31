use manos_doc_model::{Document, EditorConfig, Model, ModelError, ModelValue, Node, Range, Schema};

#[test]
fn model_value_round_trips_through_json() {
    let mut model = Model::with_document(Document::new(vec![
        Node::paragraph("hello"),
        Node::element("heading1", vec![Node::text("title")]),
    ]));
    model
        .change(|writer| writer.add_marker("comment:1", Range::main(&[0], 1, 3)))
        .unwrap();

    let json = model.to_value().to_json_pretty().unwrap();
    let value = ModelValue::from_json_str(&json).unwrap();
    assert_eq!(value, model.to_value());

    let restored = Model::from_value(value, Schema::richtext(), EditorConfig::default()).unwrap();
    assert_eq!(restored.doc(), model.doc());
    assert_eq!(
        restored.markers().get("comment:1").map(|m| m.range.clone()),
        Some(Range::main(&[0], 1, 3))
    );
    assert_eq!(restored.version(), model.version());
}

#[test]
fn missing_fields_take_defaults() {
    let doc = Document::new(vec![Node::paragraph("x")]);
    let json = serde_json::json!({ "document": doc }).to_string();
    let value = ModelValue::from_json_str(&json).unwrap();
    assert_eq!(value.schema, "manos-doc-model");
    assert_eq!(value.version, 0);
    assert!(value.markers.is_empty());
    assert_eq!(value.into_document(), doc);
}

#[test]
fn markers_outside_the_document_are_rejected() {
    let mut value = ModelValue::from_document(Document::new(vec![Node::paragraph("ab")]));
    value.markers.push(manos_doc_model::Marker {
        name: "comment:1".to_string(),
        range: Range::main(&[0], 0, 9),
    });
    let err = Model::from_value(value, Schema::richtext(), EditorConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ModelError::InvalidPath { .. }));
}

#[test]
fn config_fills_in_defaults() {
    let config = EditorConfig::from_json_str(r#"{ "max_undo": 5 }"#).unwrap();
    assert_eq!(config.max_undo, 5);
    assert!(config.max_post_fix_iterations > 0);
    assert!(config.marker_families.contains_key("exception"));
    assert!(config.marker_families.contains_key("findResult"));
}
