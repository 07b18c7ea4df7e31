use manos_doc_model::commands::{FindMatch, FindQuery, find_in};
use manos_doc_model::{Document, Editor, ElementNode, Model, Node, Range};
use serde_json::{Value, json};

fn editor(paragraphs: &[&str]) -> Editor {
    Editor::with_richtext_model(Model::with_document(Document::new(
        paragraphs.iter().map(|text| Node::paragraph(*text)).collect(),
    )))
}

fn texts(editor: &Editor) -> Vec<String> {
    editor
        .model()
        .doc()
        .main_children()
        .iter()
        .filter_map(Node::as_element)
        .map(ElementNode::inline_text)
        .collect()
}

fn ranges(found: &[FindMatch]) -> Vec<Range> {
    found.iter().map(|hit| hit.range.clone()).collect()
}

#[test]
fn scanner_honours_case_and_word_options() {
    let model = Model::with_document(Document::new(vec![
        Node::paragraph("Foo bar foo"),
        Node::paragraph("food"),
    ]));
    let doc = model.doc();
    let schema = model.schema();

    let loose = find_in(doc, schema, &FindQuery::new("foo"), None, Vec::new());
    assert_eq!(
        ranges(&loose),
        vec![
            Range::main(&[0], 0, 3),
            Range::main(&[0], 8, 11),
            Range::main(&[1], 0, 3),
        ]
    );
    assert_eq!(loose[0].text, "Foo");

    let words = find_in(doc, schema, &FindQuery::new("foo").whole_words(true), None, Vec::new());
    assert_eq!(ranges(&words), vec![Range::main(&[0], 0, 3), Range::main(&[0], 8, 11)]);

    let exact = find_in(doc, schema, &FindQuery::new("foo").match_case(true), None, Vec::new());
    assert_eq!(ranges(&exact), vec![Range::main(&[0], 8, 11), Range::main(&[1], 0, 3)]);
}

#[test]
fn scanner_treats_the_query_literally() {
    let model = Model::with_document(Document::new(vec![Node::paragraph("a.c abc (x)")]));
    let found = find_in(model.doc(), model.schema(), &FindQuery::new("a.c"), None, Vec::new());
    assert_eq!(ranges(&found), vec![Range::main(&[0], 0, 3)]);
    let parens = find_in(model.doc(), model.schema(), &FindQuery::new("(x)"), None, Vec::new());
    assert_eq!(ranges(&parens), vec![Range::main(&[0], 8, 11)]);
}

#[test]
fn scanner_respects_scope_and_resumes_from_earlier_results() {
    let model = Model::with_document(Document::new(vec![
        Node::paragraph("xx"),
        Node::paragraph("x"),
    ]));
    let doc = model.doc();
    let schema = model.schema();
    let query = FindQuery::new("x");

    let scoped = find_in(doc, schema, &query, Some(&Range::main(&[0], 0, 2)), Vec::new());
    assert_eq!(scoped.len(), 2);

    let resumed = find_in(doc, schema, &query, None, scoped);
    assert_eq!(
        ranges(&resumed),
        vec![
            Range::main(&[0], 0, 1),
            Range::main(&[0], 1, 2),
            Range::main(&[1], 0, 1),
        ]
    );
}

#[test]
fn empty_query_finds_nothing() {
    let model = Model::with_document(Document::new(vec![Node::paragraph("abc")]));
    assert!(find_in(model.doc(), model.schema(), &FindQuery::new(""), None, Vec::new()).is_empty());
}

#[test]
fn find_stores_results_as_markers_and_navigation_wraps() {
    let mut editor = editor(&["foo bar foo", "foo"]);
    editor.execute("find.find", Some(json!({ "text": "foo" }))).unwrap();

    assert_eq!(editor.model().markers().family("findResult").len(), 3);
    assert_eq!(
        editor.value("find.find"),
        Some(&json!({ "results": 3, "highlighted": 0 }))
    );
    assert!(editor.is_enabled("find.next"));
    assert!(!editor.model().can_undo());

    editor.execute("find.previous", None).unwrap();
    assert_eq!(editor.value("find.find").and_then(|v| v.get("highlighted")), Some(&json!(2)));
    editor.execute("find.next", None).unwrap();
    editor.execute("find.next", None).unwrap();
    assert_eq!(editor.value("find.find").and_then(|v| v.get("highlighted")), Some(&json!(1)));
}

#[test]
fn a_single_result_disables_navigation() {
    let mut editor = editor(&["one foo"]);
    editor.execute("find.find", Some(json!({ "text": "foo" }))).unwrap();
    assert!(!editor.is_enabled("find.next"));
    assert!(editor.is_enabled("find.replace"));
}

#[test]
fn replace_swaps_the_highlighted_result_and_moves_on() {
    let mut editor = editor(&["foo bar foo", "foo"]);
    editor.execute("find.find", Some(json!({ "text": "foo" }))).unwrap();
    editor
        .execute("find.replace", Some(json!({ "replace_with": "baz" })))
        .unwrap();

    assert_eq!(texts(&editor), vec!["baz bar foo", "foo"]);
    let results = editor.model().markers().family("findResult");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].range, Range::main(&[0], 8, 11));
    assert_eq!(
        editor.value("find.find"),
        Some(&json!({ "results": 2, "highlighted": 0 }))
    );

    assert!(editor.undo());
    assert_eq!(texts(&editor), vec!["foo bar foo", "foo"]);
    assert_eq!(editor.model().markers().family("findResult").len(), 3);
}

#[test]
fn replacement_keeps_the_formatting_of_the_match() {
    let bold = [("bold".to_string(), Value::Bool(true))].into_iter().collect();
    let doc = Document::new(vec![Node::element(
        "paragraph",
        vec![Node::text("a "), Node::text_with("foo", bold)],
    )]);
    let mut editor = Editor::with_richtext_model(Model::with_document(doc));
    editor.execute("find.find", Some(json!({ "text": "foo" }))).unwrap();
    editor
        .execute("find.replace", Some(json!({ "replace_with": "qux" })))
        .unwrap();

    let block = editor.model().doc().element("main", &[0]).unwrap();
    assert_eq!(block.inline_text(), "a qux");
    assert_eq!(block.children[1].attrs().get("bold"), Some(&Value::Bool(true)));
}

#[test]
fn replace_all_is_one_undo_step_and_clears_results() {
    let mut editor = editor(&["foo bar foo", "foo"]);
    editor.execute("find.find", Some(json!({ "text": "foo" }))).unwrap();
    editor
        .execute("find.replace_all", Some(json!({ "replace_with": "x" })))
        .unwrap();

    assert_eq!(texts(&editor), vec!["x bar x", "x"]);
    assert!(editor.model().markers().family("findResult").is_empty());
    assert!(editor.model().markers().family("findResultHighlighted").is_empty());

    assert!(editor.undo());
    assert_eq!(texts(&editor), vec!["foo bar foo", "foo"]);
}

#[test]
fn replace_all_can_run_its_own_query() {
    let mut editor = editor(&["Aa aA"]);
    editor
        .execute(
            "find.replace_all",
            Some(json!({ "replace_with": "b", "query": { "text": "a", "match_case": true } })),
        )
        .unwrap();
    assert_eq!(texts(&editor), vec!["Ab bA"]);
}

#[test]
fn bad_options_are_reported() {
    let mut editor = editor(&["foo"]);
    let err = editor
        .execute("find.find", Some(json!({ "text": 5 })))
        .unwrap_err();
    assert!(matches!(
        err,
        manos_doc_model::CommandError::InvalidOptions { .. }
    ));
}
