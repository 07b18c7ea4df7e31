use manos_doc_model::commands::nearest_exception;
use manos_doc_model::{Attrs, Direction, Document, Editor, Model, Node, Position, Range, Selection};
use serde_json::{Value, json};

const TOGGLE: &str = "restricted_editing.toggle_exception";

fn restricted(text: &str) -> Editor {
    Editor::with_restricted_editing(Model::with_document(Document::new(vec![Node::paragraph(
        text,
    )])))
}

fn select(editor: &mut Editor, start: usize, end: usize) {
    editor
        .set_selection(Selection::from_range(Range::main(&[0], start, end)))
        .unwrap();
}

fn caret(editor: &mut Editor, offset: usize) {
    editor
        .set_selection(Selection::collapsed(Position::main(vec![0, offset])))
        .unwrap();
}

fn exception_runs(editor: &Editor) -> Vec<String> {
    editor
        .model()
        .doc()
        .main_children()
        .iter()
        .filter_map(Node::as_element)
        .flat_map(|block| block.children.iter())
        .filter_map(Node::as_text)
        .filter(|text| text.attrs.get("exception") == Some(&Value::Bool(true)))
        .map(|text| text.text.clone())
        .collect()
}

#[test]
fn marking_a_selection_sets_the_attribute_on_it_only() {
    let mut editor = restricted("abcd");
    select(&mut editor, 0, 2);
    editor.execute(TOGGLE, None).unwrap();

    assert_eq!(exception_runs(&editor), vec!["ab".to_string()]);
    assert_eq!(editor.model().doc().main_children(), &[Node::element(
        "paragraph",
        vec![
            Node::text_with("ab", [("exception".to_string(), json!(true))].into_iter().collect()),
            Node::text("cd"),
        ],
    )]);

    caret(&mut editor, 1);
    assert_eq!(editor.value(TOGGLE), Some(&Value::Bool(true)));
    assert!(editor.is_enabled(TOGGLE));

    let markers = editor.model().markers().family("exception");
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].name, "exception:1");
    assert_eq!(markers[0].range, Range::main(&[0], 0, 2));
}

#[test]
fn removing_at_the_run_boundary_is_a_no_op() {
    let mut editor = restricted("abcd");
    select(&mut editor, 0, 2);
    editor.execute(TOGGLE, None).unwrap();
    caret(&mut editor, 2);
    assert_eq!(editor.value(TOGGLE), Some(&Value::Bool(true)));

    let doc_before = editor.model().doc().clone();
    let marker_before = editor.model().markers().get("exception:1").cloned();
    editor.execute(TOGGLE, None).unwrap();

    assert_eq!(editor.model().doc(), &doc_before);
    assert_eq!(editor.model().markers().get("exception:1").cloned(), marker_before);
}

#[test]
fn removing_inside_the_run_clears_the_whole_run() {
    let mut editor = restricted("abcdef");
    select(&mut editor, 1, 4);
    editor.execute(TOGGLE, None).unwrap();
    caret(&mut editor, 2);
    editor.execute(TOGGLE, None).unwrap();

    assert!(exception_runs(&editor).is_empty());
    assert!(editor.model().markers().family("exception").is_empty());
}

#[test]
fn collapsed_toggle_on_is_stored_for_the_next_insertion() {
    let mut editor = restricted("abcd");
    caret(&mut editor, 2);
    editor.execute(TOGGLE, None).unwrap();
    assert_eq!(editor.value(TOGGLE), Some(&Value::Bool(true)));
    assert!(!editor.model().can_undo());
    assert!(exception_runs(&editor).is_empty());
}

#[test]
fn insertion_inside_a_marker_grows_it() {
    let mut model = Model::with_document(Document::new(vec![Node::paragraph("abcdefgh")]));
    model
        .change(|writer| writer.add_marker("exception:1", Range::main(&[0], 2, 5)))
        .unwrap();
    model
        .change(|writer| writer.insert_text("xyz", Attrs::new(), &Position::main(vec![0, 3])))
        .unwrap();
    assert_eq!(
        model.markers().get("exception:1").map(|m| m.range.clone()),
        Some(Range::main(&[0], 2, 8))
    );
}

#[test]
fn removing_the_whole_marker_range_deletes_the_marker() {
    let mut model = Model::with_document(Document::new(vec![Node::paragraph("abxyzcdefgh")]));
    model
        .change(|writer| writer.add_marker("exception:1", Range::main(&[0], 2, 8)))
        .unwrap();
    model
        .change(|writer| writer.remove(&Range::main(&[0], 2, 8)))
        .unwrap();
    assert!(!model.markers().has("exception:1"));
    assert!(model
        .markers()
        .markers_at_position(&Position::main(vec![0, 2]))
        .is_empty());
}

#[test]
fn exception_markers_follow_text_edits() {
    let mut editor = restricted("abcdef");
    select(&mut editor, 2, 4);
    editor.execute(TOGGLE, None).unwrap();
    select(&mut editor, 0, 1);
    editor.execute(TOGGLE, None).unwrap();

    let names: Vec<String> = editor
        .model()
        .markers()
        .family("exception")
        .iter()
        .map(|m| m.name.clone())
        .collect();
    assert_eq!(names.len(), 2);

    // Joining both runs leaves one marker.
    select(&mut editor, 1, 2);
    editor.execute(TOGGLE, Some(json!({ "force_value": true }))).unwrap();
    let markers = editor.model().markers().family("exception");
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].range, Range::main(&[0], 0, 4));

    assert!(editor.undo());
    assert_eq!(editor.model().markers().family("exception").len(), 2);
}

#[test]
fn go_to_exception_selects_the_nearest_marker() {
    let mut editor = restricted("abcdefgh");
    select(&mut editor, 1, 2);
    editor.execute(TOGGLE, None).unwrap();
    select(&mut editor, 5, 7);
    editor.execute(TOGGLE, None).unwrap();

    caret(&mut editor, 3);
    assert_eq!(
        nearest_exception(editor.model(), Direction::Forward),
        Some(Range::main(&[0], 5, 7))
    );
    editor
        .execute("restricted_editing.go_to_previous_exception", None)
        .unwrap();
    assert_eq!(
        editor.model().selection().first_range(),
        Some(&Range::main(&[0], 1, 2))
    );
    assert!(!editor.is_enabled("restricted_editing.go_to_previous_exception"));
    assert!(editor.is_enabled("restricted_editing.go_to_next_exception"));
}
