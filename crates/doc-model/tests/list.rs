use manos_doc_model::{
    Document, Editor, ElementNode, ExpandOptions, LIST_INDENT, LIST_ITEM_ID, LIST_TYPE, Model,
    Node, Position, Range, Selection, expand_to_complete_items, is_first_block_of_group,
    list_attrs,
};
use serde_json::{Value, json};

fn item(id: &str, indent: u64, list_type: &str, text: &str) -> Node {
    Node::Element(
        ElementNode::new("paragraph")
            .with_attr(LIST_ITEM_ID, id)
            .with_attr(LIST_INDENT, indent)
            .with_attr(LIST_TYPE, list_type)
            .with_children(vec![Node::text(text)]),
    )
}

fn editor(children: Vec<Node>) -> Editor {
    Editor::with_richtext_model(Model::with_document(Document::new(children)))
}

fn caret_in(editor: &mut Editor, block: usize) {
    editor
        .set_selection(Selection::collapsed(Position::main(vec![block, 0])))
        .unwrap();
}

fn select_blocks(editor: &mut Editor, first: usize, last: usize) {
    let range = Range::new(Position::main(vec![first, 0]), Position::main(vec![last, 1])).unwrap();
    editor.set_selection(Selection::from_range(range)).unwrap();
}

fn block(editor: &Editor, ix: usize) -> ElementNode {
    editor.model().doc().element("main", &[ix]).unwrap().clone()
}

fn indent_of(editor: &Editor, ix: usize) -> Option<u64> {
    list_attrs(&block(editor, ix)).map(|attrs| attrs.indent)
}

fn type_of(editor: &Editor, ix: usize) -> Option<String> {
    list_attrs(&block(editor, ix)).and_then(|attrs| attrs.list_type)
}

#[test]
fn toggling_turns_paragraphs_into_separate_items() {
    let mut editor = editor(vec![Node::paragraph("one"), Node::paragraph("two")]);
    select_blocks(&mut editor, 0, 1);
    assert_eq!(editor.value("list.toggle_bulleted"), Some(&Value::Bool(false)));

    editor.execute("list.toggle_bulleted", None).unwrap();

    let first = list_attrs(&block(&editor, 0)).unwrap();
    let second = list_attrs(&block(&editor, 1)).unwrap();
    assert_ne!(first.item_id, second.item_id);
    assert_eq!(first.indent, 0);
    assert_eq!(second.list_type.as_deref(), Some("bulleted"));
    assert_eq!(editor.value("list.toggle_bulleted"), Some(&Value::Bool(true)));
    assert_eq!(editor.value("list.toggle_numbered"), Some(&Value::Bool(false)));
}

#[test]
fn toggling_off_clears_the_whole_item() {
    let mut editor = editor(vec![
        item("a", 0, "bulleted", "first"),
        item("a", 0, "bulleted", "first, continued"),
        item("b", 0, "bulleted", "second"),
    ]);
    caret_in(&mut editor, 1);
    editor.execute("list.toggle_bulleted", None).unwrap();

    assert!(list_attrs(&block(&editor, 0)).is_none());
    assert!(list_attrs(&block(&editor, 1)).is_none());
    assert!(list_attrs(&block(&editor, 2)).is_some());
}

#[test]
fn switching_type_converts_list_items_in_place() {
    let mut editor = editor(vec![item("a", 0, "bulleted", "one"), item("b", 0, "bulleted", "two")]);
    caret_in(&mut editor, 0);
    editor.execute("list.toggle_numbered", None).unwrap();
    assert_eq!(type_of(&editor, 0).as_deref(), Some("numbered"));
    assert_eq!(block(&editor, 0).attrs.get(LIST_ITEM_ID), Some(&json!("a")));
    assert_eq!(type_of(&editor, 1).as_deref(), Some("bulleted"));
}

#[test]
fn headings_cannot_become_list_items() {
    let mut editor = editor(vec![Node::element("heading1", vec![Node::text("Title")])]);
    caret_in(&mut editor, 0);
    assert!(!editor.is_enabled("list.toggle_bulleted"));
}

#[test]
fn first_item_cannot_be_indented() {
    let mut editor = editor(vec![item("a", 0, "bulleted", "one"), item("b", 0, "bulleted", "two")]);
    caret_in(&mut editor, 0);
    assert!(!editor.is_enabled("list.indent"));
    assert!(editor.is_enabled("list.outdent"));
    caret_in(&mut editor, 1);
    assert!(editor.is_enabled("list.indent"));
}

#[test]
fn indent_takes_nested_items_along() {
    let mut editor = editor(vec![
        item("a", 0, "bulleted", "one"),
        item("b", 0, "bulleted", "two"),
        item("c", 1, "bulleted", "two.one"),
        item("d", 0, "bulleted", "three"),
    ]);
    caret_in(&mut editor, 1);
    editor.execute("list.indent", None).unwrap();
    assert_eq!(
        (0..4).map(|ix| indent_of(&editor, ix)).collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2), Some(0)]
    );

    editor.execute("list.outdent", None).unwrap();
    assert_eq!(
        (0..4).map(|ix| indent_of(&editor, ix)).collect::<Vec<_>>(),
        vec![Some(0), Some(0), Some(1), Some(0)]
    );
}

#[test]
fn outdent_at_the_top_level_leaves_the_list() {
    let mut editor = editor(vec![item("a", 0, "numbered", "one"), item("b", 1, "numbered", "nested")]);
    caret_in(&mut editor, 0);
    editor.execute("list.outdent", None).unwrap();
    assert!(list_attrs(&block(&editor, 0)).is_none());
    assert_eq!(indent_of(&editor, 1), Some(0));
}

#[test]
fn structure_fixer_clamps_indent_and_copies_item_type() {
    let mut editor = editor(vec![
        Node::paragraph("plain"),
        item("a", 0, "bulleted", "one"),
        item("a", 0, "bulleted", "one, continued"),
    ]);
    editor
        .change(|writer| {
            let block = Position::main(vec![2]);
            writer.set_node_attribute(LIST_TYPE, "numbered", &block)?;
            writer.insert_element(
                ElementNode::new("paragraph")
                    .with_attr(LIST_ITEM_ID, "z")
                    .with_attr(LIST_INDENT, 3)
                    .with_attr(LIST_TYPE, "bulleted"),
                &Position::main(vec![1]),
            )
        })
        .unwrap();

    assert_eq!(indent_of(&editor, 1), Some(0));
    assert_eq!(type_of(&editor, 3).as_deref(), Some("bulleted"));
}

#[test]
fn expansion_covers_whole_items_and_optionally_nested_ones() {
    let model = Model::with_document(Document::new(vec![
        item("a", 0, "bulleted", "one"),
        item("a", 0, "bulleted", "one, continued"),
        item("b", 1, "bulleted", "nested"),
        item("c", 0, "bulleted", "two"),
    ]));
    let doc = model.doc();
    let second_block = [Position::main(vec![1])];

    let items = expand_to_complete_items(doc, &second_block, ExpandOptions::default());
    assert_eq!(items, vec![Position::main(vec![0]), Position::main(vec![1])]);

    let nested = expand_to_complete_items(doc, &second_block, ExpandOptions { with_nested: true });
    assert_eq!(
        nested,
        vec![
            Position::main(vec![0]),
            Position::main(vec![1]),
            Position::main(vec![2]),
        ]
    );

    assert!(is_first_block_of_group(doc, &Position::main(vec![0])));
    assert!(!is_first_block_of_group(doc, &Position::main(vec![1])));
    assert!(is_first_block_of_group(doc, &Position::main(vec![3])));
}

#[test]
fn list_changes_undo_in_one_step() {
    let mut editor = editor(vec![Node::paragraph("one"), Node::paragraph("two")]);
    select_blocks(&mut editor, 0, 1);
    editor.execute("list.toggle_numbered", None).unwrap();
    assert!(editor.execute("history.undo", None).is_ok());
    assert!(list_attrs(&block(&editor, 0)).is_none());
    assert!(list_attrs(&block(&editor, 1)).is_none());
    assert!(editor.is_enabled("history.redo"));
}
