use std::cell::RefCell;
use std::rc::Rc;

use manos_doc_model::commands::{AttributeCommand, ToggleOptions};
use manos_doc_model::{
    CommandError, CommandEvent, CommandHandle, Document, Editor, Lifecycle, Model, Node,
    Position, Range, Selection,
};
use serde_json::{Value, json};

fn model_with(text: &str) -> Model {
    Model::with_document(Document::new(vec![Node::paragraph(text)]))
}

fn select(model: &mut Model, start: usize, end: usize) {
    model
        .set_selection(Selection::from_range(Range::main(&[0], start, end)))
        .unwrap();
}

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&CommandEvent) + 'static) {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    (events, move |event: &CommandEvent| {
        sink.borrow_mut().push(event.name().to_string())
    })
}

#[test]
fn refresh_emits_only_real_changes() {
    let mut model = model_with("abcd");
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    let (events, listener) = recorder();
    bold.subscribe(listener);

    bold.refresh(&model);
    assert_eq!(*events.borrow(), vec!["change:value", "change:isEnabled"]);
    assert_eq!(bold.value(), &Value::Bool(false));
    assert!(bold.is_enabled());

    bold.refresh(&model);
    assert_eq!(events.borrow().len(), 2);

    select(&mut model, 0, 2);
    bold.execute(&mut model, ToggleOptions::default()).unwrap();
    assert_eq!(bold.value(), &Value::Bool(true));
    assert_eq!(events.borrow().last().map(String::as_str), Some("change:value"));
    assert_eq!(bold.lifecycle(), Lifecycle::Idle);
}

#[test]
fn execute_refreshes_a_stale_state_first() {
    let mut model = model_with("abcd");
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    bold.refresh(&model);
    select(&mut model, 0, 4);
    model
        .change(|writer| writer.set_attribute("bold", true, &Range::main(&[0], 0, 4)))
        .unwrap();

    // The stored value is stale (off); a fresh refresh sees bold and turns it off.
    bold.execute(&mut model, ToggleOptions::default()).unwrap();
    let block = model.doc().element("main", &[0]).unwrap();
    assert!(block.children[0].attrs().get("bold").is_none());
}

#[test]
fn force_value_overrides_the_toggle() {
    let mut model = model_with("abcd");
    select(&mut model, 0, 4);
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    bold.execute(&mut model, ToggleOptions::forced(true)).unwrap();
    bold.execute(&mut model, ToggleOptions::forced(true)).unwrap();
    assert_eq!(bold.value(), &Value::Bool(true));
    assert!(model.undo());
    assert!(!model.can_undo());
}

#[test]
fn forced_disable_stacks_until_every_id_is_cleared() {
    let mut model = model_with("abcd");
    select(&mut model, 0, 2);
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    bold.force_disabled("read_only", &model);
    bold.force_disabled("comments_only", &model);
    assert!(!bold.is_enabled());

    bold.execute(&mut model, ToggleOptions::default()).unwrap();
    assert!(!model.can_undo());

    bold.clear_force_disabled("read_only", &model);
    assert!(!bold.is_enabled());
    bold.clear_force_disabled("comments_only", &model);
    assert!(bold.is_enabled());
}

#[test]
fn destroyed_commands_ignore_everything() {
    let mut model = model_with("abcd");
    select(&mut model, 0, 2);
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    let (events, listener) = recorder();
    bold.subscribe(listener);
    bold.destroy();

    bold.refresh(&model);
    bold.execute(&mut model, ToggleOptions::default()).unwrap();
    assert_eq!(bold.lifecycle(), Lifecycle::Destroyed);
    assert!(events.borrow().is_empty());
    assert!(!model.can_undo());
}

#[test]
fn unsubscribed_listeners_stop_receiving() {
    let model = model_with("abcd");
    let mut bold = CommandHandle::new("marks.toggle_bold", AttributeCommand::new("bold"));
    let (events, listener) = recorder();
    let id = bold.subscribe(listener);
    assert!(bold.unsubscribe(id));
    assert!(!bold.unsubscribe(id));
    bold.refresh(&model);
    assert!(events.borrow().is_empty());
}

#[test]
fn collapsed_toggle_stores_the_attribute_for_typing() {
    let mut editor = Editor::with_richtext();
    editor
        .set_selection(Selection::collapsed(Position::main(vec![0, 0])))
        .unwrap();
    editor.execute("marks.toggle_italic", None).unwrap();
    assert_eq!(editor.value("marks.toggle_italic"), Some(&Value::Bool(true)));
    assert_eq!(
        editor.model().selection_attribute("italic"),
        Some(Value::Bool(true))
    );
    assert!(!editor.model().can_undo());
}

#[test]
fn editor_reports_unknown_and_duplicate_commands() {
    let mut editor = Editor::with_richtext();
    assert!(matches!(
        editor.execute("marks.toggle_sparkle", None),
        Err(CommandError::Unknown(name)) if name == "marks.toggle_sparkle"
    ));
    assert!(matches!(
        editor.add_command("marks.toggle_bold", AttributeCommand::new("bold")),
        Err(CommandError::Duplicate(_))
    ));
    editor
        .add_command("marks.toggle_strike", AttributeCommand::new("strike"))
        .unwrap();
    assert!(!editor.is_enabled("marks.toggle_strike"));
}

#[test]
fn editor_listeners_see_selection_driven_changes() {
    let mut editor = Editor::with_richtext_model(model_with("abcd"));
    editor
        .change(|writer| writer.set_attribute("bold", true, &Range::main(&[0], 0, 2)))
        .unwrap();
    let (events, listener) = recorder();
    let id = editor
        .command_mut("marks.toggle_bold")
        .map(|command| command.subscribe(Box::new(listener)));
    assert!(id.is_some());

    editor
        .set_selection(Selection::collapsed(Position::main(vec![0, 3])))
        .unwrap();
    assert_eq!(*events.borrow(), vec!["change:value"]);
    assert_eq!(editor.value("marks.toggle_bold"), Some(&json!(false)));
}

#[test]
fn destroying_the_editor_returns_the_model() {
    let mut editor = Editor::with_richtext_model(model_with("abcd"));
    editor
        .set_selection(Selection::from_range(Range::main(&[0], 0, 4)))
        .unwrap();
    editor.execute("marks.toggle_underline", None).unwrap();
    let model = editor.destroy();
    assert!(model.can_undo());
}
