use serde_json::Value;

use crate::command::{Command, CommandState};
use crate::commands::ToggleOptions;
use crate::error::{CommandError, ModelError};
use crate::model::Model;
use crate::position::{Direction, Position};
use crate::resolver::{
    ExpandOptions, LIST_INDENT, LIST_ITEM_ID, LIST_TYPE, block_at, expand_to_complete_items,
    first_block_of_group, list_attrs, selected_blocks,
};
use crate::tree::{Document, Node};
use crate::writer::Writer;

fn can_be_list_block(model: &Model, block: &Position) -> bool {
    let Some(element) = block_at(model.doc(), block) else {
        return false;
    };
    model
        .doc()
        .context_at(block)
        .map(|context| {
            model
                .schema()
                .check_attribute(&context.push(element.name.clone()), LIST_ITEM_ID)
        })
        .unwrap_or(false)
}

fn is_list_block(doc: &Document, block: &Position) -> bool {
    block_at(doc, block).and_then(list_attrs).is_some()
}

fn clear_list_attributes(writer: &mut Writer<'_>, block: &Position) -> Result<(), ModelError> {
    for key in [LIST_ITEM_ID, LIST_INDENT, LIST_TYPE] {
        writer.remove_node_attribute(key, block)?;
    }
    Ok(())
}

/// Turns the selected blocks into (or out of) a bulleted or numbered list.
#[derive(Debug, Clone)]
pub struct ListCommand {
    list_type: String,
}

impl ListCommand {
    pub fn new(list_type: impl Into<String>) -> Self {
        Self {
            list_type: list_type.into(),
        }
    }

    pub fn bulleted() -> Self {
        Self::new("bulleted")
    }

    pub fn numbered() -> Self {
        Self::new("numbered")
    }
}

impl Command for ListCommand {
    type Options = ToggleOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        let blocks = selected_blocks(model);
        if blocks.is_empty() {
            return CommandState::disabled();
        }
        let on = blocks.iter().all(|block| {
            block_at(model.doc(), block)
                .and_then(list_attrs)
                .is_some_and(|attrs| attrs.list_type.as_deref() == Some(self.list_type.as_str()))
        });
        CommandState::enabled(Value::Bool(on))
            .with_enabled(blocks.iter().any(|block| can_be_list_block(model, block)))
    }

    fn execute(
        &mut self,
        model: &mut Model,
        state: &CommandState,
        options: ToggleOptions,
    ) -> Result<(), CommandError> {
        let turn_on = options.turn_on(state.is_on());
        let blocks = expand_to_complete_items(
            model.doc(),
            &selected_blocks(model),
            ExpandOptions::default(),
        );
        let list_type = self.list_type.clone();
        model.change(|writer| {
            for block in &blocks {
                let attrs = block_at(writer.doc(), block).and_then(list_attrs);
                match (turn_on, attrs) {
                    (false, Some(_)) => clear_list_attributes(writer, block)?,
                    (false, None) => {}
                    (true, Some(_)) => {
                        writer.set_node_attribute(LIST_TYPE, list_type.as_str(), block)?;
                    }
                    (true, None) => {
                        let id = writer.unique_id("item");
                        if writer.set_node_attribute(LIST_ITEM_ID, id, block)? {
                            writer.set_node_attribute(LIST_INDENT, 0, block)?;
                            writer.set_node_attribute(LIST_TYPE, list_type.as_str(), block)?;
                        }
                    }
                }
            }
            Ok::<_, CommandError>(())
        })
    }
}

/// True when an earlier item at the same indent exists in the same list.
fn has_previous_item(doc: &Document, block: &Position) -> bool {
    let Some(first) = first_block_of_group(doc, block) else {
        return false;
    };
    let Some(indent) = block_at(doc, &first).and_then(list_attrs).map(|a| a.indent) else {
        return false;
    };
    let Ok(parent) = doc.parent(&first) else {
        return false;
    };
    let earlier: Vec<&Node> = parent
        .children_with_offsets()
        .take_while(|(offset, _)| *offset < first.offset())
        .map(|(_, node)| node)
        .collect();
    for node in earlier.into_iter().rev() {
        let Some(attrs) = node.as_element().and_then(list_attrs) else {
            return false;
        };
        if attrs.indent == indent {
            return true;
        }
        if attrs.indent < indent {
            return false;
        }
    }
    false
}

/// Indents (forward) or outdents (backward) the selected list items together
/// with the items nested under them.
#[derive(Debug, Clone)]
pub struct ListIndentCommand {
    direction: Direction,
}

impl ListIndentCommand {
    pub fn indent() -> Self {
        Self {
            direction: Direction::Forward,
        }
    }

    pub fn outdent() -> Self {
        Self {
            direction: Direction::Backward,
        }
    }
}

impl Command for ListIndentCommand {
    type Options = ();

    fn refresh(&self, model: &Model) -> CommandState {
        let blocks = selected_blocks(model);
        let doc = model.doc();
        let enabled = match self.direction {
            Direction::Forward => {
                !blocks.is_empty()
                    && blocks.iter().all(|block| is_list_block(doc, block))
                    && has_previous_item(doc, &blocks[0])
            }
            Direction::Backward => blocks.iter().any(|block| is_list_block(doc, block)),
        };
        CommandState::enabled(Value::Null).with_enabled(enabled)
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        _options: (),
    ) -> Result<(), CommandError> {
        let blocks = expand_to_complete_items(
            model.doc(),
            &selected_blocks(model),
            ExpandOptions { with_nested: true },
        );
        let direction = self.direction;
        model.change(|writer| {
            for block in &blocks {
                let Some(attrs) = block_at(writer.doc(), block).and_then(list_attrs) else {
                    continue;
                };
                match (direction, attrs.indent) {
                    (Direction::Forward, indent) => {
                        writer.set_node_attribute(LIST_INDENT, indent + 1, block)?;
                    }
                    (Direction::Backward, 0) => clear_list_attributes(writer, block)?,
                    (Direction::Backward, indent) => {
                        writer.set_node_attribute(LIST_INDENT, indent - 1, block)?;
                    }
                }
            }
            Ok::<_, CommandError>(())
        })
    }
}
