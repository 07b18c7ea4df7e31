use serde_json::Value;

use crate::command::{Command, CommandState, is_truthy};
use crate::commands::ToggleOptions;
use crate::error::CommandError;
use crate::model::Model;

/// Toggles a boolean text attribute such as `bold`. On a caret the change is
/// stored on the selection for the next typed text.
#[derive(Debug, Clone)]
pub struct AttributeCommand {
    key: String,
}

impl AttributeCommand {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Command for AttributeCommand {
    type Options = ToggleOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        let on = model
            .selection_attribute(&self.key)
            .is_some_and(|value| is_truthy(&value));
        CommandState::enabled(Value::Bool(on))
            .with_enabled(model.schema().check_attribute_in_selection(model, &self.key))
    }

    fn execute(
        &mut self,
        model: &mut Model,
        state: &CommandState,
        options: ToggleOptions,
    ) -> Result<(), CommandError> {
        let turn_on = options.turn_on(state.is_on());
        let value = options.value_or_true();
        let key = self.key.as_str();
        model.change(|writer| {
            let selection = writer.model().selection().clone();
            if selection.is_collapsed() {
                if turn_on {
                    writer.set_selection_attribute(key, value.clone());
                } else {
                    writer.remove_selection_attribute(key);
                }
                return Ok(());
            }
            let valid = writer
                .schema()
                .get_valid_ranges(writer.doc(), selection.ranges(), key);
            for range in valid {
                if turn_on {
                    writer.set_attribute(key, value.clone(), &range)?;
                } else {
                    writer.remove_attribute(key, &range)?;
                }
            }
            Ok::<_, CommandError>(())
        })
    }
}
