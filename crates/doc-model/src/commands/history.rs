use serde_json::Value;

use crate::command::{Command, CommandState};
use crate::error::CommandError;
use crate::model::Model;

#[derive(Debug, Clone, Default)]
pub struct UndoCommand;

impl Command for UndoCommand {
    type Options = ();

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(Value::Null).with_enabled(model.can_undo())
    }

    fn execute(&mut self, model: &mut Model, _: &CommandState, _: ()) -> Result<(), CommandError> {
        model.undo();
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RedoCommand;

impl Command for RedoCommand {
    type Options = ();

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(Value::Null).with_enabled(model.can_redo())
    }

    fn execute(&mut self, model: &mut Model, _: &CommandState, _: ()) -> Result<(), CommandError> {
        model.redo();
        Ok(())
    }
}
