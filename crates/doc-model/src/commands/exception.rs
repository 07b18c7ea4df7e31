use serde_json::Value;

use crate::command::{Command, CommandState, is_truthy};
use crate::commands::ToggleOptions;
use crate::error::CommandError;
use crate::model::Model;
use crate::normalize::{EXCEPTION_ATTRIBUTE, EXCEPTION_FAMILY};
use crate::position::{Direction, Range};
use crate::resolver::caret_attribute_run;
use crate::selection::Selection;

/// Marks the selection as an editable exception in restricted editing.
#[derive(Debug, Clone, Default)]
pub struct ExceptionCommand;

impl Command for ExceptionCommand {
    type Options = ToggleOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        let on = model
            .selection_attribute(EXCEPTION_ATTRIBUTE)
            .is_some_and(|value| is_truthy(&value));
        CommandState::enabled(Value::Bool(on)).with_enabled(
            model
                .schema()
                .check_attribute_in_selection(model, EXCEPTION_ATTRIBUTE),
        )
    }

    fn execute(
        &mut self,
        model: &mut Model,
        state: &CommandState,
        options: ToggleOptions,
    ) -> Result<(), CommandError> {
        let turn_on = options.turn_on(state.is_on());
        let current = state.value.clone();
        model.change(|writer| {
            let selection = writer.model().selection().clone();
            if selection.is_collapsed() {
                if turn_on {
                    writer.set_selection_attribute(EXCEPTION_ATTRIBUTE, true);
                    return Ok(());
                }
                let Some(focus) = selection.focus().cloned() else {
                    return Ok(());
                };
                let run = caret_attribute_run(writer.doc(), &focus, EXCEPTION_ATTRIBUTE, &current)?;
                writer.remove_selection_attribute(EXCEPTION_ATTRIBUTE);
                let at_edge = writer.doc().is_touching(&focus, &run.start)?
                    || writer.doc().is_touching(&focus, &run.end)?;
                if !at_edge {
                    writer.remove_attribute(EXCEPTION_ATTRIBUTE, &run)?;
                }
                return Ok(());
            }

            let valid = writer.schema().get_valid_ranges(
                writer.doc(),
                selection.ranges(),
                EXCEPTION_ATTRIBUTE,
            );
            for range in valid {
                if turn_on {
                    writer.set_attribute(EXCEPTION_ATTRIBUTE, true, &range)?;
                } else {
                    writer.remove_attribute(EXCEPTION_ATTRIBUTE, &range)?;
                }
            }
            Ok::<_, CommandError>(())
        })
    }
}

/// The closest exception marker range strictly after (forward) or before
/// (backward) the selection focus.
pub fn nearest_exception(model: &Model, direction: Direction) -> Option<Range> {
    let focus = model.selection().focus()?;
    let markers = model.markers().family(EXCEPTION_FAMILY);
    match direction {
        Direction::Forward => markers
            .into_iter()
            .filter(|m| m.range.start.is_after(focus).unwrap_or(false))
            .map(|m| m.range.clone())
            .next(),
        Direction::Backward => markers
            .into_iter()
            .filter(|m| m.range.end.is_before(focus).unwrap_or(false))
            .map(|m| m.range.clone())
            .last(),
    }
}

/// Selects the next or previous exception.
#[derive(Debug, Clone)]
pub struct GoToExceptionCommand {
    direction: Direction,
}

impl GoToExceptionCommand {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

impl Command for GoToExceptionCommand {
    type Options = ();

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(Value::Null)
            .with_enabled(nearest_exception(model, self.direction).is_some())
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        _options: (),
    ) -> Result<(), CommandError> {
        let Some(range) = nearest_exception(model, self.direction) else {
            return Ok(());
        };
        model.set_selection(Selection::from_range(range))?;
        Ok(())
    }
}
