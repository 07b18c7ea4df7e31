use std::collections::BTreeMap;

use serde_json::Value;

use crate::command::{AnyCommand, Command, CommandHandle};
use crate::commands::{
    AttributeCommand, ExceptionCommand, FindCommand, FindNavigateCommand, GoToExceptionCommand,
    HeadingCommand, ListCommand, ListIndentCommand, RedoCommand, ReplaceAllCommand,
    ReplaceCommand, UndoCommand,
};
use crate::error::{CommandError, ModelError};
use crate::model::Model;
use crate::normalize::ExceptionMarkerSync;
use crate::position::Direction;
use crate::selection::Selection;
use crate::writer::Writer;

/// A [`Model`] plus the commands addressable by name.
pub struct Editor {
    model: Model,
    commands: BTreeMap<String, Box<dyn AnyCommand>>,
}

impl Editor {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            commands: BTreeMap::new(),
        }
    }

    /// Rich-text model with the formatting, list, heading, find and history
    /// commands registered.
    pub fn with_richtext() -> Self {
        Self::with_richtext_model(Model::richtext())
    }

    pub fn with_richtext_model(model: Model) -> Self {
        let mut editor = Self::new(model);
        editor.register_richtext_commands();
        editor
    }

    /// Rich text plus exception marking and navigation. Exception runs are
    /// mirrored into `exception:<n>` markers.
    pub fn with_restricted_editing(mut model: Model) -> Self {
        model.add_post_fixer(ExceptionMarkerSync);
        let mut editor = Self::with_richtext_model(model);
        editor.register("restricted_editing.toggle_exception", ExceptionCommand);
        editor.register(
            "restricted_editing.go_to_next_exception",
            GoToExceptionCommand::new(Direction::Forward),
        );
        editor.register(
            "restricted_editing.go_to_previous_exception",
            GoToExceptionCommand::new(Direction::Backward),
        );
        editor
    }

    fn register_richtext_commands(&mut self) {
        for (name, key) in [
            ("marks.toggle_bold", "bold"),
            ("marks.toggle_italic", "italic"),
            ("marks.toggle_underline", "underline"),
            ("marks.toggle_code", "code"),
        ] {
            self.register(name, AttributeCommand::new(key));
        }
        self.register("list.toggle_bulleted", ListCommand::bulleted());
        self.register("list.toggle_numbered", ListCommand::numbered());
        self.register("list.indent", ListIndentCommand::indent());
        self.register("list.outdent", ListIndentCommand::outdent());
        self.register("block.set_heading", HeadingCommand::default());
        self.register("find.find", FindCommand);
        self.register("find.next", FindNavigateCommand::new(Direction::Forward));
        self.register("find.previous", FindNavigateCommand::new(Direction::Backward));
        self.register("find.replace", ReplaceCommand);
        self.register("find.replace_all", ReplaceAllCommand);
        self.register("history.undo", UndoCommand);
        self.register("history.redo", RedoCommand);
    }

    fn register<C: Command + 'static>(&mut self, name: &str, command: C) {
        if let Err(err) = self.add_command(name, command) {
            tracing::warn!(%err, "skipped command registration");
        }
    }

    pub fn add_command<C: Command + 'static>(
        &mut self,
        name: &str,
        command: C,
    ) -> Result<(), CommandError> {
        if self.commands.contains_key(name) {
            return Err(CommandError::Duplicate(name.to_string()));
        }
        let mut handle = CommandHandle::new(name, command);
        handle.refresh(&self.model);
        self.commands.insert(name.to_string(), Box::new(handle));
        Ok(())
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn command(&self, name: &str) -> Option<&dyn AnyCommand> {
        self.commands.get(name).map(|command| command.as_ref())
    }

    pub fn command_mut(&mut self, name: &str) -> Option<&mut (dyn AnyCommand + 'static)> {
        self.commands.get_mut(name).map(|command| command.as_mut())
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.command(name).map(|command| &command.state().value)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.command(name)
            .is_some_and(|command| command.state().is_enabled)
    }

    /// Runs a command with JSON options, then refreshes every command.
    pub fn execute(&mut self, name: &str, options: Option<Value>) -> Result<(), CommandError> {
        let command = self
            .commands
            .get_mut(name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        let result = command.execute_json(&mut self.model, options);
        self.refresh_commands();
        result
    }

    pub fn change<R, E>(&mut self, f: impl FnOnce(&mut Writer<'_>) -> Result<R, E>) -> Result<R, E>
    where
        E: From<ModelError>,
    {
        let result = self.model.change(f);
        self.refresh_commands();
        result
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<(), ModelError> {
        self.model.set_selection(selection)?;
        self.refresh_commands();
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.model.undo();
        self.refresh_commands();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.model.redo();
        self.refresh_commands();
        redone
    }

    pub fn refresh_commands(&mut self) {
        for command in self.commands.values_mut() {
            command.refresh(&self.model);
        }
    }

    /// Destroys every command and hands the model back.
    pub fn destroy(mut self) -> Model {
        for command in self.commands.values_mut() {
            command.destroy();
        }
        self.model
    }
}
