use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{Command, CommandState};
use crate::error::CommandError;
use crate::model::Model;
use crate::resolver::{block_at, selected_blocks};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingOptions {
    pub value: String,
}

/// Renames the selected blocks to a heading (or back to a paragraph) and drops
/// attributes the new element does not allow.
#[derive(Debug, Clone)]
pub struct HeadingCommand {
    options: Vec<String>,
}

impl Default for HeadingCommand {
    fn default() -> Self {
        Self::new(["paragraph", "heading1", "heading2", "heading3"])
    }
}

impl HeadingCommand {
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

impl Command for HeadingCommand {
    type Options = HeadingOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        let blocks = selected_blocks(model);
        let value = blocks
            .first()
            .and_then(|block| block_at(model.doc(), block))
            .filter(|el| el.name != "paragraph" && self.options.contains(&el.name))
            .map(|el| Value::String(el.name.clone()))
            .unwrap_or(Value::Bool(false));
        let enabled = blocks.iter().any(|block| {
            self.options
                .iter()
                .any(|name| model.schema().check_child_at(model.doc(), block, name))
        });
        CommandState::enabled(value).with_enabled(enabled)
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        options: HeadingOptions,
    ) -> Result<(), CommandError> {
        if !self.options.contains(&options.value) {
            return Err(CommandError::Failed(format!(
                "`{}` is not a heading option",
                options.value
            )));
        }
        let blocks = selected_blocks(model);
        model.change(|writer| {
            let mut renamed = Vec::new();
            for block in &blocks {
                if writer.rename(block, &options.value)? {
                    renamed.push(block.clone());
                }
            }
            let schema = writer.schema();
            schema.remove_disallowed_attributes(&renamed, writer)?;
            Ok::<_, CommandError>(())
        })
    }
}
