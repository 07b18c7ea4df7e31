mod attribute;
mod exception;
mod find;
mod heading;
mod history;
mod list;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use attribute::AttributeCommand;
pub use exception::{ExceptionCommand, GoToExceptionCommand, nearest_exception};
pub use find::{
    FIND_HIGHLIGHT_FAMILY, FIND_RESULT_FAMILY, FindCommand, FindMatch, FindNavigateCommand,
    FindQuery, ReplaceAllCommand, ReplaceCommand, ReplaceOptions, find_in,
};
pub use heading::{HeadingCommand, HeadingOptions};
pub use history::{RedoCommand, UndoCommand};
pub use list::{ListCommand, ListIndentCommand};

/// Options shared by on/off commands. Without `force_value` the command flips
/// its current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleOptions {
    pub value: Option<Value>,
    pub force_value: Option<bool>,
}

impl ToggleOptions {
    pub fn forced(on: bool) -> Self {
        Self {
            value: None,
            force_value: Some(on),
        }
    }

    /// Whether to switch on, given whether the command is currently on.
    pub fn turn_on(&self, currently_on: bool) -> bool {
        self.force_value.unwrap_or(!currently_on)
    }

    pub fn value_or_true(&self) -> Value {
        self.value.clone().unwrap_or(Value::Bool(true))
    }
}
