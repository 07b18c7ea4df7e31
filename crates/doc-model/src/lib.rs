mod command;
mod config;
mod editor;
mod error;
mod markers;
mod model;
mod normalize;
mod ops;
mod position;
mod resolver;
mod schema;
mod selection;
mod tree;
mod value;
mod writer;

pub mod commands;
pub mod logging;

pub use crate::command::*;
pub use crate::config::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::markers::*;
pub use crate::model::*;
pub use crate::normalize::*;
pub use crate::ops::*;
pub use crate::position::*;
pub use crate::resolver::*;
pub use crate::schema::*;
pub use crate::selection::*;
pub use crate::tree::*;
pub use crate::value::*;
pub use crate::writer::*;
