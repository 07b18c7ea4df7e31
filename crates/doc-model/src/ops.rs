use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::position::{
    self, Position, Range, Stickiness, transform_by_insertion, transform_by_move,
    transform_by_removal,
};
use crate::tree::{Document, Node};

pub type Path = Vec<usize>;

/// Elementary document operation. Applying one returns its inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    Insert {
        position: Position,
        nodes: Vec<Node>,
    },
    Remove {
        range: Range,
    },
    Move {
        source: Range,
        target: Position,
    },
    SetAttribute {
        range: Range,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_value: Option<Value>,
    },
    /// Sets or clears an attribute on the element that starts at `position`.
    SetNodeAttribute {
        position: Position,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_value: Option<Value>,
    },
    Rename {
        position: Position,
        old_name: String,
        new_name: String,
    },
    SetMarker {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_range: Option<Range>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_range: Option<Range>,
    },
}

impl Op {
    /// Insert, remove and move change the geometry positions live in.
    pub fn is_structural(&self) -> bool {
        matches!(self, Op::Insert { .. } | Op::Remove { .. } | Op::Move { .. })
    }

    pub fn is_document_change(&self) -> bool {
        !matches!(self, Op::SetMarker { .. })
    }

    pub fn transform_position(&self, position: &Position, stickiness: Stickiness) -> Position {
        match self {
            Op::Insert {
                position: at,
                nodes,
            } => transform_by_insertion(position, at, nodes_size(nodes), stickiness),
            Op::Remove { range } => transform_by_removal(position, range),
            Op::Move { source, target } => transform_by_move(position, source, target, stickiness),
            _ => position.clone(),
        }
    }

    pub fn transform_range(&self, range: &Range) -> Range {
        if !self.is_structural() {
            return range.clone();
        }
        if let Op::Move { source, target } = self
            && let Some(moved) = position::transform_range_by_move(range, source, target)
        {
            return moved;
        }
        position::transform_range(range, |p, stickiness| {
            self.transform_position(p, stickiness)
        })
    }
}

pub fn nodes_size(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::size).sum()
}

fn require_flat(range: &Range) -> Result<(), ModelError> {
    if range.is_flat() {
        Ok(())
    } else {
        Err(ModelError::NotFlat)
    }
}

/// Applies `op` to the document tree and returns the operation that undoes it.
/// Marker operations leave the tree untouched.
pub(crate) fn apply_op_to(doc: &mut Document, op: Op) -> Result<Op, ModelError> {
    match op {
        Op::Insert { position, nodes } => {
            doc.check_position(&position)?;
            let len = nodes_size(&nodes);
            let parent = doc.element_mut(&position.root, position.parent_path())?;
            parent
                .insert_at(position.offset(), nodes)
                .ok_or_else(|| {
                    ModelError::invalid_path(&position.root, &position.path, "cannot insert here")
                })?;
            let end = position.shifted_by(len as isize);
            Ok(Op::Remove {
                range: Range {
                    start: position,
                    end,
                },
            })
        }
        Op::Remove { range } => {
            require_flat(&range)?;
            doc.check_range(&range)?;
            let parent = doc.element_mut(range.root(), range.start.parent_path())?;
            let removed = parent
                .remove_between(range.start.offset(), range.end.offset())
                .ok_or_else(|| {
                    ModelError::invalid_path(range.root(), &range.start.path, "cannot remove")
                })?;
            Ok(Op::Insert {
                position: range.start,
                nodes: removed,
            })
        }
        Op::Move { source, target } => {
            require_flat(&source)?;
            doc.check_range(&source)?;
            doc.check_position(&target)?;
            if moves_into_itself(&source, &target) {
                return Err(ModelError::MoveIntoItself);
            }
            let len = source.flat_len();
            let parent = doc.element_mut(source.root(), source.start.parent_path())?;
            let nodes = parent
                .remove_between(source.start.offset(), source.end.offset())
                .ok_or_else(|| {
                    ModelError::invalid_path(source.root(), &source.start.path, "cannot move")
                })?;

            let placed = transform_by_removal(&target, &source);
            let destination = doc.element_mut(&placed.root, placed.parent_path())?;
            destination.insert_at(placed.offset(), nodes).ok_or_else(|| {
                ModelError::invalid_path(&placed.root, &placed.path, "cannot insert here")
            })?;

            let back_to = transform_by_insertion(&source.start, &placed, len, Stickiness::ToNext);
            let end = placed.shifted_by(len as isize);
            Ok(Op::Move {
                source: Range {
                    start: placed,
                    end,
                },
                target: back_to,
            })
        }
        Op::SetAttribute {
            range,
            key,
            old_value,
            new_value,
        } => {
            require_flat(&range)?;
            doc.check_range(&range)?;
            let parent = doc.element_mut(range.root(), range.start.parent_path())?;
            parent
                .set_attribute_between(
                    range.start.offset(),
                    range.end.offset(),
                    &key,
                    new_value.as_ref(),
                )
                .ok_or_else(|| {
                    ModelError::invalid_path(range.root(), &range.start.path, "cannot set attribute")
                })?;
            Ok(Op::SetAttribute {
                range,
                key,
                old_value: new_value,
                new_value: old_value,
            })
        }
        Op::SetNodeAttribute {
            position,
            key,
            new_value,
            ..
        } => {
            let element = doc.element_mut(&position.root, &position.path)?;
            let previous = match &new_value {
                Some(value) => element.attrs.insert(key.clone(), value.clone()),
                None => element.attrs.remove(&key),
            };
            Ok(Op::SetNodeAttribute {
                position,
                key,
                old_value: new_value,
                new_value: previous,
            })
        }
        Op::Rename {
            position, new_name, ..
        } => {
            let element = doc.element_mut(&position.root, &position.path)?;
            let old_name = std::mem::replace(&mut element.name, new_name.clone());
            Ok(Op::Rename {
                position,
                old_name: new_name,
                new_name: old_name,
            })
        }
        Op::SetMarker {
            name,
            old_range,
            new_range,
        } => Ok(Op::SetMarker {
            name,
            old_range: new_range,
            new_range: old_range,
        }),
    }
}

pub(crate) fn moves_into_itself(source: &Range, target: &Position) -> bool {
    if target.root != source.root() || source.start.path.is_empty() {
        return false;
    }
    let depth = source.start.path.len() - 1;
    if target.path.len() <= depth + 1 || target.path[..depth] != source.start.path[..depth] {
        return false;
    }
    let offset = target.path[depth];
    source.start.offset() <= offset && offset < source.end.offset()
}
