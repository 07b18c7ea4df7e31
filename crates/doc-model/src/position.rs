use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ops::Path;
use crate::tree::MAIN_ROOT;

/// An address inside one root of the document.
///
/// Every path entry except the last is the offset of an ancestor element in
/// its parent; the last entry is the offset inside the innermost parent. Text
/// takes one offset per character and an element takes exactly one offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    #[serde(default = "default_root")]
    pub root: String,
    pub path: Path,
}

fn default_root() -> String {
    MAIN_ROOT.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRelation {
    Before,
    After,
    Same,
}

/// Whether range boundaries count as "inside" for a containment query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boundary {
    #[default]
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// How a position reacts to content inserted exactly at its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stickiness {
    /// Sticks to the content after it, so it moves past the insertion.
    ToNext,
    /// Sticks to the content before it, so it stays in place.
    ToPrevious,
}

impl Position {
    pub fn new(root: impl Into<String>, path: Path) -> Self {
        Self {
            root: root.into(),
            path,
        }
    }

    /// A position in the `main` root.
    pub fn main(path: Path) -> Self {
        Self::new(MAIN_ROOT, path)
    }

    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn parent_path(&self) -> &[usize] {
        self.path
            .split_last()
            .map(|(_, parent)| parent)
            .unwrap_or(&[])
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        let mut path = self.path.clone();
        if let Some(last) = path.last_mut() {
            *last = offset;
        }
        Self {
            root: self.root.clone(),
            path,
        }
    }

    pub fn shifted_by(&self, delta: isize) -> Self {
        self.with_offset(self.offset().saturating_add_signed(delta))
    }

    /// The position inside the element that starts at this position.
    pub fn child(&self, offset: usize) -> Self {
        let mut path = self.path.clone();
        path.push(offset);
        Self {
            root: self.root.clone(),
            path,
        }
    }

    /// The position directly before the parent element, or `None` at root level.
    pub fn before_parent(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            root: self.root.clone(),
            path: self.parent_path().to_vec(),
        })
    }

    /// The position directly after the parent element, or `None` at root level.
    pub fn after_parent(&self) -> Option<Self> {
        self.before_parent().map(|p| p.shifted_by(1))
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    pub fn compare(&self, other: &Position) -> Result<PositionRelation, ModelError> {
        match self.partial_cmp(other) {
            Some(Ordering::Less) => Ok(PositionRelation::Before),
            Some(Ordering::Greater) => Ok(PositionRelation::After),
            Some(Ordering::Equal) => Ok(PositionRelation::Same),
            None => Err(ModelError::CrossRoot {
                left: self.root.clone(),
                right: other.root.clone(),
            }),
        }
    }

    pub fn is_before(&self, other: &Position) -> Result<bool, ModelError> {
        Ok(self.compare(other)? == PositionRelation::Before)
    }

    pub fn is_after(&self, other: &Position) -> Result<bool, ModelError> {
        Ok(self.compare(other)? == PositionRelation::After)
    }

    fn same_root(&self, other: &Position) -> Result<(), ModelError> {
        if self.root == other.root {
            Ok(())
        } else {
            Err(ModelError::CrossRoot {
                left: self.root.clone(),
                right: other.root.clone(),
            })
        }
    }

    /// Length of the common path prefix shared with `other`.
    pub fn common_path_len(&self, other: &Position) -> usize {
        self.path
            .iter()
            .zip(other.path.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

/// Positions are only ordered within one root.
impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.root != other.root {
            return None;
        }
        Some(self.path.cmp(&other.path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Builds a normalized range; the arguments may come in any order.
    pub fn new(a: Position, b: Position) -> Result<Self, ModelError> {
        match a.compare(&b)? {
            PositionRelation::After => Ok(Self { start: b, end: a }),
            _ => Ok(Self { start: a, end: b }),
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position.clone(),
            end: position,
        }
    }

    /// A range between two offsets of the same parent.
    pub fn flat(root: impl Into<String>, parent_path: &[usize], start: usize, end: usize) -> Self {
        let root = root.into();
        let mut start_path = parent_path.to_vec();
        start_path.push(start.min(end));
        let mut end_path = parent_path.to_vec();
        end_path.push(start.max(end));
        Self {
            start: Position::new(root.clone(), start_path),
            end: Position::new(root, end_path),
        }
    }

    /// Shorthand for a flat range in the `main` root.
    pub fn main(parent_path: &[usize], start: usize, end: usize) -> Self {
        Self::flat(MAIN_ROOT, parent_path, start, end)
    }

    pub fn root(&self) -> &str {
        &self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent_as(&self.end)
    }

    /// Offset length of a flat range.
    pub fn flat_len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    pub fn contains_position(
        &self,
        position: &Position,
        boundary: Boundary,
    ) -> Result<bool, ModelError> {
        self.start.same_root(position)?;
        Ok(match boundary {
            Boundary::Inclusive => &self.start <= position && position <= &self.end,
            Boundary::Exclusive => &self.start < position && position < &self.end,
        })
    }

    pub fn contains_range(&self, other: &Range, boundary: Boundary) -> Result<bool, ModelError> {
        self.start.same_root(&other.start)?;
        Ok(match boundary {
            Boundary::Inclusive => self.start <= other.start && other.end <= self.end,
            Boundary::Exclusive => {
                if other.is_collapsed() {
                    self.start < other.start && other.end < self.end
                } else {
                    self.start <= other.start
                        && other.end <= self.end
                        && (self.start < other.start || other.end < self.end)
                }
            }
        })
    }

    /// True when the ranges share content, not just a boundary.
    pub fn intersects(&self, other: &Range) -> Result<bool, ModelError> {
        self.start.same_root(&other.start)?;
        Ok(self.start < other.end && other.start < self.end)
    }

    /// True when the ranges share content or at least one boundary position.
    pub fn touches(&self, other: &Range) -> Result<bool, ModelError> {
        self.start.same_root(&other.start)?;
        Ok(self.start <= other.end && other.start <= self.end)
    }

    pub fn intersection(&self, other: &Range) -> Result<Option<Range>, ModelError> {
        if !self.intersects(other)? {
            return Ok(None);
        }
        let start = if self.start < other.start {
            other.start.clone()
        } else {
            self.start.clone()
        };
        let end = if self.end < other.end {
            self.end.clone()
        } else {
            other.end.clone()
        };
        Ok(Some(Range { start, end }))
    }
}

pub(crate) fn transform_by_insertion(
    position: &Position,
    at: &Position,
    len: usize,
    stickiness: Stickiness,
) -> Position {
    if len == 0 || position.root != at.root || at.path.is_empty() {
        return position.clone();
    }
    let depth = at.path.len() - 1;
    if position.path.len() <= depth || position.path[..depth] != at.path[..depth] {
        return position.clone();
    }

    let offset = at.path[depth];
    let current = position.path[depth];
    let shift = if position.path.len() == depth + 1 {
        current > offset || (current == offset && stickiness == Stickiness::ToNext)
    } else {
        current >= offset
    };

    let mut next = position.clone();
    if shift {
        next.path[depth] += len;
    }
    next
}

pub(crate) fn transform_by_removal(position: &Position, removed: &Range) -> Position {
    if position.root != removed.root() || removed.start.path.is_empty() {
        return position.clone();
    }
    let depth = removed.start.path.len() - 1;
    if position.path.len() <= depth || position.path[..depth] != removed.start.path[..depth] {
        return position.clone();
    }

    let start = removed.start.offset();
    let end = removed.end.offset();
    let len = end - start;
    let current = position.path[depth];

    let mut next = position.clone();
    if position.path.len() == depth + 1 {
        if current >= end {
            next.path[depth] = current - len;
        } else if current > start {
            next.path[depth] = start;
        }
    } else if current >= end {
        next.path[depth] = current - len;
    } else if current >= start {
        next.path.truncate(depth + 1);
        next.path[depth] = start;
    }
    next
}

fn is_inside_moved(position: &Position, source: &Range) -> bool {
    if position.root != source.root() || source.start.path.is_empty() {
        return false;
    }
    let depth = source.start.path.len() - 1;
    if position.path.len() <= depth || position.path[..depth] != source.start.path[..depth] {
        return false;
    }
    let current = position.path[depth];
    let (start, end) = (source.start.offset(), source.end.offset());
    if position.path.len() == depth + 1 {
        start < current && current < end
    } else {
        start <= current && current < end
    }
}

pub(crate) fn transform_by_move(
    position: &Position,
    source: &Range,
    target: &Position,
    stickiness: Stickiness,
) -> Position {
    let target_after = transform_by_removal(target, source);
    if is_inside_moved(position, source) {
        return map_into_moved(position, source, &target_after);
    }
    let removed = transform_by_removal(position, source);
    transform_by_insertion(&removed, &target_after, source.flat_len(), stickiness)
}

/// Where a position lying in `source`, boundaries included, lands once the
/// moved content starts at `target_after`.
fn map_into_moved(position: &Position, source: &Range, target_after: &Position) -> Position {
    let depth = source.start.path.len() - 1;
    let relative = position.path[depth] - source.start.offset();
    let mut path = target_after.parent_path().to_vec();
    path.push(target_after.offset() + relative);
    path.extend_from_slice(&position.path[depth + 1..]);
    Position::new(target_after.root.clone(), path)
}

/// A non-collapsed range lying within the moved content travels with it,
/// both boundaries included. `None` when the range is not inside `source`.
pub(crate) fn transform_range_by_move(
    range: &Range,
    source: &Range,
    target: &Position,
) -> Option<Range> {
    if range.is_collapsed() || source.is_collapsed() || source.start.path.is_empty() {
        return None;
    }
    if !source
        .contains_range(range, Boundary::Inclusive)
        .unwrap_or(false)
    {
        return None;
    }
    let target_after = transform_by_removal(target, source);
    Some(Range {
        start: map_into_moved(&range.start, source, &target_after),
        end: map_into_moved(&range.end, source, &target_after),
    })
}

/// Applies a position transform to both ends of a range using marker-style
/// stickiness: content inserted at either boundary stays outside.
pub(crate) fn transform_range(
    range: &Range,
    transform: impl Fn(&Position, Stickiness) -> Position,
) -> Range {
    if range.is_collapsed() {
        let position = transform(&range.start, Stickiness::ToNext);
        return Range::collapsed(position);
    }
    let start = transform(&range.start, Stickiness::ToNext);
    let end = transform(&range.end, Stickiness::ToPrevious);
    match end.partial_cmp(&start) {
        Some(Ordering::Less) | None => Range::collapsed(start),
        _ => Range { start, end },
    }
}
