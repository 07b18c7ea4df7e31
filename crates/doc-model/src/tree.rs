use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelError;
use crate::position::{Direction, Position, Range};
use crate::schema::SchemaContext;

pub type Attrs = BTreeMap<String, Value>;

pub const MAIN_ROOT: &str = "main";
pub const ROOT_ELEMENT: &str = "$root";
pub const TEXT_NAME: &str = "$text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Element(ElementNode),
    Text(TextNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            attrs: Attrs::default(),
        })
    }

    pub fn text_with(text: impl Into<String>, attrs: Attrs) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            attrs,
        })
    }

    pub fn element(name: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Element(ElementNode::new(name).with_children(children))
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text)]
        };
        Node::element("paragraph", children)
    }

    /// Offset size: one per character for text, one for an element.
    pub fn size(&self) -> usize {
        match self {
            Node::Element(_) => 1,
            Node::Text(t) => t.len(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Element(el) => &el.name,
            Node::Text(_) => TEXT_NAME,
        }
    }

    pub fn attrs(&self) -> &Attrs {
        match self {
            Node::Element(el) => &el.attrs,
            Node::Text(t) => &t.attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut Attrs {
        match self {
            Node::Element(el) => &mut el.attrs,
            Node::Text(t) => &mut t.attrs,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextNode> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub name: String,
    #[serde(default)]
    pub attrs: Attrs,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default)]
    pub attrs: Attrs,
}

impl TextNode {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn slice(&self, start: usize, end: usize) -> &str {
        let a = byte_index(&self.text, start);
        let b = byte_index(&self.text, end);
        &self.text[a..b.max(a)]
    }
}

pub(crate) fn byte_index(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(ix, _)| ix)
        .unwrap_or(s.len())
}

/// A shallow piece of a parent's content between two offsets. Text items are
/// clipped to the requested offsets; element items always cover one offset.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    pub start: usize,
    pub end: usize,
    pub node: &'a Node,
}

impl Item<'_> {
    pub fn is_text(&self) -> bool {
        matches!(self.node, Node::Text(_))
    }
}

impl ElementNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attrs::default(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self.merge_text_runs();
        self
    }

    pub fn max_offset(&self) -> usize {
        self.children.iter().map(Node::size).sum()
    }

    /// Child index and start offset of the child that covers `offset`.
    pub fn index_at_offset(&self, offset: usize) -> Option<(usize, usize)> {
        let mut start = 0usize;
        for (ix, child) in self.children.iter().enumerate() {
            let end = start + child.size();
            if offset < end {
                return Some((ix, start));
            }
            start = end;
        }
        None
    }

    pub fn node_at_offset(&self, offset: usize) -> Option<&Node> {
        self.index_at_offset(offset)
            .map(|(ix, _)| &self.children[ix])
    }

    pub fn node_before_offset(&self, offset: usize) -> Option<&Node> {
        offset.checked_sub(1).and_then(|o| self.node_at_offset(o))
    }

    /// The element that starts exactly at `offset`.
    pub fn element_at_offset(&self, offset: usize) -> Option<&ElementNode> {
        match self.index_at_offset(offset) {
            Some((ix, start)) if start == offset => self.children[ix].as_element(),
            _ => None,
        }
    }

    fn element_at_offset_mut(&mut self, offset: usize) -> Option<&mut ElementNode> {
        match self.index_at_offset(offset) {
            Some((ix, start)) if start == offset => match &mut self.children[ix] {
                Node::Element(el) => Some(el),
                Node::Text(_) => None,
            },
            _ => None,
        }
    }

    /// Offsets of every child, paired with the child.
    pub fn children_with_offsets(&self) -> impl Iterator<Item = (usize, &Node)> {
        let mut offset = 0usize;
        self.children.iter().map(move |child| {
            let start = offset;
            offset += child.size();
            (start, child)
        })
    }

    pub fn items_between(&self, start: usize, end: usize) -> Vec<Item<'_>> {
        let mut items = Vec::new();
        for (node_start, node) in self.children_with_offsets() {
            let node_end = node_start + node.size();
            if node_end <= start {
                continue;
            }
            if node_start >= end {
                break;
            }
            items.push(Item {
                start: node_start.max(start),
                end: node_end.min(end),
                node,
            });
        }
        items
    }

    /// Text of the whole element content; elements count as one placeholder
    /// character so char offsets line up with model offsets.
    pub fn inline_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(&t.text),
                Node::Element(_) => out.push('\u{FFFC}'),
            }
        }
        out
    }

    /// Makes sure a child boundary exists at `offset` and returns the index of
    /// the first child starting at or after it.
    fn split_at(&mut self, offset: usize) -> Option<usize> {
        let mut start = 0usize;
        for ix in 0..self.children.len() {
            if offset == start {
                return Some(ix);
            }
            let size = self.children[ix].size();
            if offset < start + size {
                let Node::Text(text) = &mut self.children[ix] else {
                    return None;
                };
                let at = byte_index(&text.text, offset - start);
                let tail = text.text.split_off(at);
                let attrs = text.attrs.clone();
                self.children
                    .insert(ix + 1, Node::Text(TextNode { text: tail, attrs }));
                return Some(ix + 1);
            }
            start += size;
        }
        (offset == start).then_some(self.children.len())
    }

    pub(crate) fn insert_at(&mut self, offset: usize, nodes: Vec<Node>) -> Option<()> {
        let ix = self.split_at(offset)?;
        self.children.splice(ix..ix, nodes);
        self.merge_text_runs();
        Some(())
    }

    pub(crate) fn remove_between(&mut self, start: usize, end: usize) -> Option<Vec<Node>> {
        let a = self.split_at(start)?;
        let b = self.split_at(end)?;
        let removed: Vec<Node> = self.children.drain(a..b).collect();
        self.merge_text_runs();
        Some(removed)
    }

    pub(crate) fn set_attribute_between(
        &mut self,
        start: usize,
        end: usize,
        key: &str,
        value: Option<&Value>,
    ) -> Option<()> {
        let a = self.split_at(start)?;
        let b = self.split_at(end)?;
        for child in &mut self.children[a..b] {
            match value {
                Some(value) => {
                    child.attrs_mut().insert(key.to_string(), value.clone());
                }
                None => {
                    child.attrs_mut().remove(key);
                }
            }
        }
        self.merge_text_runs();
        Some(())
    }

    /// Drops empty text runs and joins neighbours with identical attributes.
    pub(crate) fn merge_text_runs(&mut self) {
        let mut merged: Vec<Node> = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            match child {
                Node::Text(t) if t.text.is_empty() => {}
                Node::Text(t) => {
                    if let Some(Node::Text(last)) = merged.last_mut()
                        && last.attrs == t.attrs
                    {
                        last.text.push_str(&t.text);
                        continue;
                    }
                    merged.push(Node::Text(t));
                }
                element => merged.push(element),
            }
        }
        self.children = merged;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub roots: BTreeMap<String, ElementNode>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// One step of a walk through the tree.
#[derive(Debug, Clone, Copy)]
pub enum WalkerItem<'a> {
    Text(&'a TextNode),
    ElementStart(&'a ElementNode),
    ElementEnd(&'a ElementNode),
}

#[derive(Debug, Clone)]
pub struct WalkerValue<'a> {
    pub item: WalkerItem<'a>,
    pub previous: Position,
    pub next: Position,
    pub length: usize,
}

impl WalkerValue<'_> {
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        match self.item {
            WalkerItem::Text(t) => t.attrs.get(key),
            WalkerItem::ElementStart(el) | WalkerItem::ElementEnd(el) => el.attrs.get(key),
        }
    }
}

impl Document {
    /// A document whose `main` root holds `children`.
    pub fn new(children: Vec<Node>) -> Self {
        let mut roots = BTreeMap::new();
        roots.insert(
            MAIN_ROOT.to_string(),
            ElementNode::new(ROOT_ELEMENT).with_children(children),
        );
        Self { roots }
    }

    pub fn add_root(&mut self, name: impl Into<String>, children: Vec<Node>) {
        self.roots.insert(
            name.into(),
            ElementNode::new(ROOT_ELEMENT).with_children(children),
        );
    }

    pub fn root(&self, name: &str) -> Option<&ElementNode> {
        self.roots.get(name)
    }

    pub fn main_children(&self) -> &[Node] {
        self.root(MAIN_ROOT)
            .map(|root| root.children.as_slice())
            .unwrap_or(&[])
    }

    /// The element addressed by `path`, where every entry is an element offset.
    pub fn element(&self, root: &str, path: &[usize]) -> Result<&ElementNode, ModelError> {
        let mut el = self
            .roots
            .get(root)
            .ok_or_else(|| ModelError::UnknownRoot(root.to_string()))?;
        for (depth, &offset) in path.iter().enumerate() {
            el = el.element_at_offset(offset).ok_or_else(|| {
                ModelError::invalid_path(root, path, format!("no element at depth {depth}"))
            })?;
        }
        Ok(el)
    }

    pub(crate) fn element_mut(
        &mut self,
        root: &str,
        path: &[usize],
    ) -> Result<&mut ElementNode, ModelError> {
        let mut el = self
            .roots
            .get_mut(root)
            .ok_or_else(|| ModelError::UnknownRoot(root.to_string()))?;
        for (depth, &offset) in path.iter().enumerate() {
            let current = el;
            el = current.element_at_offset_mut(offset).ok_or_else(|| {
                ModelError::invalid_path(root, path, format!("no element at depth {depth}"))
            })?;
        }
        Ok(el)
    }

    pub fn parent(&self, position: &Position) -> Result<&ElementNode, ModelError> {
        if position.path.is_empty() {
            return Err(ModelError::invalid_path(
                &position.root,
                &position.path,
                "empty path",
            ));
        }
        self.element(&position.root, position.parent_path())
    }

    /// Fails when the position does not address an existing offset.
    pub fn check_position(&self, position: &Position) -> Result<(), ModelError> {
        let parent = self.parent(position)?;
        if position.offset() > parent.max_offset() {
            return Err(ModelError::invalid_path(
                &position.root,
                &position.path,
                format!("offset exceeds {}", parent.max_offset()),
            ));
        }
        Ok(())
    }

    pub fn check_range(&self, range: &Range) -> Result<(), ModelError> {
        self.check_position(&range.start)?;
        self.check_position(&range.end)
    }

    /// Element names from the root down to the parent of `position`.
    pub fn context_at(&self, position: &Position) -> Result<SchemaContext, ModelError> {
        let mut el = self
            .roots
            .get(&position.root)
            .ok_or_else(|| ModelError::UnknownRoot(position.root.clone()))?;
        let mut names = vec![el.name.clone()];
        for &offset in position.parent_path() {
            el = el.element_at_offset(offset).ok_or_else(|| {
                ModelError::invalid_path(&position.root, &position.path, "no element on path")
            })?;
            names.push(el.name.clone());
        }
        Ok(SchemaContext::new(names))
    }

    /// Attributes of the text right before and right after a position.
    pub fn text_attrs_around(
        &self,
        position: &Position,
    ) -> Result<(Option<&Attrs>, Option<&Attrs>), ModelError> {
        let parent = self.parent(position)?;
        let offset = position.offset();
        let before = parent
            .node_before_offset(offset)
            .and_then(Node::as_text)
            .map(|t| &t.attrs);
        let after = parent
            .node_at_offset(offset)
            .and_then(Node::as_text)
            .map(|t| &t.attrs);
        Ok((before, after))
    }

    /// Splits an arbitrary range into the minimal list of flat ranges that
    /// cover it, in document order.
    pub fn flat_ranges(&self, range: &Range) -> Result<Vec<Range>, ModelError> {
        self.check_range(range)?;
        let mut ranges = Vec::new();
        let diff_at = range.start.common_path_len(&range.end);
        let mut pos = range.start.clone();

        while pos.path.len() > diff_at + 1 {
            let parent = self.parent(&pos)?;
            let max = parent.max_offset();
            if max > pos.offset() {
                ranges.push(Range {
                    start: pos.clone(),
                    end: pos.with_offset(max),
                });
            }
            pos.path.pop();
            if let Some(last) = pos.path.last_mut() {
                *last += 1;
            }
        }

        while pos.path.len() <= range.end.path.len() {
            let depth = pos.path.len() - 1;
            let offset = range.end.path[depth];
            if offset > pos.offset() {
                ranges.push(Range {
                    start: pos.clone(),
                    end: pos.with_offset(offset),
                });
            }
            pos = pos.with_offset(offset);
            pos.path.push(0);
        }
        Ok(ranges)
    }

    /// One step of a tree walk from `position`; `None` at a root boundary.
    pub fn step(
        &self,
        position: &Position,
        direction: Direction,
    ) -> Result<Option<WalkerValue<'_>>, ModelError> {
        let parent = self.parent(position)?;
        let offset = position.offset();
        let value = match direction {
            Direction::Forward => {
                if offset >= parent.max_offset() {
                    position.after_parent().map(|next| WalkerValue {
                        item: WalkerItem::ElementEnd(parent),
                        previous: position.clone(),
                        next,
                        length: 1,
                    })
                } else {
                    self.forward_item(parent, position, offset)
                }
            }
            Direction::Backward => {
                if offset == 0 {
                    position.before_parent().map(|next| WalkerValue {
                        item: WalkerItem::ElementStart(parent),
                        previous: position.clone(),
                        next,
                        length: 1,
                    })
                } else {
                    self.backward_item(parent, position, offset)
                }
            }
        };
        Ok(value)
    }

    fn forward_item<'a>(
        &self,
        parent: &'a ElementNode,
        position: &Position,
        offset: usize,
    ) -> Option<WalkerValue<'a>> {
        let (ix, start) = parent.index_at_offset(offset)?;
        Some(match &parent.children[ix] {
            Node::Text(t) => {
                let length = start + t.len() - offset;
                WalkerValue {
                    item: WalkerItem::Text(t),
                    previous: position.clone(),
                    next: position.with_offset(offset + length),
                    length,
                }
            }
            Node::Element(el) => WalkerValue {
                item: WalkerItem::ElementStart(el),
                previous: position.clone(),
                next: position.child(0),
                length: 1,
            },
        })
    }

    fn backward_item<'a>(
        &self,
        parent: &'a ElementNode,
        position: &Position,
        offset: usize,
    ) -> Option<WalkerValue<'a>> {
        let (ix, start) = parent.index_at_offset(offset - 1)?;
        Some(match &parent.children[ix] {
            Node::Text(t) => WalkerValue {
                item: WalkerItem::Text(t),
                previous: position.clone(),
                next: position.with_offset(start),
                length: offset - start,
            },
            Node::Element(el) => WalkerValue {
                item: WalkerItem::ElementEnd(el),
                previous: position.clone(),
                next: position.with_offset(offset - 1).child(el.max_offset()),
                length: 1,
            },
        })
    }

    /// Walks from `from` while `predicate` accepts each step and returns the
    /// last position reached. Never walks past the root boundaries.
    pub fn last_matching_position(
        &self,
        from: &Position,
        direction: Direction,
        mut predicate: impl FnMut(&WalkerValue<'_>) -> bool,
    ) -> Result<Position, ModelError> {
        let mut current = from.clone();
        while let Some(value) = self.step(&current, direction)? {
            if !predicate(&value) {
                break;
            }
            current = value.next;
        }
        Ok(current)
    }

    /// True when no content at all lies between the two positions.
    pub fn is_touching(&self, a: &Position, b: &Position) -> Result<bool, ModelError> {
        let (mut left, mut right) = match a.compare(b)? {
            crate::position::PositionRelation::Same => return Ok(true),
            crate::position::PositionRelation::Before => (a.clone(), b.clone()),
            crate::position::PositionRelation::After => (b.clone(), a.clone()),
        };
        while !left.path.is_empty() && !right.path.is_empty() {
            if left == right {
                return Ok(true);
            }
            if left.path.len() > right.path.len() {
                if left.offset() != self.parent(&left)?.max_offset() {
                    return Ok(false);
                }
                match left.after_parent() {
                    Some(next) => left = next,
                    None => return Ok(false),
                }
            } else {
                if right.offset() != 0 {
                    return Ok(false);
                }
                match right.before_parent() {
                    Some(next) => right = next,
                    None => return Ok(false),
                }
            }
        }
        Ok(false)
    }
}
