use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::ModelError;
use crate::model::Model;
use crate::position::{Direction, Position, Range};
use crate::schema::Schema;
use crate::tree::{Document, ElementNode, Node, WalkerItem};

pub const LIST_ITEM_ID: &str = "list_item_id";
pub const LIST_INDENT: &str = "list_indent";
pub const LIST_TYPE: &str = "list_type";

/// List attributes carried by a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAttrs {
    pub item_id: String,
    pub indent: u64,
    pub list_type: Option<String>,
}

pub fn list_attrs(element: &ElementNode) -> Option<ListAttrs> {
    let item_id = element.attrs.get(LIST_ITEM_ID)?.as_str()?.to_string();
    let indent = element
        .attrs
        .get(LIST_INDENT)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let list_type = element
        .attrs
        .get(LIST_TYPE)
        .and_then(Value::as_str)
        .map(String::from);
    Some(ListAttrs {
        item_id,
        indent,
        list_type,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Also take the blocks nested under the selected items.
    pub with_nested: bool,
}

pub fn block_at<'d>(doc: &'d Document, block: &Position) -> Option<&'d ElementNode> {
    doc.element(&block.root, &block.path).ok()
}

/// Text blocks touched by the selection, in document order. A block whose
/// start is exactly the end of a non-collapsed range is left out.
pub fn selected_blocks(model: &Model) -> Vec<Position> {
    let doc = model.doc();
    let schema = model.schema();
    let mut seen: BTreeSet<(String, Vec<usize>)> = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |position: Position, out: &mut Vec<Position>| {
        if seen.insert((position.root.clone(), position.path.clone())) {
            out.push(position);
        }
    };

    for range in model.selection().ranges() {
        if let Some(block) = enclosing_text_block(doc, schema, &range.start) {
            push(block, &mut out);
        }
        if range.is_collapsed() {
            continue;
        }
        let mut position = range.start.clone();
        while position < range.end {
            let Ok(Some(step)) = doc.step(&position, Direction::Forward) else {
                break;
            };
            if let WalkerItem::ElementStart(el) = step.item
                && schema.is_text_block(&el.name)
                && step.next < range.end
            {
                push(position.clone(), &mut out);
            }
            position = step.next;
        }
    }
    out.sort_by(|a, b| a.root.cmp(&b.root).then_with(|| a.path.cmp(&b.path)));
    out
}

/// Every block that holds text directly, in document order across all roots.
pub fn text_blocks(doc: &Document, schema: &Schema) -> Vec<Position> {
    fn walk(
        element: &ElementNode,
        root: &str,
        path: &mut Vec<usize>,
        schema: &Schema,
        out: &mut Vec<Position>,
    ) {
        for (offset, child) in element.children_with_offsets() {
            let Node::Element(el) = child else {
                continue;
            };
            path.push(offset);
            if schema.is_text_block(&el.name) {
                out.push(Position::new(root, path.clone()));
            } else {
                walk(el, root, path, schema, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    for (name, root) in &doc.roots {
        walk(root, name, &mut Vec::new(), schema, &mut out);
    }
    out
}

/// The closest ancestor of `position` that holds text directly.
pub fn enclosing_text_block(
    doc: &Document,
    schema: &Schema,
    position: &Position,
) -> Option<Position> {
    let parent_path = position.parent_path();
    (1..=parent_path.len()).rev().find_map(|depth| {
        let path = parent_path[..depth].to_vec();
        let element = doc.element(&position.root, &path).ok()?;
        schema
            .is_text_block(&element.name)
            .then(|| Position::new(position.root.clone(), path))
    })
}

fn sibling_elements<'d>(
    doc: &'d Document,
    block: &Position,
) -> Result<Vec<(Position, &'d ElementNode)>, ModelError> {
    let parent = doc.parent(block)?;
    Ok(parent
        .children_with_offsets()
        .filter_map(|(offset, node)| match node {
            Node::Element(el) => Some((block.with_offset(offset), el)),
            Node::Text(_) => None,
        })
        .collect())
}

fn item_span(siblings: &[(Position, &ElementNode)], ix: usize) -> (usize, usize) {
    let Some(attrs) = list_attrs(siblings[ix].1) else {
        return (ix, ix);
    };
    let same_item = |other: &ListAttrs| other.indent == attrs.indent && other.item_id == attrs.item_id;

    let mut first = ix;
    for j in (0..ix).rev() {
        match list_attrs(siblings[j].1) {
            Some(other) if other.indent > attrs.indent => continue,
            Some(other) if same_item(&other) => first = j,
            _ => break,
        }
    }
    let mut last = ix;
    for (j, (_, el)) in siblings.iter().enumerate().skip(ix + 1) {
        match list_attrs(el) {
            Some(other) if other.indent > attrs.indent => continue,
            Some(other) if same_item(&other) => last = j,
            _ => break,
        }
    }
    (first, last)
}

/// Grows `blocks` to whole list items so a range operation never leaves an
/// item half converted. Blocks outside lists are returned as they are.
pub fn expand_to_complete_items(
    doc: &Document,
    blocks: &[Position],
    options: ExpandOptions,
) -> Vec<Position> {
    let mut seen: BTreeSet<(String, Vec<usize>)> = BTreeSet::new();
    let mut out = Vec::new();
    for block in blocks {
        let Ok(siblings) = sibling_elements(doc, block) else {
            continue;
        };
        let Some(ix) = siblings.iter().position(|(p, _)| p == block) else {
            continue;
        };
        let (first, last) = item_span(&siblings, ix);
        let indent = list_attrs(siblings[ix].1).map(|a| a.indent);

        let mut take: Vec<usize> = (first..=last)
            .filter(|&j| {
                options.with_nested
                    || list_attrs(siblings[j].1).map(|a| a.indent) == indent
            })
            .collect();
        if options.with_nested
            && let Some(indent) = indent
        {
            take.extend(
                siblings
                    .iter()
                    .enumerate()
                    .skip(last + 1)
                    .take_while(|(_, (_, el))| list_attrs(el).is_some_and(|a| a.indent > indent))
                    .map(|(j, _)| j),
            );
        }
        for j in take {
            let position = siblings[j].0.clone();
            if seen.insert((position.root.clone(), position.path.clone())) {
                out.push(position);
            }
        }
    }
    out.sort_by(|a, b| a.root.cmp(&b.root).then_with(|| a.path.cmp(&b.path)));
    out
}

/// True unless an earlier block of the same list item precedes `block`.
pub fn is_first_block_of_group(doc: &Document, block: &Position) -> bool {
    first_block_of_group(doc, block).is_none_or(|first| &first == block)
}

pub fn first_block_of_group(doc: &Document, block: &Position) -> Option<Position> {
    let siblings = sibling_elements(doc, block).ok()?;
    let ix = siblings.iter().position(|(p, _)| p == block)?;
    let (first, _) = item_span(&siblings, ix);
    Some(siblings[first].0.clone())
}

/// Maximal sub-ranges of `range` covered by text that carries `key`.
pub fn attribute_ranges(doc: &Document, range: &Range, key: &str) -> Vec<Range> {
    let mut out: Vec<Range> = Vec::new();
    let Ok(flats) = doc.flat_ranges(range) else {
        return out;
    };
    for flat in flats {
        collect_attribute_ranges(doc, &flat, key, &mut out);
    }
    out
}

fn collect_attribute_ranges(doc: &Document, flat: &Range, key: &str, out: &mut Vec<Range>) {
    let Ok(parent) = doc.element(flat.root(), flat.start.parent_path()) else {
        return;
    };
    let mut run: Option<(usize, usize)> = None;
    for item in parent.items_between(flat.start.offset(), flat.end.offset()) {
        match item.node {
            Node::Text(text) if text.attrs.contains_key(key) => {
                run = match run {
                    Some((start, end)) if end == item.start => Some((start, item.end)),
                    _ => Some((item.start, item.end)),
                };
            }
            node => {
                if let Some((start, end)) = run.take() {
                    out.push(Range::flat(flat.root(), flat.start.parent_path(), start, end));
                }
                if let Node::Element(el) = node {
                    let inner = flat.start.with_offset(item.start).child(0);
                    let inner = Range {
                        end: inner.with_offset(el.max_offset()),
                        start: inner,
                    };
                    collect_attribute_ranges(doc, &inner, key, out);
                }
            }
        }
    }
    if let Some((start, end)) = run {
        out.push(Range::flat(flat.root(), flat.start.parent_path(), start, end));
    }
}

/// The run around `position` whose text carries `key == value`, found by
/// walking both directions. Collapsed when nothing around matches.
pub fn caret_attribute_run(
    doc: &Document,
    position: &Position,
    key: &str,
    value: &Value,
) -> Result<Range, ModelError> {
    let start = doc.last_matching_position(position, Direction::Backward, |step| {
        matches!(step.item, WalkerItem::Text(_)) && step.attribute(key) == Some(value)
    })?;
    let end = doc.last_matching_position(position, Direction::Forward, |step| {
        matches!(step.item, WalkerItem::Text(_)) && step.attribute(key) == Some(value)
    })?;
    Ok(Range { start, end })
}
