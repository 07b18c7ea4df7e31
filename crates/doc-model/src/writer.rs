use std::sync::Arc;

use serde_json::Value;

use crate::error::ModelError;
use crate::model::Model;
use crate::ops::{Op, moves_into_itself};
use crate::position::{Position, Range};
use crate::schema::{Schema, SchemaContext};
use crate::selection::Selection;
use crate::tree::{Attrs, Document, ElementNode, Node, TEXT_NAME};

/// Mutation handle for one [`Model::change`] batch.
pub struct Writer<'a> {
    model: &'a mut Model,
    inverse_ops: Vec<Op>,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(model: &'a mut Model) -> Self {
        Self {
            model,
            inverse_ops: Vec::new(),
        }
    }

    pub(crate) fn into_inverse_ops(self) -> Vec<Op> {
        self.inverse_ops
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn doc(&self) -> &Document {
        self.model.doc()
    }

    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(self.model.schema())
    }

    /// Nested change: runs inline and becomes part of the enclosing batch.
    pub fn change<R, E>(&mut self, f: impl FnOnce(&mut Writer<'a>) -> Result<R, E>) -> Result<R, E> {
        f(self)
    }

    pub fn has_changes(&self) -> bool {
        !self.inverse_ops.is_empty()
    }

    pub fn has_document_changes(&self) -> bool {
        self.inverse_ops.iter().any(Op::is_document_change)
    }

    pub(crate) fn apply(&mut self, op: Op) -> Result<(), ModelError> {
        let inverse = self.model.apply_op(op)?;
        self.inverse_ops.push(inverse);
        Ok(())
    }

    pub(crate) fn run_post_fixers(&mut self) -> Result<(), ModelError> {
        if !self.has_document_changes() {
            return Ok(());
        }
        let fixers = self.model.post_fixers();
        let limit = self.model.config().max_post_fix_iterations;
        for _ in 0..limit {
            let mut changed = false;
            for fixer in &fixers {
                if fixer.fix(self)? {
                    tracing::trace!(fixer = fixer.id(), "post-fixer changed the model");
                    changed = true;
                }
            }
            if !changed {
                return Ok(());
            }
        }
        Err(ModelError::PostFixersDidNotConverge(limit))
    }

    /// Inserts a text run; attributes the schema rejects there are dropped.
    /// Returns `false` when text is not allowed at `position`.
    pub fn insert_text(
        &mut self,
        text: &str,
        attrs: Attrs,
        position: &Position,
    ) -> Result<bool, ModelError> {
        if text.is_empty() {
            return Ok(false);
        }
        self.doc().check_position(position)?;
        let context = self.doc().context_at(position)?;
        let schema = self.schema();
        if !schema.check_child(&context, TEXT_NAME) {
            return Ok(false);
        }
        let text_context = context.push(TEXT_NAME);
        let attrs: Attrs = attrs
            .into_iter()
            .filter(|(key, _)| schema.check_attribute(&text_context, key))
            .collect();
        self.apply(Op::Insert {
            position: position.clone(),
            nodes: vec![Node::text_with(text, attrs)],
        })?;
        Ok(true)
    }

    /// Inserts `element` with its subtree. Returns `false` when the schema
    /// rejects the element or any node it carries; disallowed attributes are
    /// dropped.
    pub fn insert_element(
        &mut self,
        element: ElementNode,
        position: &Position,
    ) -> Result<bool, ModelError> {
        self.doc().check_position(position)?;
        let context = self.doc().context_at(position)?;
        let schema = self.schema();
        let inner = context.push(element.name.clone());
        if !schema.check_child(&context, &element.name)
            || !element
                .children
                .iter()
                .all(|child| fits_under(&schema, &inner, child))
        {
            return Ok(false);
        }
        let mut element = element;
        strip_attributes(&schema, &context, &mut element);
        self.apply(Op::Insert {
            position: position.clone(),
            nodes: vec![Node::Element(element)],
        })?;
        Ok(true)
    }

    /// Removes everything inside `range`, which may span several parents.
    pub fn remove(&mut self, range: &Range) -> Result<(), ModelError> {
        let flats = self.doc().flat_ranges(range)?;
        for flat in flats.into_iter().rev() {
            if !flat.is_collapsed() {
                self.apply(Op::Remove { range: flat })?;
            }
        }
        Ok(())
    }

    /// Removes the element (or the rest of the text run) starting at `position`.
    pub fn remove_node(&mut self, position: &Position) -> Result<(), ModelError> {
        let parent = self.doc().parent(position)?;
        let (ix, start) = parent.index_at_offset(position.offset()).ok_or_else(|| {
            ModelError::invalid_path(&position.root, &position.path, "no node at offset")
        })?;
        let end = start + parent.children[ix].size();
        self.apply(Op::Remove {
            range: Range {
                start: position.clone(),
                end: position.with_offset(end),
            },
        })
    }

    /// Moves a flat range to `target`, given in pre-move coordinates. Moving
    /// onto one of the range's own boundaries changes nothing. Returns `false`
    /// when the schema does not allow the moved nodes at `target`.
    pub fn move_range(&mut self, range: &Range, target: &Position) -> Result<bool, ModelError> {
        if !range.is_flat() {
            return Err(ModelError::NotFlat);
        }
        if moves_into_itself(range, target) {
            return Err(ModelError::MoveIntoItself);
        }
        let at_boundary = target.has_same_parent_as(&range.start)
            && (range.start.offset()..=range.end.offset()).contains(&target.offset());
        if range.is_collapsed() || at_boundary {
            return Ok(false);
        }
        self.doc().check_range(range)?;
        self.doc().check_position(target)?;
        let context = self.doc().context_at(target)?;
        let schema = self.schema();
        let parent = self.doc().element(range.root(), range.start.parent_path())?;
        let rejected = parent
            .items_between(range.start.offset(), range.end.offset())
            .iter()
            .any(|item| !fits_under(&schema, &context, item.node));
        if rejected {
            tracing::debug!(?target, "schema rejected move");
            return Ok(false);
        }
        self.apply(Op::Move {
            source: range.clone(),
            target: target.clone(),
        })?;
        Ok(true)
    }

    /// Renames the element at `position`. Returns `false` when the new name
    /// is not allowed there or equals the current one.
    pub fn rename(&mut self, position: &Position, new_name: &str) -> Result<bool, ModelError> {
        let old_name = self.element_at(position)?.name.clone();
        if old_name == new_name {
            return Ok(false);
        }
        if !self.schema().check_child_at(self.doc(), position, new_name) {
            return Ok(false);
        }
        self.apply(Op::Rename {
            position: position.clone(),
            old_name,
            new_name: new_name.to_string(),
        })?;
        Ok(true)
    }

    fn element_at(&self, position: &Position) -> Result<&ElementNode, ModelError> {
        self.doc()
            .parent(position)?
            .element_at_offset(position.offset())
            .ok_or_else(|| {
                ModelError::invalid_path(&position.root, &position.path, "no element at offset")
            })
    }

    /// Sets `key` on every part of `range` where the schema allows it.
    pub fn set_attribute(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        range: &Range,
    ) -> Result<(), ModelError> {
        let value = value.into();
        let valid = self
            .schema()
            .get_valid_ranges(self.doc(), std::slice::from_ref(range), key);
        for valid in valid {
            self.write_attribute(key, Some(&value), &valid)?;
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, key: &str, range: &Range) -> Result<(), ModelError> {
        let valid = self
            .schema()
            .get_valid_ranges(self.doc(), std::slice::from_ref(range), key);
        for valid in valid {
            self.write_attribute(key, None, &valid)?;
        }
        Ok(())
    }

    pub(crate) fn remove_attribute_unchecked(
        &mut self,
        key: &str,
        range: &Range,
    ) -> Result<(), ModelError> {
        self.write_attribute(key, None, range)
    }

    /// One operation per run of shallow items sharing the old value; runs that
    /// already hold `value` are skipped.
    fn write_attribute(
        &mut self,
        key: &str,
        value: Option<&Value>,
        range: &Range,
    ) -> Result<(), ModelError> {
        for flat in self.doc().flat_ranges(range)? {
            let parent = self.doc().element(flat.root(), flat.start.parent_path())?;
            let mut groups: Vec<(usize, usize, Option<Value>)> = Vec::new();
            for item in parent.items_between(flat.start.offset(), flat.end.offset()) {
                let old = item.node.attrs().get(key).cloned();
                match groups.last_mut() {
                    Some((_, end, last)) if *last == old && *end == item.start => *end = item.end,
                    _ => groups.push((item.start, item.end, old)),
                }
            }
            for (start, end, old) in groups {
                if old.as_ref() == value {
                    continue;
                }
                self.apply(Op::SetAttribute {
                    range: Range::flat(flat.root(), flat.start.parent_path(), start, end),
                    key: key.to_string(),
                    old_value: old,
                    new_value: value.cloned(),
                })?;
            }
        }
        Ok(())
    }

    /// Sets an attribute on the element at `position`. Returns `false` when
    /// the schema does not allow it there.
    pub fn set_node_attribute(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        position: &Position,
    ) -> Result<bool, ModelError> {
        let value = value.into();
        let element = self.element_at(position)?;
        let old_value = element.attrs.get(key).cloned();
        let context = self.doc().context_at(position)?.push(element.name.clone());
        if !self.schema().check_attribute(&context, key) {
            return Ok(false);
        }
        if old_value.as_ref() == Some(&value) {
            return Ok(true);
        }
        self.apply(Op::SetNodeAttribute {
            position: position.clone(),
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        })?;
        Ok(true)
    }

    pub fn remove_node_attribute(&mut self, key: &str, position: &Position) -> Result<(), ModelError> {
        let Some(old_value) = self.element_at(position)?.attrs.get(key).cloned() else {
            return Ok(());
        };
        self.apply(Op::SetNodeAttribute {
            position: position.clone(),
            key: key.to_string(),
            old_value: Some(old_value),
            new_value: None,
        })
    }

    pub fn add_marker(&mut self, name: &str, range: Range) -> Result<String, ModelError> {
        if self.model.markers().has(name) {
            return Err(ModelError::DuplicateMarkerName(name.to_string()));
        }
        self.doc().check_range(&range)?;
        self.apply(Op::SetMarker {
            name: name.to_string(),
            old_range: None,
            new_range: Some(range),
        })?;
        Ok(name.to_string())
    }

    /// Adds a marker under the first free `family:<n>` name.
    pub fn add_family_marker(&mut self, family: &str, range: Range) -> Result<String, ModelError> {
        let name = self.model.markers().unique_name(family);
        self.add_marker(&name, range)
    }

    /// Returns `false` when no marker has this name.
    pub fn update_marker(&mut self, name: &str, range: Range) -> Result<bool, ModelError> {
        let Some(old) = self.model.markers().get(name).map(|m| m.range.clone()) else {
            return Ok(false);
        };
        self.doc().check_range(&range)?;
        self.apply(Op::SetMarker {
            name: name.to_string(),
            old_range: Some(old),
            new_range: Some(range),
        })?;
        Ok(true)
    }

    /// Returns `false` when no marker has this name.
    pub fn remove_marker(&mut self, name: &str) -> bool {
        let Some(old) = self.model.markers_mut().set(name, None) else {
            return false;
        };
        self.inverse_ops.push(Op::SetMarker {
            name: name.to_string(),
            old_range: None,
            new_range: Some(old),
        });
        true
    }

    pub fn set_selection(&mut self, selection: Selection) -> Result<(), ModelError> {
        for range in selection.ranges() {
            self.doc().check_range(range)?;
        }
        *self.model.selection_mut() = selection;
        Ok(())
    }

    pub fn set_selection_attribute(&mut self, key: &str, value: impl Into<Value>) {
        self.model
            .selection_mut()
            .store_attribute(key, Some(value.into()));
    }

    pub fn remove_selection_attribute(&mut self, key: &str) {
        self.model.selection_mut().store_attribute(key, None);
    }

    /// A model-unique identifier such as `item-3`.
    pub fn unique_id(&mut self, prefix: &str) -> String {
        format!("{prefix}-{}", self.model.next_id())
    }
}

/// Whether `node` and everything below it may sit under `context`.
fn fits_under(schema: &Schema, context: &SchemaContext, node: &Node) -> bool {
    if !schema.check_child(context, node.name()) {
        return false;
    }
    match node {
        Node::Text(_) => true,
        Node::Element(el) => {
            let inner = context.push(el.name.clone());
            el.children.iter().all(|child| fits_under(schema, &inner, child))
        }
    }
}

fn strip_attributes(schema: &Schema, context: &SchemaContext, element: &mut ElementNode) {
    let inner = context.push(element.name.clone());
    element
        .attrs
        .retain(|key, _| schema.check_attribute(&inner, key));
    for child in &mut element.children {
        match child {
            Node::Element(el) => strip_attributes(schema, &inner, el),
            Node::Text(text) => {
                let text_context = inner.push(TEXT_NAME);
                text.attrs
                    .retain(|key, _| schema.check_attribute(&text_context, key));
            }
        }
    }
    element.merge_text_runs();
}
