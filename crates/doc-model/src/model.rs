use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::config::EditorConfig;
use crate::error::ModelError;
use crate::markers::{Marker, MarkerCollection};
use crate::normalize::{EnsureRootHasBlock, ListStructureFixer, PostFixer};
use crate::ops::{Op, apply_op_to};
use crate::position::{Direction, Position};
use crate::schema::Schema;
use crate::selection::Selection;
use crate::tree::{Document, MAIN_ROOT, Node, WalkerItem};
use crate::value::ModelValue;
use crate::writer::Writer;

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
    markers_before: BTreeMap<String, Marker>,
    markers_after: BTreeMap<String, Marker>,
}

/// The document, its schema, markers and selection. Every mutation goes
/// through [`Model::change`].
pub struct Model {
    doc: Document,
    schema: Arc<Schema>,
    markers: MarkerCollection,
    selection: Selection,
    config: EditorConfig,
    post_fixers: Vec<Arc<dyn PostFixer>>,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    version: u64,
    next_id: u64,
}

impl Model {
    pub fn new(doc: Document, schema: Schema, config: EditorConfig) -> Self {
        let config = config.with_defaults();
        let selection = Selection::collapsed(first_caret_position(&doc, &schema));
        Self {
            doc,
            schema: Arc::new(schema),
            markers: MarkerCollection::new(config.marker_families.clone()),
            selection,
            config,
            post_fixers: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            version: 0,
            next_id: 0,
        }
    }

    /// One empty paragraph under the rich-text schema with the structural
    /// post-fixers installed.
    pub fn richtext() -> Self {
        Self::with_document(Document::new(vec![Node::paragraph("")]))
    }

    pub fn with_document(doc: Document) -> Self {
        let mut model = Self::new(doc, Schema::richtext(), EditorConfig::default());
        model.add_post_fixer(EnsureRootHasBlock);
        model.add_post_fixer(ListStructureFixer);
        model
    }

    pub fn from_value(
        value: ModelValue,
        schema: Schema,
        config: EditorConfig,
    ) -> Result<Self, ModelError> {
        let ModelValue {
            version,
            document,
            markers,
            ..
        } = value;
        let mut model = Self::new(document, schema, config);
        for marker in markers {
            model.doc.check_range(&marker.range)?;
            if model.markers.has(&marker.name) {
                return Err(ModelError::DuplicateMarkerName(marker.name));
            }
            model.markers.set(&marker.name, Some(marker.range));
        }
        model.version = version;
        Ok(model)
    }

    pub fn to_value(&self) -> ModelValue {
        let mut value = ModelValue::from_document(self.doc.clone());
        value.version = self.version;
        value.markers = self.markers.iter().cloned().collect();
        value
    }

    pub fn add_post_fixer(&mut self, fixer: impl PostFixer + 'static) {
        self.post_fixers.push(Arc::new(fixer));
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn markers(&self) -> &MarkerCollection {
        &self.markers
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Bumped on every committed change, selection move, undo and redo.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Moves the selection outside a change. Stored caret attributes are dropped.
    pub fn set_selection(&mut self, selection: Selection) -> Result<(), ModelError> {
        for range in selection.ranges() {
            self.doc.check_range(range)?;
        }
        self.selection = selection;
        self.version += 1;
        Ok(())
    }

    /// Attribute value the selection reports: a stored caret override first,
    /// then the text before the caret (or after it at a block start), or the
    /// first text inside a non-collapsed selection.
    pub fn selection_attribute(&self, key: &str) -> Option<Value> {
        if let Some(stored) = self.selection.stored_attribute(key) {
            return stored.cloned();
        }
        let range = self.selection.first_range()?;
        if range.is_collapsed() {
            let (before, after) = self.doc.text_attrs_around(&range.start).ok()?;
            return before.or(after).and_then(|attrs| attrs.get(key)).cloned();
        }
        let mut position = range.start.clone();
        while position < range.end {
            let value = self.doc.step(&position, Direction::Forward).ok()??;
            if let WalkerItem::Text(text) = value.item {
                return text.attrs.get(key).cloned();
            }
            position = value.next;
        }
        None
    }

    /// Runs `f` as one batch. Nested [`Writer::change`] calls join the same
    /// batch; an error rolls every applied operation back.
    pub fn change<R, E>(
        &mut self,
        f: impl FnOnce(&mut Writer<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<ModelError>,
    {
        let selection_before = self.selection.clone();
        let markers_before = self.markers.snapshot();

        let mut writer = Writer::new(self);
        let result = match f(&mut writer) {
            Ok(value) => writer.run_post_fixers().map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };
        let inverse_ops = writer.into_inverse_ops();

        match result {
            Ok(value) => {
                self.commit(inverse_ops, selection_before, markers_before);
                Ok(value)
            }
            Err(err) => {
                self.rollback(inverse_ops, selection_before, markers_before);
                Err(err)
            }
        }
    }

    fn commit(
        &mut self,
        mut inverse_ops: Vec<Op>,
        selection_before: Selection,
        markers_before: BTreeMap<String, Marker>,
    ) {
        if inverse_ops.is_empty() {
            if self.selection != selection_before {
                self.version += 1;
            }
            return;
        }
        self.version += 1;
        let changed_document = inverse_ops.iter().any(Op::is_document_change);
        tracing::debug!(
            ops = inverse_ops.len(),
            version = self.version,
            changed_document,
            "committed change"
        );
        if !changed_document {
            return;
        }

        inverse_ops.reverse();
        self.undo_stack.push(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: self.selection.clone(),
            markers_before,
            markers_after: self.markers.snapshot(),
        });
        self.redo_stack.clear();
        if self.undo_stack.len() > self.config.max_undo {
            self.undo_stack.remove(0);
        }
    }

    fn rollback(
        &mut self,
        inverse_ops: Vec<Op>,
        selection_before: Selection,
        markers_before: BTreeMap<String, Marker>,
    ) {
        let count = inverse_ops.len();
        for op in inverse_ops.into_iter().rev() {
            if let Err(err) = apply_op_to(&mut self.doc, op) {
                tracing::error!(%err, "failed to roll back operation");
                break;
            }
        }
        self.selection = selection_before;
        self.markers.replace_all(markers_before);
        tracing::debug!(ops = count, "rolled back change");
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };
        let Some(redo_ops) = self.replay(&record.inverse_ops) else {
            self.undo_stack.push(record);
            return false;
        };
        self.selection = record.selection_before.clone();
        self.markers.replace_all(record.markers_before.clone());
        self.version += 1;
        tracing::debug!(version = self.version, "undo");
        self.redo_stack.push(UndoRecord {
            inverse_ops: redo_ops,
            ..record
        });
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };
        let Some(undo_ops) = self.replay(&record.inverse_ops) else {
            self.redo_stack.push(record);
            return false;
        };
        self.selection = record.selection_after.clone();
        self.markers.replace_all(record.markers_after.clone());
        self.version += 1;
        tracing::debug!(version = self.version, "redo");
        self.undo_stack.push(UndoRecord {
            inverse_ops: undo_ops,
            ..record
        });
        true
    }

    /// Applies a history record. When one operation fails the ones already
    /// applied are reverted and `None` is returned.
    fn replay(&mut self, ops: &[Op]) -> Option<Vec<Op>> {
        let mut inverse: Vec<Op> = Vec::new();
        for op in ops.iter().cloned() {
            match apply_op_to(&mut self.doc, op) {
                Ok(inv) => inverse.push(inv),
                Err(err) => {
                    tracing::warn!(%err, "history operation no longer applies");
                    for op in inverse.into_iter().rev() {
                        if let Err(err) = apply_op_to(&mut self.doc, op) {
                            tracing::error!(%err, "failed to revert history replay");
                            break;
                        }
                    }
                    return None;
                }
            }
        }
        inverse.reverse();
        Some(inverse)
    }

    /// Applies one operation and rebases markers and selection over it.
    pub(crate) fn apply_op(&mut self, op: Op) -> Result<Op, ModelError> {
        let inverse = apply_op_to(&mut self.doc, op.clone())?;
        match &op {
            Op::SetMarker {
                name, new_range, ..
            } => {
                self.markers.set(name, new_range.clone());
            }
            op if op.is_structural() => {
                let outcome = self.markers.rebase(op);
                if !outcome.is_empty() {
                    tracing::trace!(
                        removed = ?outcome.removed,
                        merged = ?outcome.merged,
                        "rebased markers"
                    );
                }
                self.selection.rebase(op);
            }
            _ => {}
        }
        Ok(inverse)
    }

    pub(crate) fn markers_mut(&mut self) -> &mut MarkerCollection {
        &mut self.markers
    }

    pub(crate) fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub(crate) fn post_fixers(&self) -> Vec<Arc<dyn PostFixer>> {
        self.post_fixers.clone()
    }

    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// The start of the first block that accepts text, else the start of the root.
fn first_caret_position(doc: &Document, schema: &Schema) -> Position {
    let Some(root) = doc.root(MAIN_ROOT) else {
        return Position::main(vec![0]);
    };
    root.children_with_offsets()
        .find(|(_, node)| schema.is_text_block(node.name()))
        .map(|(offset, _)| Position::main(vec![offset, 0]))
        .unwrap_or_else(|| Position::main(vec![0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Range;

    #[test]
    fn failed_undo_leaves_document_and_history_untouched() {
        let mut model = Model::with_document(Document::new(vec![Node::paragraph("abc")]));
        model
            .change(|writer| {
                writer.insert_text("x", Default::default(), &Position::main(vec![0, 0]))
            })
            .unwrap();
        model.undo_stack[0].inverse_ops.push(Op::Remove {
            range: Range::main(&[7], 0, 1),
        });
        let doc = model.doc().clone();
        let version = model.version();

        assert!(!model.undo());
        assert_eq!(model.doc(), &doc);
        assert_eq!(model.version(), version);
        assert!(model.can_undo());
        assert!(!model.can_redo());
        assert_eq!(model.doc().element(MAIN_ROOT, &[0]).unwrap().inline_text(), "xabc");
    }
}
