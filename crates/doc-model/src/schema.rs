use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::model::Model;
use crate::position::{Position, Range};
use crate::tree::{Document, ElementNode, Node, ROOT_ELEMENT, TEXT_NAME};
use crate::writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Root,
    Block,
    Inline,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildConstraint {
    None,
    BlockOnly,
    InlineOnly,
    Any,
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub role: NodeRole,
    #[serde(default)]
    pub is_object: bool,
    pub children: ChildConstraint,
    /// Parents this node may live in. Empty means any parent that accepts its role.
    #[serde(default)]
    pub allow_in: Vec<String>,
    #[serde(default)]
    pub allow_attributes: Vec<String>,
}

impl NodeSpec {
    pub fn block(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: NodeRole::Block,
            is_object: false,
            children: ChildConstraint::InlineOnly,
            allow_in: Vec::new(),
            allow_attributes: Vec::new(),
        }
    }

    pub fn inline_object(name: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Inline,
            is_object: true,
            children: ChildConstraint::None,
            ..Self::block(name)
        }
    }

    pub fn text() -> Self {
        Self {
            role: NodeRole::Text,
            children: ChildConstraint::None,
            ..Self::block(TEXT_NAME)
        }
    }

    pub fn root() -> Self {
        Self {
            role: NodeRole::Root,
            children: ChildConstraint::BlockOnly,
            ..Self::block(ROOT_ELEMENT)
        }
    }

    pub fn object(mut self) -> Self {
        self.is_object = true;
        self.children = ChildConstraint::None;
        self
    }

    pub fn children(mut self, children: ChildConstraint) -> Self {
        self.children = children;
        self
    }

    pub fn allow_in<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_in = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn attributes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_attributes = keys.into_iter().map(Into::into).collect();
        self
    }

    /// A block that holds inline content directly.
    pub fn is_text_block(&self) -> bool {
        self.role == NodeRole::Block && self.children == ChildConstraint::InlineOnly
    }
}

/// Names of the nodes from a root down to the node a query is about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaContext {
    items: Vec<String>,
}

impl SchemaContext {
    pub fn new(items: Vec<String>) -> Self {
        Self { items }
    }

    pub fn last(&self) -> Option<&str> {
        self.items.last().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item == name)
    }

    pub fn names(&self) -> &[String] {
        &self.items
    }

    pub fn push(&self, name: impl Into<String>) -> Self {
        let mut items = self.items.clone();
        items.push(name.into());
        Self { items }
    }
}

/// Overrides attribute legality. `None` defers to later checks and the
/// declarative rules.
pub trait AttributeCheck: Send + Sync {
    fn check(&self, context: &SchemaContext, key: &str) -> Option<bool>;
}

impl<F> AttributeCheck for F
where
    F: Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync,
{
    fn check(&self, context: &SchemaContext, key: &str) -> Option<bool> {
        self(context, key)
    }
}

/// Overrides child legality; `context` ends with the parent.
pub trait ChildCheck: Send + Sync {
    fn check(&self, context: &SchemaContext, child: &str) -> Option<bool>;
}

impl<F> ChildCheck for F
where
    F: Fn(&SchemaContext, &str) -> Option<bool> + Send + Sync,
{
    fn check(&self, context: &SchemaContext, child: &str) -> Option<bool> {
        self(context, child)
    }
}

#[derive(Default)]
pub struct Schema {
    specs: HashMap<String, NodeSpec>,
    attribute_checks: Vec<Box<dyn AttributeCheck>>,
    child_checks: Vec<Box<dyn ChildCheck>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.specs.keys().collect();
        names.sort();
        f.debug_struct("Schema")
            .field("specs", &names)
            .field("attribute_checks", &self.attribute_checks.len())
            .field("child_checks", &self.child_checks.len())
            .finish()
    }
}

impl Schema {
    /// A schema that only knows the root and text.
    pub fn new() -> Self {
        let mut schema = Self::default();
        schema.specs.insert(ROOT_ELEMENT.to_string(), NodeSpec::root());
        schema.specs.insert(TEXT_NAME.to_string(), NodeSpec::text());
        schema
    }

    pub fn richtext() -> Self {
        let mut schema = Self::new();
        let specs = [
            NodeSpec::block("paragraph").attributes([
                "list_item_id",
                "list_indent",
                "list_type",
                "alignment",
            ]),
            NodeSpec::block("heading1").attributes(["alignment"]),
            NodeSpec::block("heading2").attributes(["alignment"]),
            NodeSpec::block("heading3").attributes(["alignment"]),
            NodeSpec::block("code_block").attributes(["language"]),
            NodeSpec::block("blockquote").children(ChildConstraint::BlockOnly),
            NodeSpec::block("image").object().attributes(["src", "alt"]),
            NodeSpec::inline_object("soft_break"),
        ];
        for spec in specs {
            schema.specs.insert(spec.name.clone(), spec);
        }
        if let Some(text) = schema.specs.get_mut(TEXT_NAME) {
            text.allow_attributes = ["bold", "italic", "underline", "code", "link", "exception"]
                .into_iter()
                .map(String::from)
                .collect();
        }
        schema.add_attribute_check(|context: &SchemaContext, key: &str| {
            (context.last() == Some(TEXT_NAME) && context.contains("code_block") && key != "exception")
                .then_some(false)
        });
        schema
    }

    pub fn register(&mut self, spec: NodeSpec) -> Result<(), ModelError> {
        if self.specs.contains_key(&spec.name) {
            return Err(ModelError::DuplicateSchemaItem(spec.name));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Lets `key` live on the node named `item`.
    pub fn extend_attributes(&mut self, item: &str, keys: &[&str]) {
        if let Some(spec) = self.specs.get_mut(item) {
            for key in keys {
                if !spec.allow_attributes.iter().any(|k| k == key) {
                    spec.allow_attributes.push((*key).to_string());
                }
            }
        }
    }

    pub fn add_attribute_check(&mut self, check: impl AttributeCheck + 'static) {
        self.attribute_checks.push(Box::new(check));
    }

    pub fn add_child_check(&mut self, check: impl ChildCheck + 'static) {
        self.child_checks.push(Box::new(check));
    }

    pub fn spec(&self, name: &str) -> Option<&NodeSpec> {
        self.specs.get(name)
    }

    pub fn is_block(&self, name: &str) -> bool {
        self.spec(name).is_some_and(|s| s.role == NodeRole::Block)
    }

    pub fn is_inline(&self, name: &str) -> bool {
        self.spec(name)
            .is_some_and(|s| matches!(s.role, NodeRole::Inline | NodeRole::Text))
    }

    pub fn is_object(&self, name: &str) -> bool {
        self.spec(name).is_some_and(|s| s.is_object)
    }

    pub fn is_text_block(&self, name: &str) -> bool {
        self.spec(name).is_some_and(NodeSpec::is_text_block)
    }

    pub fn check_child(&self, context: &SchemaContext, child: &str) -> bool {
        for check in self.child_checks.iter().rev() {
            if let Some(allowed) = check.check(context, child) {
                return allowed;
            }
        }
        let Some(parent) = context.last().and_then(|name| self.spec(name)) else {
            return false;
        };
        let Some(child_spec) = self.spec(child) else {
            return false;
        };
        let by_role = match &parent.children {
            ChildConstraint::None => false,
            ChildConstraint::BlockOnly => child_spec.role == NodeRole::Block,
            ChildConstraint::InlineOnly => {
                matches!(child_spec.role, NodeRole::Inline | NodeRole::Text)
            }
            ChildConstraint::Any => child_spec.role != NodeRole::Root,
            ChildConstraint::Only(names) => names.iter().any(|n| n == child),
        };
        by_role && (child_spec.allow_in.is_empty() || child_spec.allow_in.contains(&parent.name))
    }

    pub fn check_child_at(&self, doc: &Document, position: &Position, child: &str) -> bool {
        doc.context_at(position)
            .map(|context| self.check_child(&context, child))
            .unwrap_or(false)
    }

    /// `context` ends with the node that would carry the attribute.
    pub fn check_attribute(&self, context: &SchemaContext, key: &str) -> bool {
        for check in self.attribute_checks.iter().rev() {
            if let Some(allowed) = check.check(context, key) {
                return allowed;
            }
        }
        context
            .last()
            .and_then(|name| self.spec(name))
            .is_some_and(|spec| spec.allow_attributes.iter().any(|k| k == key))
    }

    /// Clips `ranges` to the sub-ranges where `key` may be set.
    pub fn get_valid_ranges(&self, doc: &Document, ranges: &[Range], key: &str) -> Vec<Range> {
        let mut out = Vec::new();
        for range in ranges {
            let flats = match doc.flat_ranges(range) {
                Ok(flats) => flats,
                Err(err) => {
                    tracing::warn!(%err, key, "skipping invalid range in attribute validation");
                    continue;
                }
            };
            for flat in flats {
                if let Err(err) = self.valid_ranges_in_flat(doc, &flat, key, &mut out) {
                    tracing::warn!(%err, key, "skipping invalid range in attribute validation");
                }
            }
        }
        out.sort_by(|a, b| a.start.path.cmp(&b.start.path));
        out
    }

    fn valid_ranges_in_flat(
        &self,
        doc: &Document,
        flat: &Range,
        key: &str,
        out: &mut Vec<Range>,
    ) -> Result<(), ModelError> {
        let parent = doc.element(flat.root(), flat.start.parent_path())?;
        let context = doc.context_at(&flat.start)?;
        let mut run_start = flat.start.offset();
        for item in parent.items_between(flat.start.offset(), flat.end.offset()) {
            if let Node::Element(el) = item.node {
                let inner = flat.start.with_offset(item.start).child(0);
                let inner = Range {
                    end: inner.with_offset(el.max_offset()),
                    start: inner,
                };
                if !inner.is_collapsed() {
                    self.valid_ranges_in_flat(doc, &inner, key, out)?;
                }
            }
            if !self.check_attribute(&context.push(item.node.name()), key) {
                if item.start > run_start {
                    out.push(Range::flat(
                        flat.root(),
                        flat.start.parent_path(),
                        run_start,
                        item.start,
                    ));
                }
                run_start = item.end;
            }
        }
        if flat.end.offset() > run_start {
            out.push(Range::flat(
                flat.root(),
                flat.start.parent_path(),
                run_start,
                flat.end.offset(),
            ));
        }
        Ok(())
    }

    /// Strips attributes that are no longer legal for the nodes at `positions`
    /// (and their descendants) in their current context.
    pub fn remove_disallowed_attributes(
        &self,
        positions: &[Position],
        writer: &mut Writer<'_>,
    ) -> Result<(), ModelError> {
        for position in positions {
            let parent = writer.model().doc().parent(position)?.clone();
            let context = writer.model().doc().context_at(position)?;
            let Some((ix, start)) = parent.index_at_offset(position.offset()) else {
                continue;
            };
            let node = &parent.children[ix];
            let anchor = position.with_offset(start);
            self.strip_node(node, &anchor, &context, writer)?;
        }
        Ok(())
    }

    fn strip_node(
        &self,
        node: &Node,
        position: &Position,
        context: &SchemaContext,
        writer: &mut Writer<'_>,
    ) -> Result<(), ModelError> {
        let node_context = context.push(node.name());
        let disallowed: Vec<String> = node
            .attrs()
            .keys()
            .filter(|key| !self.check_attribute(&node_context, key))
            .cloned()
            .collect();
        match node {
            Node::Text(text) => {
                let range = Range {
                    start: position.clone(),
                    end: position.shifted_by(text.len() as isize),
                };
                for key in disallowed {
                    writer.remove_attribute_unchecked(&key, &range)?;
                }
            }
            Node::Element(el) => {
                for key in disallowed {
                    writer.remove_node_attribute(&key, position)?;
                }
                self.strip_children(el, position, &node_context, writer)?;
            }
        }
        Ok(())
    }

    fn strip_children(
        &self,
        el: &ElementNode,
        position: &Position,
        context: &SchemaContext,
        writer: &mut Writer<'_>,
    ) -> Result<(), ModelError> {
        for (offset, child) in el.children_with_offsets() {
            self.strip_node(child, &position.child(offset), context, writer)?;
        }
        Ok(())
    }

    /// Whether `key` may be applied to the current selection.
    pub fn check_attribute_in_selection(&self, model: &Model, key: &str) -> bool {
        let selection = model.selection();
        if selection.is_collapsed() {
            let Some(range) = selection.first_range() else {
                return false;
            };
            return model
                .doc()
                .context_at(&range.start)
                .map(|context| {
                    self.check_child(&context, TEXT_NAME)
                        && self.check_attribute(&context.push(TEXT_NAME), key)
                })
                .unwrap_or(false);
        }
        !self
            .get_valid_ranges(model.doc(), selection.ranges(), key)
            .is_empty()
    }
}
