use serde_json::Value;

use crate::error::ModelError;
use crate::markers::Marker;
use crate::position::{Position, Range};
use crate::resolver::{LIST_INDENT, LIST_TYPE, ListAttrs, attribute_ranges, list_attrs};
use crate::tree::{ElementNode, Node};
use crate::writer::Writer;

/// Runs after a batch's own operations and before commit, until no fixer
/// reports a change.
pub trait PostFixer: Send + Sync {
    fn id(&self) -> &'static str;
    fn fix(&self, writer: &mut Writer<'_>) -> Result<bool, ModelError>;
}

/// Inserts an empty paragraph into any root left without children.
pub struct EnsureRootHasBlock;

impl PostFixer for EnsureRootHasBlock {
    fn id(&self) -> &'static str {
        "core.ensure_root_has_block"
    }

    fn fix(&self, writer: &mut Writer<'_>) -> Result<bool, ModelError> {
        let empty: Vec<String> = writer
            .doc()
            .roots
            .iter()
            .filter(|(_, root)| root.children.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        let mut changed = false;
        for root in empty {
            let position = Position::new(root, vec![0]);
            changed |= writer.insert_element(ElementNode::new("paragraph"), &position)?;
        }
        Ok(changed)
    }
}

pub const EXCEPTION_ATTRIBUTE: &str = "exception";
pub const EXCEPTION_FAMILY: &str = "exception";

/// Keeps exactly one `exception:<n>` marker over every contiguous run of text
/// carrying the `exception` attribute.
pub struct ExceptionMarkerSync;

impl PostFixer for ExceptionMarkerSync {
    fn id(&self) -> &'static str {
        "restricted_editing.exception_markers"
    }

    fn fix(&self, writer: &mut Writer<'_>) -> Result<bool, ModelError> {
        let mut runs: Vec<Range> = Vec::new();
        for (name, root) in &writer.doc().roots {
            let whole = Range::flat(name.clone(), &[], 0, root.max_offset());
            runs.extend(attribute_ranges(writer.doc(), &whole, EXCEPTION_ATTRIBUTE));
        }
        let mut unclaimed: Vec<Marker> = writer
            .model()
            .markers()
            .family(EXCEPTION_FAMILY)
            .into_iter()
            .cloned()
            .collect();

        let mut changed = false;
        for run in runs {
            let claimed = unclaimed
                .iter()
                .position(|marker| marker.range.touches(&run).unwrap_or(false));
            match claimed {
                Some(ix) => {
                    let marker = unclaimed.remove(ix);
                    if marker.range != run {
                        changed |= writer.update_marker(&marker.name, run)?;
                    }
                }
                None => {
                    writer.add_family_marker(EXCEPTION_FAMILY, run)?;
                    changed = true;
                }
            }
        }
        for marker in unclaimed {
            changed |= writer.remove_marker(&marker.name);
        }
        Ok(changed)
    }
}

/// Keeps list blocks consistent: later blocks of an item take the item's list
/// type from its first block, and an indent never jumps more than one level
/// past the previous list block.
pub struct ListStructureFixer;

impl ListStructureFixer {
    fn fix_children(
        &self,
        writer: &mut Writer<'_>,
        parent: &Position,
        children: &[Node],
    ) -> Result<bool, ModelError> {
        let mut changed = false;
        let mut previous: Option<ListAttrs> = None;
        let mut item_heads: Vec<ListAttrs> = Vec::new();

        for (offset, child) in offset_children(children) {
            let Node::Element(el) = child else {
                previous = None;
                continue;
            };
            let position = parent.with_offset(offset);
            if !el.children.is_empty() && !writer.schema().is_text_block(&el.name) {
                changed |= self.fix_children(writer, &position.child(0), &el.children)?;
            }
            let Some(mut attrs) = list_attrs(el) else {
                previous = None;
                item_heads.clear();
                continue;
            };

            let max_indent = previous.as_ref().map(|p| p.indent + 1).unwrap_or(0);
            if attrs.indent > max_indent {
                attrs.indent = max_indent;
                changed |= writer.set_node_attribute(LIST_INDENT, max_indent, &position)?;
            }

            item_heads.retain(|head| head.indent <= attrs.indent);
            let head = item_heads
                .iter()
                .find(|head| head.indent == attrs.indent && head.item_id == attrs.item_id)
                .cloned();
            match head {
                Some(head) if head.list_type != attrs.list_type => {
                    if let Some(list_type) = &head.list_type {
                        changed |= writer.set_node_attribute(
                            LIST_TYPE,
                            Value::from(list_type.as_str()),
                            &position,
                        )?;
                    }
                    attrs.list_type = head.list_type;
                }
                Some(_) => {}
                None => {
                    item_heads.retain(|head| head.indent < attrs.indent);
                    item_heads.push(attrs.clone());
                }
            }
            previous = Some(attrs);
        }
        Ok(changed)
    }
}

fn offset_children(children: &[Node]) -> Vec<(usize, &Node)> {
    let mut offset = 0usize;
    children
        .iter()
        .map(|child| {
            let start = offset;
            offset += child.size();
            (start, child)
        })
        .collect()
}

impl PostFixer for ListStructureFixer {
    fn id(&self) -> &'static str {
        "list.structure"
    }

    fn fix(&self, writer: &mut Writer<'_>) -> Result<bool, ModelError> {
        let roots: Vec<(String, Vec<Node>)> = writer
            .doc()
            .roots
            .iter()
            .map(|(name, root)| (name.clone(), root.children.clone()))
            .collect();
        let mut changed = false;
        for (name, children) in roots {
            changed |= self.fix_children(writer, &Position::new(name, vec![0]), &children)?;
        }
        Ok(changed)
    }
}
