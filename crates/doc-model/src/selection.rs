use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::Op;
use crate::position::{Position, Range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<Range>,
    #[serde(default)]
    backward: bool,
    /// Attributes set or removed (`None`) on a caret, cleared when it moves.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    stored: BTreeMap<String, Option<Value>>,
}

impl Default for Selection {
    fn default() -> Self {
        Self::collapsed(Position::main(vec![0]))
    }
}

impl Selection {
    pub fn collapsed(position: Position) -> Self {
        Self::from_range(Range::collapsed(position))
    }

    pub fn from_range(range: Range) -> Self {
        Self::from_ranges(vec![range], false)
    }

    /// An empty list yields a caret at the start of the main root.
    pub fn from_ranges(mut ranges: Vec<Range>, backward: bool) -> Self {
        if ranges.is_empty() {
            return Self::default();
        }
        ranges.sort_by(|a, b| {
            a.start
                .root
                .cmp(&b.start.root)
                .then_with(|| a.start.path.cmp(&b.start.path))
        });
        Self {
            ranges,
            backward,
            stored: BTreeMap::new(),
        }
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn first_range(&self) -> Option<&Range> {
        self.ranges.first()
    }

    pub fn last_range(&self) -> Option<&Range> {
        self.ranges.last()
    }

    pub fn is_backward(&self) -> bool {
        self.backward
    }

    pub fn anchor(&self) -> Option<&Position> {
        if self.backward {
            self.last_range().map(|r| &r.end)
        } else {
            self.first_range().map(|r| &r.start)
        }
    }

    pub fn focus(&self) -> Option<&Position> {
        if self.backward {
            self.first_range().map(|r| &r.start)
        } else {
            self.last_range().map(|r| &r.end)
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0].is_collapsed()
    }

    /// `Some(None)` when the attribute was explicitly removed on the caret.
    pub fn stored_attribute(&self, key: &str) -> Option<Option<&Value>> {
        self.stored.get(key).map(Option::as_ref)
    }

    pub(crate) fn store_attribute(&mut self, key: &str, value: Option<Value>) {
        self.stored.insert(key.to_string(), value);
    }

    pub(crate) fn rebase(&mut self, op: &Op) {
        for range in &mut self.ranges {
            *range = op.transform_range(range);
        }
    }
}
