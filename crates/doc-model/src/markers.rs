use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ops::Op;
use crate::position::{Boundary, Position, Range};

/// What happens to a marker whose range becomes collapsed after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollapsePolicy {
    Remove,
    #[default]
    KeepCollapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkerFamilyConfig {
    #[serde(default)]
    pub on_collapse: CollapsePolicy,
    /// Merge markers of this family that touch or overlap after an edit.
    #[serde(default)]
    pub merge_touching: bool,
}

impl MarkerFamilyConfig {
    pub fn removed_on_collapse() -> Self {
        Self {
            on_collapse: CollapsePolicy::Remove,
            merge_touching: false,
        }
    }

    pub fn merging(mut self) -> Self {
        self.merge_touching = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub name: String,
    pub range: Range,
}

impl Marker {
    pub fn family(&self) -> &str {
        marker_family(&self.name)
    }
}

/// The family of `exception:3` is `exception`; a name without `:` is its own family.
pub fn marker_family(name: &str) -> &str {
    name.split_once(':').map(|(family, _)| family).unwrap_or(name)
}

/// Outcome of rebasing the collection over one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerRebase {
    pub removed: Vec<String>,
    /// `(absorbed, into)` pairs.
    pub merged: Vec<(String, String)>,
}

impl MarkerRebase {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.merged.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerCollection {
    markers: BTreeMap<String, Marker>,
    families: BTreeMap<String, MarkerFamilyConfig>,
}

impl MarkerCollection {
    pub fn new(families: BTreeMap<String, MarkerFamilyConfig>) -> Self {
        Self {
            markers: BTreeMap::new(),
            families,
        }
    }

    pub fn family_config(&self, family: &str) -> MarkerFamilyConfig {
        self.families.get(family).copied().unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&Marker> {
        self.markers.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.markers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Markers of one family in document order.
    pub fn family(&self, family: &str) -> Vec<&Marker> {
        let mut out: Vec<&Marker> = self
            .markers
            .values()
            .filter(|m| m.family() == family)
            .collect();
        sort_by_start(&mut out);
        out
    }

    /// Markers whose range contains `position`, boundaries included.
    /// Markers in other roots are skipped.
    pub fn markers_at_position(&self, position: &Position) -> Vec<&Marker> {
        let mut out: Vec<&Marker> = self
            .markers
            .values()
            .filter(|m| {
                m.range
                    .contains_position(position, Boundary::Inclusive)
                    .unwrap_or(false)
            })
            .collect();
        sort_by_start(&mut out);
        out
    }

    /// Markers sharing content with `range`. Unless `skip_boundaries` is set,
    /// markers that only touch the range at a boundary are included too.
    pub fn markers_intersecting_range(&self, range: &Range, skip_boundaries: bool) -> Vec<&Marker> {
        let mut out: Vec<&Marker> = self
            .markers
            .values()
            .filter(|m| {
                let hit = if skip_boundaries {
                    m.range.intersects(range)
                } else {
                    m.range.touches(range)
                };
                hit.unwrap_or(false)
            })
            .collect();
        sort_by_start(&mut out);
        out
    }

    /// First free `family:<n>` name, counting from 1.
    pub fn unique_name(&self, family: &str) -> String {
        (1usize..)
            .map(|n| format!("{family}:{n}"))
            .find(|name| !self.markers.contains_key(name))
            .unwrap_or_else(|| family.to_string())
    }

    /// Stores or clears a marker and returns its previous range.
    pub(crate) fn set(&mut self, name: &str, range: Option<Range>) -> Option<Range> {
        let previous = match range {
            Some(range) => self.markers.insert(
                name.to_string(),
                Marker {
                    name: name.to_string(),
                    range,
                },
            ),
            None => self.markers.remove(name),
        };
        previous.map(|m| m.range)
    }

    pub(crate) fn replace_all(&mut self, markers: BTreeMap<String, Marker>) {
        self.markers = markers;
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, Marker> {
        self.markers.clone()
    }

    /// Maps every marker through a structural operation, then applies the
    /// per-family collapse and merge rules.
    pub(crate) fn rebase(&mut self, op: &Op) -> MarkerRebase {
        let mut outcome = MarkerRebase::default();
        if !op.is_structural() {
            return outcome;
        }

        let names: Vec<String> = self.markers.keys().cloned().collect();
        for name in names {
            let Some(marker) = self.markers.get_mut(&name) else {
                continue;
            };
            let was_collapsed = marker.range.is_collapsed();
            marker.range = op.transform_range(&marker.range);
            if !was_collapsed
                && marker.range.is_collapsed()
                && self
                    .families
                    .get(marker_family(&name))
                    .is_some_and(|config| config.on_collapse == CollapsePolicy::Remove)
            {
                self.markers.remove(&name);
                outcome.removed.push(name);
            }
        }

        let merging: Vec<String> = self
            .families
            .iter()
            .filter(|(_, config)| config.merge_touching)
            .map(|(family, _)| family.clone())
            .collect();
        for family in merging {
            outcome.merged.extend(self.merge_family(&family));
        }
        outcome
    }

    fn merge_family(&mut self, family: &str) -> Vec<(String, String)> {
        let ordered: Vec<(String, Range)> = self
            .family(family)
            .into_iter()
            .map(|m| (m.name.clone(), m.range.clone()))
            .collect();

        let mut merged = Vec::new();
        let mut current: Option<(String, Range)> = None;
        for (name, range) in ordered {
            let touches = matches!(
                &current,
                Some((_, kept)) if kept.root() == range.root() && range.start <= kept.end
            );
            if touches && let Some((keep, kept)) = current.as_mut() {
                if range.end > kept.end {
                    kept.end = range.end;
                }
                self.markers.remove(&name);
                merged.push((name, keep.clone()));
                continue;
            }
            if let Some((keep, kept)) = current.take() {
                self.set(&keep, Some(kept));
            }
            current = Some((name, range));
        }
        if let Some((keep, kept)) = current {
            self.set(&keep, Some(kept));
        }
        merged
    }
}

fn sort_by_start(markers: &mut [&Marker]) {
    markers.sort_by(|a, b| {
        a.range
            .start
            .root
            .cmp(&b.range.start.root)
            .then_with(|| a.range.start.path.cmp(&b.range.start.path))
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn collection() -> MarkerCollection {
        let mut families = BTreeMap::new();
        families.insert(
            "exception".to_string(),
            MarkerFamilyConfig::removed_on_collapse().merging(),
        );
        MarkerCollection::new(families)
    }

    #[test]
    fn family_is_prefix_before_colon() {
        assert_eq!(marker_family("exception:12"), "exception");
        assert_eq!(marker_family("plain"), "plain");
        assert_eq!(marker_family("a:b:c"), "a");
    }

    #[test]
    fn removal_between_markers_merges_touching_exceptions() {
        let mut markers = collection();
        markers.set("exception:1", Some(Range::main(&[0], 0, 2)));
        markers.set("exception:2", Some(Range::main(&[0], 4, 6)));
        let outcome = markers.rebase(&Op::Remove {
            range: Range::main(&[0], 2, 4),
        });
        assert_eq!(
            outcome.merged,
            vec![("exception:2".to_string(), "exception:1".to_string())]
        );
        assert_eq!(
            markers.get("exception:1").unwrap().range,
            Range::main(&[0], 0, 4)
        );
        assert!(!markers.has("exception:2"));
    }

    #[test]
    fn insertion_at_marker_end_does_not_grow_it() {
        let mut markers = collection();
        markers.set("comment:1", Some(Range::main(&[0], 2, 5)));
        markers.rebase(&Op::Insert {
            position: crate::position::Position::main(vec![0, 5]),
            nodes: vec![Node::text("xyz")],
        });
        assert_eq!(
            markers.get("comment:1").unwrap().range,
            Range::main(&[0], 2, 5)
        );
    }

    #[test]
    fn unique_name_skips_taken_suffixes() {
        let mut markers = collection();
        markers.set("findResult:1", Some(Range::main(&[0], 0, 1)));
        assert_eq!(markers.unique_name("findResult"), "findResult:2");
    }
}
