use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::markers::{CollapsePolicy, MarkerFamilyConfig};

const DEFAULT_MAX_UNDO: usize = 200;
const DEFAULT_MAX_POST_FIX_ITERATIONS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_post_fix_iterations: usize,
    /// Collapse and merge rules per marker family (`exception`, `findResult`, ...).
    pub marker_families: BTreeMap<String, MarkerFamilyConfig>,
}

impl EditorConfig {
    /// Replaces zero limits with defaults and adds the built-in marker
    /// families that are not configured explicitly.
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = DEFAULT_MAX_UNDO;
        }
        if self.max_post_fix_iterations == 0 {
            self.max_post_fix_iterations = DEFAULT_MAX_POST_FIX_ITERATIONS;
        }
        for (family, config) in default_marker_families() {
            self.marker_families.entry(family).or_insert(config);
        }
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(s).map(Self::with_defaults)
    }
}

fn default_marker_families() -> BTreeMap<String, MarkerFamilyConfig> {
    let mut families = BTreeMap::new();
    families.insert(
        "exception".to_string(),
        MarkerFamilyConfig::removed_on_collapse().merging(),
    );
    families.insert(
        "findResult".to_string(),
        MarkerFamilyConfig::removed_on_collapse(),
    );
    families.insert(
        "findResultHighlighted".to_string(),
        MarkerFamilyConfig::removed_on_collapse(),
    );
    families.insert(
        "comment".to_string(),
        MarkerFamilyConfig {
            on_collapse: CollapsePolicy::KeepCollapsed,
            merge_touching: false,
        },
    );
    families
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let config = EditorConfig::from_json_str(r#"{"max_undo": 0}"#).unwrap();
        assert_eq!(config.max_undo, DEFAULT_MAX_UNDO);
        assert_eq!(config.max_post_fix_iterations, DEFAULT_MAX_POST_FIX_ITERATIONS);
        assert_eq!(
            config.marker_families["exception"].on_collapse,
            CollapsePolicy::Remove
        );
    }

    #[test]
    fn explicit_family_overrides_builtin() {
        let config = EditorConfig::from_json_str(
            r#"{"max_undo": 5, "marker_families": {"exception": {"on_collapse": "keep_collapsed"}}}"#,
        )
        .unwrap();
        assert_eq!(config.max_undo, 5);
        let exception = config.marker_families["exception"];
        assert_eq!(exception.on_collapse, CollapsePolicy::KeepCollapsed);
        assert!(!exception.merge_touching);
        assert!(config.marker_families.contains_key("findResult"));
    }
}
