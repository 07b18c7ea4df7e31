use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::command::{Command, CommandState};
use crate::error::{CommandError, ModelError};
use crate::markers::Marker;
use crate::model::Model;
use crate::position::{Boundary, Direction, Range};
use crate::resolver::text_blocks;
use crate::schema::Schema;
use crate::tree::Document;
use crate::writer::Writer;

pub const FIND_RESULT_FAMILY: &str = "findResult";
pub const FIND_HIGHLIGHT_FAMILY: &str = "findResultHighlighted";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindQuery {
    pub text: String,
    pub match_case: bool,
    pub whole_words: bool,
}

impl FindQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn match_case(mut self, match_case: bool) -> Self {
        self.match_case = match_case;
        self
    }

    pub fn whole_words(mut self, whole_words: bool) -> Self {
        self.whole_words = whole_words;
        self
    }

    fn regex(&self) -> Result<Regex, regex::Error> {
        let escaped = regex::escape(&self.text);
        if self.match_case {
            Regex::new(&escaped)
        } else {
            Regex::new(&format!("(?i){escaped}"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindMatch {
    pub range: Range,
    pub text: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Scans every text block (inside `scope` when given) for `query` and
/// appends new hits to `start_results`. Hits already present are kept once,
/// so a scan can be resumed with the results of an earlier one.
pub fn find_in(
    doc: &Document,
    schema: &Schema,
    query: &FindQuery,
    scope: Option<&Range>,
    start_results: Vec<FindMatch>,
) -> Vec<FindMatch> {
    let mut results = start_results;
    if query.text.is_empty() {
        return results;
    }
    let regex = match query.regex() {
        Ok(regex) => regex,
        Err(err) => {
            tracing::warn!(%err, "cannot build search pattern");
            return results;
        }
    };

    for block in text_blocks(doc, schema) {
        let Ok(element) = doc.element(&block.root, &block.path) else {
            continue;
        };
        let text = element.inline_text();
        let chars: Vec<char> = text.chars().collect();
        for hit in regex.find_iter(&text) {
            if hit.as_str().is_empty() {
                continue;
            }
            let start = text[..hit.start()].chars().count();
            let end = start + hit.as_str().chars().count();
            if query.whole_words {
                let before = start.checked_sub(1).and_then(|ix| chars.get(ix));
                let after = chars.get(end);
                if before.is_some_and(|c| is_word_char(*c)) || after.is_some_and(|c| is_word_char(*c)) {
                    continue;
                }
            }
            let range = Range::flat(block.root.clone(), &block.path, start, end);
            if let Some(scope) = scope
                && !scope
                    .contains_range(&range, Boundary::Inclusive)
                    .unwrap_or(false)
            {
                continue;
            }
            if results.iter().any(|existing| existing.range == range) {
                continue;
            }
            results.push(FindMatch {
                range,
                text: hit.as_str().to_string(),
            });
        }
    }
    results.sort_by(|a, b| {
        a.range
            .start
            .root
            .cmp(&b.range.start.root)
            .then_with(|| a.range.start.path.cmp(&b.range.start.path))
    });
    results
}

fn find_results(model: &Model) -> Vec<&Marker> {
    model.markers().family(FIND_RESULT_FAMILY)
}

fn highlighted_index(model: &Model) -> Option<usize> {
    let highlight = model.markers().family(FIND_HIGHLIGHT_FAMILY).into_iter().next()?;
    find_results(model)
        .iter()
        .position(|marker| marker.range == highlight.range)
}

fn find_state(model: &Model) -> serde_json::Value {
    json!({
        "results": find_results(model).len(),
        "highlighted": highlighted_index(model),
    })
}

fn clear_find_markers(writer: &mut Writer<'_>) {
    let names: Vec<String> = writer
        .model()
        .markers()
        .iter()
        .filter(|m| matches!(m.family(), FIND_RESULT_FAMILY | FIND_HIGHLIGHT_FAMILY))
        .map(|m| m.name.clone())
        .collect();
    for name in names {
        writer.remove_marker(&name);
    }
}

fn highlight(writer: &mut Writer<'_>, range: Range) -> Result<(), ModelError> {
    let current = writer
        .model()
        .markers()
        .family(FIND_HIGHLIGHT_FAMILY)
        .into_iter()
        .next()
        .map(|m| m.name.clone());
    match current {
        Some(name) => {
            writer.update_marker(&name, range)?;
        }
        None => {
            writer.add_family_marker(FIND_HIGHLIGHT_FAMILY, range)?;
        }
    }
    Ok(())
}

/// Replaces the content of `range` with `text`, keeping the attributes of the
/// first replaced character.
fn replace_range(writer: &mut Writer<'_>, range: &Range, text: &str) -> Result<(), ModelError> {
    let attrs = writer
        .doc()
        .text_attrs_around(&range.start)?
        .1
        .cloned()
        .unwrap_or_default();
    writer.remove(range)?;
    writer.insert_text(text, attrs, &range.start)?;
    Ok(())
}

/// Runs a search and stores each hit as a `findResult:<n>` marker; the first
/// hit is highlighted.
#[derive(Debug, Clone, Default)]
pub struct FindCommand;

impl Command for FindCommand {
    type Options = FindQuery;

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(find_state(model))
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        query: FindQuery,
    ) -> Result<(), CommandError> {
        let hits = find_in(model.doc(), model.schema(), &query, None, Vec::new());
        tracing::debug!(query = %query.text, hits = hits.len(), "find");
        model.change(|writer| {
            clear_find_markers(writer);
            for hit in &hits {
                writer.add_family_marker(FIND_RESULT_FAMILY, hit.range.clone())?;
            }
            if let Some(first) = hits.first() {
                writer.add_family_marker(FIND_HIGHLIGHT_FAMILY, first.range.clone())?;
            }
            Ok::<_, CommandError>(())
        })
    }
}

/// Moves the highlight to the next or previous result, wrapping around.
#[derive(Debug, Clone)]
pub struct FindNavigateCommand {
    direction: Direction,
}

impl FindNavigateCommand {
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }
}

impl Command for FindNavigateCommand {
    type Options = ();

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(find_state(model)).with_enabled(find_results(model).len() > 1)
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        _options: (),
    ) -> Result<(), CommandError> {
        let results: Vec<Range> = find_results(model)
            .into_iter()
            .map(|m| m.range.clone())
            .collect();
        if results.is_empty() {
            return Ok(());
        }
        let len = results.len();
        let next = match (highlighted_index(model), self.direction) {
            (None, _) => 0,
            (Some(ix), Direction::Forward) => (ix + 1) % len,
            (Some(ix), Direction::Backward) => (ix + len - 1) % len,
        };
        let target = results[next].clone();
        model.change(|writer| highlight(writer, target))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaceOptions {
    pub replace_with: String,
    /// Search anew instead of using the stored results (replace all only).
    pub query: Option<FindQuery>,
}

/// Replaces the highlighted result and highlights the following one.
#[derive(Debug, Clone, Default)]
pub struct ReplaceCommand;

impl Command for ReplaceCommand {
    type Options = ReplaceOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(find_state(model)).with_enabled(!find_results(model).is_empty())
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        options: ReplaceOptions,
    ) -> Result<(), CommandError> {
        let results = find_results(model);
        let Some(target) = highlighted_index(model)
            .and_then(|ix| results.get(ix))
            .or_else(|| results.first())
            .map(|m| m.range.clone())
        else {
            return Ok(());
        };
        model.change(|writer| {
            replace_range(writer, &target, &options.replace_with)?;
            let following = {
                let remaining = writer.model().markers().family(FIND_RESULT_FAMILY);
                remaining
                    .iter()
                    .find(|m| m.range.start >= target.start)
                    .or_else(|| remaining.first())
                    .map(|m| m.range.clone())
            };
            if let Some(range) = following {
                highlight(writer, range)?;
            }
            Ok::<_, CommandError>(())
        })
    }
}

/// Replaces every result, last first, in one undo step.
#[derive(Debug, Clone, Default)]
pub struct ReplaceAllCommand;

impl Command for ReplaceAllCommand {
    type Options = ReplaceOptions;

    fn refresh(&self, model: &Model) -> CommandState {
        CommandState::enabled(find_state(model))
    }

    fn execute(
        &mut self,
        model: &mut Model,
        _state: &CommandState,
        options: ReplaceOptions,
    ) -> Result<(), CommandError> {
        let targets: Vec<Range> = match &options.query {
            Some(query) => find_in(model.doc(), model.schema(), query, None, Vec::new())
                .into_iter()
                .map(|hit| hit.range)
                .collect(),
            None => find_results(model)
                .into_iter()
                .map(|m| m.range.clone())
                .collect(),
        };
        if targets.is_empty() {
            return Ok(());
        }
        model.change(|writer| {
            for range in targets.iter().rev() {
                replace_range(writer, range, &options.replace_with)?;
            }
            clear_find_markers(writer);
            Ok::<_, CommandError>(())
        })
    }
}
