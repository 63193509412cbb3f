//! Search-box suggestions.
//!
//! [`Autocomplete`] holds the state behind one search input: the current
//! suggestion list, which entry is highlighted, and whether the list is shown.
//! The host forwards input events and renders whatever the controller holds;
//! the controller never touches presentation itself.

use crate::render::escape_html;
use crate::{MatchTier, ReviewIndex, ReviewRecord};
use serde::Serialize;

/// Maximum number of suggestions shown under the search box.
pub const SUGGESTION_LIMIT: usize = 10;

/// One entry in the suggestion list.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion<'a> {
    pub record: &'a ReviewRecord,
    pub tier: MatchTier,
    /// `artist – album` with any matching prefix wrapped in `<span class="highlight">`.
    pub html: String,
    pub href: String,
}

impl<'a> Suggestion<'a> {
    /// `needle` must already be trimmed and lower-cased.
    pub fn new(record: &'a ReviewRecord, tier: MatchTier, needle: &str) -> Self {
        let html = format!(
            "{} – {}",
            highlight_prefix(&record.artist, needle),
            highlight_prefix(&record.album, needle)
        );
        Self {
            record,
            tier,
            html,
            href: record.detail_path(),
        }
    }
}

/// Escapes `field`, wrapping its leading span when it starts with `needle`.
///
/// Fields that only contain the needle further in are left unhighlighted.
pub fn highlight_prefix(field: &str, needle: &str) -> String {
    if needle.is_empty() || !field.to_lowercase().starts_with(needle) {
        return escape_html(field);
    }
    let cut = field
        .char_indices()
        .nth(needle.chars().count())
        .map_or(field.len(), |(pos, _)| pos);
    format!(
        "<span class=\"highlight\">{}</span>{}",
        escape_html(&field[..cut]),
        escape_html(&field[cut..])
    )
}

/// Keys the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowDown,
    ArrowUp,
    Enter,
    Other,
}

impl From<&str> for Key {
    /// Maps DOM `KeyboardEvent.key` names.
    fn from(name: &str) -> Self {
        match name {
            "ArrowDown" => Key::ArrowDown,
            "ArrowUp" => Key::ArrowUp,
            "Enter" => Key::Enter,
            _ => Key::Other,
        }
    }
}

/// What the host should do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome<'a> {
    /// Let the key through untouched.
    Ignored,
    /// The highlight moved; suppress the default action.
    Moved { active: usize },
    /// Navigate to this record; suppress the default action.
    Activated(&'a ReviewRecord),
}

impl<'a> KeyOutcome<'a> {
    pub fn prevents_default(&self) -> bool {
        !matches!(self, KeyOutcome::Ignored)
    }

    pub fn activated(&self) -> Option<&'a ReviewRecord> {
        match self {
            KeyOutcome::Activated(record) => Some(record),
            _ => None,
        }
    }
}

/// Suggestion state for one search input.
#[derive(Debug)]
pub struct Autocomplete<'a> {
    index: &'a ReviewIndex,
    limit: usize,
    query: String,
    items: Vec<Suggestion<'a>>,
    active: Option<usize>,
    visible: bool,
}

impl<'a> Autocomplete<'a> {
    pub fn new(index: &'a ReviewIndex) -> Self {
        Self::with_limit(index, SUGGESTION_LIMIT)
    }

    pub fn with_limit(index: &'a ReviewIndex, limit: usize) -> Self {
        Self {
            index,
            limit,
            query: String::new(),
            items: Vec::new(),
            active: None,
            visible: false,
        }
    }

    /// Rebuilds the list for the input's new value.
    ///
    /// The list is recomputed from scratch and the highlight is cleared. An
    /// empty (or whitespace-only) value hides the list without matching.
    pub fn on_input(&mut self, value: &str) -> &[Suggestion<'a>] {
        self.query = value.trim().to_lowercase();
        self.items.clear();
        self.active = None;
        if self.query.is_empty() {
            self.visible = false;
            return &self.items;
        }
        self.items = self.index.suggest(&self.query, self.limit);
        self.visible = !self.items.is_empty();
        &self.items
    }

    /// Moves the highlight or activates the highlighted suggestion.
    ///
    /// Arrow keys wrap in both directions. `Enter` only acts when something
    /// is highlighted. With no suggestions every key is ignored.
    pub fn on_key_down(&mut self, key: Key) -> KeyOutcome<'a> {
        let count = self.items.len();
        if count == 0 {
            return KeyOutcome::Ignored;
        }
        match key {
            Key::ArrowDown => {
                let next = self.active.map_or(0, |current| (current + 1) % count);
                self.active = Some(next);
                KeyOutcome::Moved { active: next }
            }
            Key::ArrowUp => {
                let next = self
                    .active
                    .map_or(count - 1, |current| (current + count - 1) % count);
                self.active = Some(next);
                KeyOutcome::Moved { active: next }
            }
            Key::Enter => match self.active {
                Some(active) => KeyOutcome::Activated(self.items[active].record),
                None => KeyOutcome::Ignored,
            },
            Key::Other => KeyOutcome::Ignored,
        }
    }

    /// A suggestion was clicked.
    pub fn on_select(&mut self, position: usize) -> Option<&'a ReviewRecord> {
        self.items.get(position).map(|item| item.record)
    }

    /// A click landed outside both the input and the list. The typed text is kept.
    pub fn on_click_outside(&mut self) {
        self.visible = false;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn items(&self) -> &[Suggestion<'a>] {
        &self.items
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: u32, artist: &str, album: &str) -> ReviewRecord {
        ReviewRecord {
            id,
            artist: artist.into(),
            album: album.into(),
            release_date: String::new(),
            cover: String::new(),
            review: String::new(),
        }
    }

    fn index() -> ReviewIndex {
        ReviewIndex::new(vec![
            rec(1, "Slowdive", "Souvlaki"),
            rec(2, "My Bloody Valentine", "Loveless"),
            rec(3, "Lush", "Spooky"),
        ])
    }

    #[test]
    fn empty_input_hides_list() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        assert!(widget.on_input("   ").is_empty());
        assert!(!widget.is_visible());
    }

    #[test]
    fn highlight_only_on_prefix_matches() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        let items = widget.on_input("Lo");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].record.id, 2);
        assert_eq!(
            items[0].html,
            "My Bloody Valentine – <span class=\"highlight\">Lo</span>veless"
        );
        assert_eq!(items[0].tier, MatchTier::Prefix);
        assert_eq!(items[1].record.id, 1);
        assert_eq!(items[1].html, "Slowdive – Souvlaki");
        assert_eq!(items[1].tier, MatchTier::Substring);
        assert!(widget.is_visible());
    }

    #[test]
    fn highlight_keeps_original_case_and_escapes() {
        assert_eq!(
            highlight_prefix("AC<DC", "ac"),
            "<span class=\"highlight\">AC</span>&lt;DC"
        );
        assert_eq!(highlight_prefix("Bar", "x"), "Bar");
    }

    #[test]
    fn arrows_wrap_both_ways() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        widget.on_input("s");
        let count = widget.items().len();
        assert_eq!(count, 3);
        assert_eq!(widget.on_key_down(Key::ArrowUp), KeyOutcome::Moved { active: 2 });
        assert_eq!(widget.on_key_down(Key::ArrowDown), KeyOutcome::Moved { active: 0 });
        assert_eq!(widget.on_key_down(Key::ArrowDown), KeyOutcome::Moved { active: 1 });
        assert_eq!(widget.on_key_down(Key::ArrowDown), KeyOutcome::Moved { active: 2 });
        assert_eq!(widget.on_key_down(Key::ArrowDown), KeyOutcome::Moved { active: 0 });
        assert_eq!(widget.on_key_down(Key::ArrowUp), KeyOutcome::Moved { active: 2 });
    }

    #[test]
    fn enter_activates_only_with_highlight() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        widget.on_input("lush");
        let outcome = widget.on_key_down(Key::Enter);
        assert_eq!(outcome, KeyOutcome::Ignored);
        assert!(!outcome.prevents_default());
        widget.on_key_down(Key::from("ArrowDown"));
        let outcome = widget.on_key_down(Key::from("Enter"));
        assert!(outcome.prevents_default());
        assert_eq!(outcome.activated().map(|r| r.id), Some(3));
    }

    #[test]
    fn typing_resets_highlight() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        widget.on_input("s");
        widget.on_key_down(Key::ArrowDown);
        assert_eq!(widget.active_index(), Some(0));
        widget.on_input("sl");
        assert_eq!(widget.active_index(), None);
    }

    #[test]
    fn keys_are_ignored_without_suggestions() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        widget.on_input("zzz");
        assert!(!widget.is_visible());
        assert_eq!(widget.on_key_down(Key::ArrowDown), KeyOutcome::Ignored);
        assert_eq!(widget.on_key_down(Key::Other), KeyOutcome::Ignored);
    }

    #[test]
    fn click_selects_and_outside_click_hides() {
        let index = index();
        let mut widget = Autocomplete::new(&index);
        widget.on_input("spoo");
        assert_eq!(widget.on_select(0).map(|r| r.id), Some(3));
        assert_eq!(widget.on_select(5), None);
        widget.on_click_outside();
        assert!(!widget.is_visible());
        assert_eq!(widget.query(), "spoo");
        assert_eq!(widget.items().len(), 1);
    }

    #[test]
    fn limit_caps_list() {
        let records = (1..=15).map(|i| rec(i, "Same", "Name")).collect();
        let index = ReviewIndex::new(records);
        let mut widget = Autocomplete::new(&index);
        assert_eq!(widget.on_input("same").len(), SUGGESTION_LIMIT);
    }
}
