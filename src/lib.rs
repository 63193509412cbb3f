mod data;

#[cfg(feature = "admin")]
pub mod admin;
pub mod autocomplete;
#[cfg(feature = "admin")]
pub mod blob;
pub mod error;
pub mod render;
#[cfg(feature = "web")]
pub mod web;

pub use autocomplete::{Autocomplete, Key, KeyOutcome, Suggestion};
pub use data::ReviewRecord;
pub use error::{LoadError, SubmitError, ValidationError, WriteError};
pub use render::{render, snippet};

use std::fs;
use std::path::Path;

/// Number of records returned by a plain search when no limit is given.
pub const DEFAULT_SEARCH_LIMIT: usize = 30;
/// Location of the published index, relative to the site repository root.
pub const DEFAULT_INDEX_PATH: &str = "docs/js/reviews.json";

/// Ordered, append-only collection of reviews loaded from the JSON index.
///
/// Order is the order of the source file. Display orderings are derived on
/// demand and never written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewIndex {
    records: Vec<ReviewRecord>,
}

/// Which bucket a record landed in for a suggestion query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Prefix,
    Substring,
}

/// Records split by how they matched a query. A record is in at most one bucket.
#[derive(Debug, Default)]
pub struct MatchBuckets<'a> {
    pub prefix: Vec<&'a ReviewRecord>,
    pub substring: Vec<&'a ReviewRecord>,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Prefix => "prefix",
            MatchTier::Substring => "substring",
        }
    }
}

impl<'a> MatchBuckets<'a> {
    /// Prefix matches then substring matches, each in index order, cut to `limit`.
    pub fn ranked(self, limit: usize) -> Vec<(&'a ReviewRecord, MatchTier)> {
        self.prefix
            .into_iter()
            .map(|record| (record, MatchTier::Prefix))
            .chain(
                self.substring
                    .into_iter()
                    .map(|record| (record, MatchTier::Substring)),
            )
            .take(limit)
            .collect()
    }
}

impl ReviewIndex {
    pub fn new(records: Vec<ReviewRecord>) -> Self {
        Self { records }
    }

    /// Parses a JSON array of records. Ids must be positive.
    pub fn from_json_str(json: &str) -> Result<Self, LoadError> {
        Self::checked(serde_json::from_str(json)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, LoadError> {
        Self::checked(serde_json::from_slice(bytes)?)
    }

    fn checked(records: Vec<ReviewRecord>) -> Result<Self, LoadError> {
        if records.iter().any(|record| record.id == 0) {
            return Err(LoadError::ZeroId);
        }
        Ok(Self::new(records))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    /// Serialized form of the committed index: two-space indent plus a trailing newline.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(&self.records)?;
        json.push('\n');
        Ok(json)
    }

    pub fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&ReviewRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// The record following `id` in index order.
    pub fn next_after(&self, id: u32) -> Option<&ReviewRecord> {
        let position = self.records.iter().position(|record| record.id == id)?;
        self.records.get(position + 1)
    }

    /// One past the largest id, or 1 for an empty index.
    ///
    /// Fails once the largest id is `u32::MAX`.
    pub fn next_id(&self) -> Result<u32, LoadError> {
        match self.records.iter().map(|record| record.id).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or(LoadError::IdsExhausted { max }),
        }
    }

    pub fn push(&mut self, record: ReviewRecord) {
        self.records.push(record);
    }

    /// All records, highest id first.
    pub fn newest_first(&self) -> Vec<&ReviewRecord> {
        let mut rows: Vec<_> = self.records.iter().collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows
    }

    pub fn latest(&self, limit: usize) -> Vec<&ReviewRecord> {
        let mut rows = self.newest_first();
        rows.truncate(limit);
        rows
    }

    /// Case-insensitive substring match on artist or album, in index order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&ReviewRecord> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                record.artist.to_lowercase().contains(&needle)
                    || record.album.to_lowercase().contains(&needle)
            })
            .take(limit)
            .collect()
    }

    /// Splits the index into prefix and substring matches for a typed query.
    ///
    /// The query is trimmed and lower-cased first; an empty query matches nothing.
    pub fn partition(&self, query: &str) -> MatchBuckets<'_> {
        let needle = normalize_query(query);
        let mut buckets = MatchBuckets::default();
        if needle.is_empty() {
            return buckets;
        }
        for record in &self.records {
            let artist = record.artist.to_lowercase();
            let album = record.album.to_lowercase();
            if artist.starts_with(&needle) || album.starts_with(&needle) {
                buckets.prefix.push(record);
            } else if artist.contains(&needle) || album.contains(&needle) {
                buckets.substring.push(record);
            }
        }
        buckets
    }

    /// Ranked, highlighted suggestions for a typed query.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<Suggestion<'_>> {
        let needle = normalize_query(query);
        self.partition(&needle)
            .ranked(limit)
            .into_iter()
            .map(|(record, tier)| Suggestion::new(record, tier, &needle))
            .collect()
    }
}

/// Trimmed, lower-cased form of a query as typed into the search box.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
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
            cover: format!("covers/{id}.jpg"),
            review: String::new(),
        }
    }

    fn sample() -> ReviewIndex {
        ReviewIndex::new(vec![
            rec(3, "Radiohead", "Kid A"),
            rec(1, "Portishead", "Dummy"),
            rec(7, "Massive Attack", "Mezzanine"),
            rec(2, "Boards of Canada", "Music Has the Right to Children"),
        ])
    }

    #[test]
    fn next_id_is_max_plus_one() {
        let index = ReviewIndex::new(vec![rec(3, "a", "b"), rec(1, "c", "d"), rec(7, "e", "f")]);
        assert_eq!(index.next_id().unwrap(), 8);
        assert_eq!(ReviewIndex::default().next_id().unwrap(), 1);
    }

    #[test]
    fn next_id_after_largest_id_is_an_error() {
        let index = ReviewIndex::from_json_str(
            r#"[{"id":4294967295,"artist":"A","album":"B","cover":"covers/x.jpg","review":"x"}]"#,
        )
        .unwrap();
        let err = index.next_id().unwrap_err();
        assert!(matches!(err, LoadError::IdsExhausted { max: u32::MAX }));
    }

    #[test]
    fn zero_id_is_rejected_on_load() {
        let err = ReviewIndex::from_json_str(
            r#"[{"id":1,"artist":"A","album":"B","cover":"c","review":"x"},{"id":0,"artist":"C","album":"D","cover":"c","review":"y"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::ZeroId));
        let err = ReviewIndex::from_slice(br#"[{"id":0,"artist":"A","album":"B","cover":"c","review":"x"}]"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::ZeroId));
    }

    #[test]
    fn parses_json_array() {
        let index = ReviewIndex::from_json_str(
            r#"[{"id":1,"artist":"A","album":"B","releaseDate":"2020","cover":"covers/1.jpg","review":"x"}]"#,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(1).unwrap().album, "B");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = ReviewIndex::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ReviewIndex::from_path("/definitely/not/here/reviews.json").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn pretty_json_has_trailing_newline_and_keeps_unicode() {
        let index = ReviewIndex::new(vec![rec(1, "Björk", "Homogenic")]);
        let json = index.to_json_pretty().unwrap();
        assert!(json.ends_with("]\n"));
        assert!(json.contains("Björk"));
        assert!(json.contains("\n  {\n    \"id\": 1,"));
        assert_eq!(ReviewIndex::from_json_str(&json).unwrap(), index);
    }

    #[test]
    fn newest_first_does_not_reorder_index() {
        let index = sample();
        let ids: Vec<_> = index.newest_first().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 3, 2, 1]);
        assert_eq!(index.records()[0].id, 3);
        let latest: Vec<_> = index.latest(2).iter().map(|r| r.id).collect();
        assert_eq!(latest, vec![7, 3]);
    }

    #[test]
    fn next_after_follows_index_order() {
        let index = sample();
        assert_eq!(index.next_after(3).map(|r| r.id), Some(1));
        assert_eq!(index.next_after(2), None);
        assert_eq!(index.next_after(99), None);
    }

    #[test]
    fn search_is_case_insensitive_and_ordered() {
        let index = sample();
        let ids: Vec<_> = index.search("HEAD", 30).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(index.search("head", 1).len(), 1);
        assert!(index.search("zzz", 30).is_empty());
    }

    #[test]
    fn buckets_are_disjoint_and_well_formed() {
        let index = sample();
        for query in ["m", "a", "head", "kid", "ch", " MU "] {
            let needle = normalize_query(query);
            let buckets = index.partition(query);
            for record in &buckets.prefix {
                assert!(
                    record.artist.to_lowercase().starts_with(&needle)
                        || record.album.to_lowercase().starts_with(&needle)
                );
            }
            for record in &buckets.substring {
                let artist = record.artist.to_lowercase();
                let album = record.album.to_lowercase();
                assert!(artist.contains(&needle) || album.contains(&needle));
                assert!(!artist.starts_with(&needle) && !album.starts_with(&needle));
                assert!(!buckets.prefix.iter().any(|p| p.id == record.id));
            }
        }
    }

    #[test]
    fn empty_query_partitions_to_nothing() {
        let index = sample();
        let buckets = index.partition("   ");
        assert!(buckets.prefix.is_empty());
        assert!(buckets.substring.is_empty());
    }

    #[test]
    fn suggestions_put_prefix_matches_first() {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(rec(100 + i, &format!("The Band {i}"), "Record"));
            if i < 5 {
                records.push(rec(200 + i, &format!("Band Solo {i}"), "Record"));
            }
        }
        let index = ReviewIndex::new(records);
        let suggestions = index.suggest("band", 10);
        let ids: Vec<_> = suggestions.iter().map(|s| s.record.id).collect();
        assert_eq!(ids, vec![200, 201, 202, 203, 204, 100, 101, 102, 103, 104]);
        assert!(suggestions[..5].iter().all(|s| s.tier == MatchTier::Prefix));
        assert!(suggestions[5..].iter().all(|s| s.tier == MatchTier::Substring));
    }
}
