use serde::{Deserialize, Serialize};

/// One published album review, as stored in the JSON index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub id: u32,
    pub artist: String,
    pub album: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub review: String,
}

impl ReviewRecord {
    /// Path of the detail view for this record.
    pub fn detail_path(&self) -> String {
        format!("/review?id={}", self.id)
    }

    /// `artist – album`, the label used by listings and suggestions.
    pub fn label(&self) -> String {
        format!("{} – {}", self.artist, self.album)
    }
}
