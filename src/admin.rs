//! Publishing new reviews to the blob store.
//!
//! A submission writes the cover image first and the extended index second.
//! The index write carries the revision seen at load time, so a concurrent
//! edit makes it fail instead of silently dropping records. A cover written
//! before a failed index write is left in place.

use crate::blob::{BlobStore, RevisionToken, WriteRequest};
use crate::error::{LoadError, SubmitError, ValidationError, WriteError};
use crate::{DEFAULT_INDEX_PATH, ReviewIndex, ReviewRecord};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COVERS_DIR: &str = "docs/covers";
pub const DEFAULT_COVER_URL_PREFIX: &str = "covers";
const DEFAULT_COVER_EXTENSION: &str = "jpg";

/// Where in the repository things live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoTarget {
    pub branch: String,
    pub index_path: String,
    pub covers_dir: String,
    /// Prefix stored in `ReviewRecord::cover`, relative to the public site.
    pub cover_url_prefix: String,
}

impl Default for RepoTarget {
    fn default() -> Self {
        Self::new(DEFAULT_BRANCH)
    }
}

impl RepoTarget {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            index_path: DEFAULT_INDEX_PATH.to_string(),
            covers_dir: DEFAULT_COVERS_DIR.to_string(),
            cover_url_prefix: DEFAULT_COVER_URL_PREFIX.to_string(),
        }
    }

    fn cover_blob_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.covers_dir.trim_end_matches('/'), file_name)
    }

    fn cover_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.cover_url_prefix.trim_end_matches('/'), file_name)
    }
}

/// The review form as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewDraft {
    pub artist: String,
    pub album: String,
    pub release_date: String,
    pub review: String,
}

impl ReviewDraft {
    /// Trims every field and checks the required ones.
    pub fn validate<'c>(
        &self,
        cover: Option<&'c CoverUpload>,
    ) -> Result<(ReviewDraft, &'c CoverUpload), ValidationError> {
        let draft = ReviewDraft {
            artist: self.artist.trim().to_string(),
            album: self.album.trim().to_string(),
            release_date: self.release_date.trim().to_string(),
            review: self.review.trim().to_string(),
        };
        let missing: Vec<&'static str> = [
            ("artist", &draft.artist),
            ("album", &draft.album),
            ("review", &draft.review),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        let cover = cover.ok_or(ValidationError::MissingCover)?;
        Ok((draft, cover))
    }
}

/// A cover image picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Lower-cased extension of an uploaded file, `jpg` when absent or odd-looking.
pub fn cover_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_COVER_EXTENSION.to_string(),
    }
}

/// Stored file name of the cover for review `id`.
pub fn cover_file_name(id: u32, file_name: &str) -> String {
    format!("{id}.{}", cover_extension(file_name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub count: usize,
    pub next_id: u32,
}

/// One-line status shown after each admin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn loading() -> Self {
        Self::info("Loading reviews...")
    }

    pub fn saving() -> Self {
        Self::info("Saving review...")
    }

    pub fn loaded(summary: &LoadSummary) -> Self {
        Self::info(format!("Loaded {} reviews.", summary.count))
    }

    pub fn saved(record: &ReviewRecord) -> Self {
        Self::info(format!("Saved review #{}.", record.id))
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&SubmitError> for StatusMessage {
    fn from(err: &SubmitError) -> Self {
        Self::error(err.to_string())
    }
}

impl From<&LoadError> for StatusMessage {
    fn from(err: &LoadError) -> Self {
        Self::error(err.to_string())
    }
}

#[derive(Debug, Clone)]
struct Loaded {
    index: ReviewIndex,
    /// `None` while the index file does not exist yet.
    revision: Option<RevisionToken>,
}

impl Loaded {
    fn summary(&self) -> Result<LoadSummary, LoadError> {
        Ok(LoadSummary {
            count: self.index.len(),
            next_id: self.index.next_id()?,
        })
    }
}

/// Admin-side view of the published index.
///
/// Local state (the index and its revision) only advances after a fully
/// successful submission.
pub struct AdminSession<S> {
    store: S,
    target: RepoTarget,
    loaded: Option<Loaded>,
}

impl<S: BlobStore> AdminSession<S> {
    pub fn new(store: S, target: RepoTarget) -> Self {
        Self {
            store,
            target,
            loaded: None,
        }
    }

    pub fn target(&self) -> &RepoTarget {
        &self.target
    }

    /// Re-reads the index from the store.
    pub async fn load(&mut self) -> Result<LoadSummary, LoadError> {
        let loaded = self.fetch().await?;
        let summary = loaded.summary()?;
        self.loaded = Some(loaded);
        Ok(summary)
    }

    pub fn summary(&self) -> Option<LoadSummary> {
        self.loaded.as_ref().and_then(|loaded| loaded.summary().ok())
    }

    pub fn index(&self) -> Option<&ReviewIndex> {
        self.loaded.as_ref().map(|loaded| &loaded.index)
    }

    /// Cover URL the next submission would store for `file_name`.
    pub fn cover_preview(&self, file_name: &str) -> Option<String> {
        let summary = self.summary()?;
        Some(
            self.target
                .cover_url(&cover_file_name(summary.next_id, file_name)),
        )
    }

    /// Validates and publishes a review, loading the index first if needed.
    pub async fn submit(
        &mut self,
        draft: &ReviewDraft,
        cover: Option<&CoverUpload>,
    ) -> Result<ReviewRecord, SubmitError> {
        let (draft, cover) = draft.validate(cover)?;
        let mut loaded = match self.loaded.take() {
            Some(loaded) => loaded,
            None => self.fetch().await?,
        };
        let result = self.publish(&mut loaded, draft, cover).await;
        self.loaded = Some(loaded);
        result
    }

    async fn fetch(&self) -> Result<Loaded, LoadError> {
        let path = &self.target.index_path;
        match self.store.read(path, &self.target.branch).await {
            Ok(blob) => {
                let index = ReviewIndex::from_slice(&blob.content)?;
                let next_id = index.next_id()?;
                info!(
                    count = index.len(),
                    next_id,
                    revision = %blob.revision,
                    "Loaded review index"
                );
                Ok(Loaded {
                    index,
                    revision: Some(blob.revision),
                })
            }
            Err(LoadError::Status { status: 404, .. }) => {
                warn!(%path, "Review index not found; starting empty");
                Ok(Loaded {
                    index: ReviewIndex::default(),
                    revision: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn publish(
        &self,
        loaded: &mut Loaded,
        draft: ReviewDraft,
        cover: &CoverUpload,
    ) -> Result<ReviewRecord, SubmitError> {
        let id = loaded.index.next_id()?;
        let file_name = cover_file_name(id, &cover.file_name);
        let record = ReviewRecord {
            id,
            artist: draft.artist,
            album: draft.album,
            release_date: draft.release_date,
            cover: self.target.cover_url(&file_name),
            review: draft.review,
        };

        let cover_path = self.target.cover_blob_path(&file_name);
        let cover_message = format!("Add cover for {}", record.label());
        self.store
            .write(WriteRequest {
                path: &cover_path,
                branch: &self.target.branch,
                message: &cover_message,
                content: &cover.bytes,
                previous: None,
            })
            .await?;

        let mut index = loaded.index.clone();
        index.push(record.clone());
        let json = index.to_json_pretty().map_err(WriteError::from)?;
        let index_message = format!("Add review #{id}: {}", record.label());
        let revision = self
            .store
            .write(WriteRequest {
                path: &self.target.index_path,
                branch: &self.target.branch,
                message: &index_message,
                content: json.as_bytes(),
                previous: loaded.revision.as_ref(),
            })
            .await
            .inspect_err(|err| warn!(%cover_path, error = %err, "Index write failed after cover upload"))?;

        info!(id, cover = %record.cover, "Review published");
        loaded.index = index;
        loaded.revision = Some(revision);
        Ok(record)
    }
}
