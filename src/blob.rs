//! Remote blob store holding the published index and cover images.
//!
//! The store is addressed by path and branch; each stored blob carries a
//! revision token that a later write can present as a precondition.

use crate::error::{LoadError, WriteError};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("albumreviews-rs/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Opaque version marker returned by the store for every blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionToken(pub String);

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded blob contents plus the revision they were read at.
#[derive(Debug, Clone)]
pub struct Blob {
    pub content: Vec<u8>,
    pub revision: RevisionToken,
}

#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub path: &'a str,
    pub branch: &'a str,
    pub message: &'a str,
    pub content: &'a [u8],
    /// Revision the caller last saw; the store rejects the write if it moved on.
    pub previous: Option<&'a RevisionToken>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn read(&self, path: &str, reference: &str) -> Result<Blob, LoadError>;

    /// Creates or replaces a blob, returning its new revision.
    async fn write(&self, request: WriteRequest<'_>) -> Result<RevisionToken, WriteError>;
}

/// GitHub repository contents API client.
#[derive(Debug, Clone)]
pub struct GitHubContents {
    client: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl GitHubContents {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: None,
        }
    }

    /// Bearer credential attached to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn contents_url(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            encoded
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, GITHUB_JSON);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl BlobStore for GitHubContents {
    async fn read(&self, path: &str, reference: &str) -> Result<Blob, LoadError> {
        let url = format!(
            "{}?ref={}",
            self.contents_url(path),
            utf8_percent_encode(reference, NON_ALPHANUMERIC)
        );
        debug!(%url, "Reading blob");
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Status {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let payload: ContentsResponse = response.json().await?;
        Ok(Blob {
            content: decode_content(&payload.content)?,
            revision: RevisionToken(payload.sha),
        })
    }

    async fn write(&self, request: WriteRequest<'_>) -> Result<RevisionToken, WriteError> {
        let url = self.contents_url(request.path);
        let body = PutBody {
            message: request.message,
            content: STANDARD.encode(request.content),
            branch: request.branch,
            sha: request.previous.map(|token| token.0.as_str()),
        };
        let transport = |source| WriteError::Http {
            path: request.path.to_string(),
            source,
        };
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WriteError::Rejected {
                path: request.path.to_string(),
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }
        let payload: WriteResponse = response.json().await.map_err(transport)?;
        info!(path = request.path, revision = %payload.content.sha, "Blob written");
        Ok(RevisionToken(payload.content.sha))
    }
}

/// Decodes base64 content that may be wrapped across lines.
pub fn decode_content(encoded: &str) -> Result<Vec<u8>, LoadError> {
    let packed: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(packed)
        .map_err(|err| LoadError::Decode(err.to_string()))
}

async fn error_message(response: reqwest::Response) -> String {
    let fallback = response
        .status()
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();
    response
        .json::<ApiMessage>()
        .await
        .map(|body| body.message)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_url_encodes_segments() {
        let store = GitHubContents::new("octo", "site").with_api_base("http://localhost:9000/");
        assert_eq!(
            store.contents_url("docs/covers/my cover.png"),
            "http://localhost:9000/repos/octo/site/contents/docs/covers/my%20cover.png"
        );
        assert_eq!(
            store.contents_url("/docs/js/reviews.json"),
            "http://localhost:9000/repos/octo/site/contents/docs/js/reviews.json"
        );
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = "W3siaWQiOjF9\nXQ==\n";
        assert_eq!(decode_content(encoded).unwrap(), br#"[{"id":1}]"#.to_vec());
    }

    #[test]
    fn bad_base64_is_a_decode_error() {
        assert!(matches!(
            decode_content("***"),
            Err(LoadError::Decode(_))
        ));
    }

    #[test]
    fn put_body_omits_missing_sha() {
        let body = PutBody {
            message: "Add cover",
            content: STANDARD.encode(b"img"),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["content"], "aW1n");
        assert!(json.get("sha").is_none());

        let body = PutBody { sha: Some("abc"), ..body };
        assert_eq!(serde_json::to_value(&body).unwrap()["sha"], "abc");
    }
}
