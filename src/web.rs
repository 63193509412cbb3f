use crate::autocomplete::Autocomplete;
use crate::render::{DEFAULT_SNIPPET_LEN, escape_html, render, snippet};
use crate::{DEFAULT_SEARCH_LIMIT, LoadError, MatchTier, ReviewIndex, ReviewRecord};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::RwLock;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
const GRID_SIZE: usize = 30;
const MAX_API_LIMIT: usize = 100;

const PAGE_HEAD: &str = r#"<style>
      body { margin: 0; font-family: system-ui, sans-serif; background: #111418; color: #e6e8eb; }
      a { color: #9ecbff; }
      .site-header { display: flex; gap: 1rem; align-items: center; padding: 1rem 2rem; background: #1a1f25; }
      .brand { font-weight: 700; text-decoration: none; color: inherit; }
      .search { position: relative; flex: 1; max-width: 32rem; }
      .search input { width: 100%; padding: .5rem; }
      .autocomplete { position: absolute; top: 100%; left: 0; right: 0; flex-direction: column; background: #1a1f25; z-index: 10; }
      .autocomplete:not([hidden]) { display: flex; }
      .autocomplete-item { padding: .4rem .6rem; text-decoration: none; color: inherit; }
      .autocomplete-item.active, .autocomplete-item:hover { background: #2a3038; }
      .highlight { color: #ffd479; }
      main { max-width: 56rem; margin: 0 auto; padding: 2rem; }
      .post { border-bottom: 1px solid #2a3038; padding-bottom: 2rem; margin-bottom: 2rem; }
      .post img, .detail img { max-width: 100%; }
      .grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(12rem, 1fr)); gap: 1rem; }
      .card img { width: 100%; aspect-ratio: 1; object-fit: cover; }
      .card p { font-size: .85rem; color: #9aa3ad; }
    </style>"#;

const AUTOCOMPLETE_SCRIPT: &str = r#"(function () {
      var input = document.getElementById("searchInput");
      var box = document.getElementById("autocomplete");
      if (!input || !box) return;
      var active = -1;
      input.addEventListener("input", function () {
        var q = input.value;
        active = -1;
        if (!q.trim()) { box.innerHTML = ""; box.hidden = true; return; }
        fetch("/api/autocomplete?q=" + encodeURIComponent(q))
          .then(function (r) { return r.json(); })
          .then(function (data) {
            if (input.value !== q) return;
            box.innerHTML = data.suggestions.map(function (s) {
              return '<a class="autocomplete-item" href="' + s.href + '">' + s.html + "</a>";
            }).join("");
            box.hidden = !data.visible;
          });
      });
      input.addEventListener("keydown", function (e) {
        var items = box.querySelectorAll(".autocomplete-item");
        var n = items.length;
        if (!n) return;
        if (e.key === "ArrowDown" || e.key === "ArrowUp") {
          e.preventDefault();
          if (e.key === "ArrowDown") active = (active + 1) % n;
          else active = active < 0 ? n - 1 : (active - 1 + n) % n;
          items.forEach(function (el, i) { el.classList.toggle("active", i === active); });
        } else if (e.key === "Enter" && active >= 0) {
          e.preventDefault();
          items[active].click();
        }
      });
      document.addEventListener("click", function (e) {
        if (!box.contains(e.target) && e.target !== input) box.hidden = true;
      });
    })();"#;

/// Shared server state. The published index is swapped wholesale on reload.
pub struct AppState {
    index: RwLock<Arc<ReviewIndex>>,
    index_path: PathBuf,
    pub site_title: String,
    base_url: String,
}

impl AppState {
    pub fn new(index: ReviewIndex, config: &WebConfig) -> Self {
        Self {
            index: RwLock::new(Arc::new(index)),
            index_path: config.index_path.clone(),
            site_title: config.site_title.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// `path` resolved against the public base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Snapshot of the current index.
    pub fn index(&self) -> Arc<ReviewIndex> {
        self.index.read().clone()
    }

    /// Loads a fresh index from disk and publishes it. The old one stays on failure.
    pub fn reload(&self) -> Result<usize, LoadError> {
        let fresh = ReviewIndex::from_path(&self.index_path)?;
        let count = fresh.len();
        *self.index.write() = Arc::new(fresh);
        Ok(count)
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
    pub index_path: PathBuf,
    pub covers_dir: Option<PathBuf>,
    pub site_title: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
            index_path: PathBuf::from(crate::DEFAULT_INDEX_PATH),
            covers_dir: None,
            site_title: "Album Reviews".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Load(LoadError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Load(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<LoadError> for WebError {
    fn from(value: LoadError) -> Self {
        WebError::Load(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let index = ReviewIndex::from_path(&config.index_path)?;
    info!(
        count = index.len(),
        path = %config.index_path.display(),
        "Loaded review index"
    );
    let state = Arc::new(AppState::new(index, &config));
    let router = build_router(state, config.covers_dir.clone());
    info!(
        %config.addr,
        base = %config.base_url,
        covers = ?config.covers_dir,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState, covers_dir: Option<PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/", get(feed_html))
        .route("/all", get(grid_html))
        .route("/review", get(review_html))
        .route("/search", get(search_html))
        .route("/api/search", get(api_search))
        .route("/api/autocomplete", get(api_autocomplete))
        .route("/api/review", get(api_review))
        .route("/api/next", get(api_next))
        .route("/api/reload", post(api_reload))
        .route("/healthz", get(health));
    if let Some(dir) = covers_dir {
        router = router.nest_service("/covers", ServeDir::new(dir));
    }
    router
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "albumreviews-web" }))
}

async fn feed_html(State(state): State<SharedState>) -> impl IntoResponse {
    let index = state.index();
    let cards = index
        .newest_first()
        .into_iter()
        .map(ReviewCard::new)
        .collect();
    let template = FeedTemplate {
        chrome: Chrome::new(&state, "Latest", ""),
        cards,
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&state.site_title, err.to_string())),
    )
}

async fn grid_html(State(state): State<SharedState>) -> impl IntoResponse {
    let index = state.index();
    let template = GridTemplate {
        chrome: Chrome::new(&state, "All reviews", ""),
        section_id: "grid",
        heading: "All reviews".to_string(),
        cards: index.latest(GRID_SIZE).into_iter().map(CoverCard::new).collect(),
        empty_message: "No reviews yet.",
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&state.site_title, err.to_string())),
    )
}

async fn search_html(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let index = state.index();
    let query = params.q.unwrap_or_default();
    let template = GridTemplate {
        chrome: Chrome::new(&state, "Search", query.clone()),
        section_id: "results",
        heading: format!("Results for “{query}”"),
        cards: index
            .search(&query, DEFAULT_SEARCH_LIMIT)
            .into_iter()
            .map(CoverCard::new)
            .collect(),
        empty_message: "No reviews match this search.",
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&state.site_title, err.to_string())),
    )
}

async fn review_html(
    State(state): State<SharedState>,
    Query(params): Query<ReviewParams>,
) -> Response {
    let index = state.index();
    let Some(record) = params.id().and_then(|id| index.get(id)) else {
        return (
            StatusCode::NOT_FOUND,
            Html(render_error_page(&state.site_title, "Review not found.")),
        )
            .into_response();
    };
    let template = ReviewTemplate {
        chrome: Chrome::new(&state, record.label(), ""),
        card: ReviewCard::new(record),
        next: index.next_after(record.id).map(CoverCard::new),
    };
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&state.site_title, err.to_string())),
    )
    .into_response()
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponsePayload> {
    let index = state.index();
    let query = params.q.unwrap_or_default();
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_API_LIMIT);
    let results = index
        .search(&query, limit)
        .into_iter()
        .map(SearchHitPayload::from_record)
        .collect();
    Json(SearchResponsePayload {
        href: search_path(&query),
        query,
        limit,
        results,
    })
}

async fn api_autocomplete(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<AutocompletePayload> {
    let index = state.index();
    let mut widget = Autocomplete::new(&index);
    let suggestions = widget
        .on_input(params.q.as_deref().unwrap_or_default())
        .iter()
        .map(|item| SuggestionPayload {
            id: item.record.id,
            tier: item.tier,
            html: item.html.clone(),
            href: item.href.clone(),
        })
        .collect();
    Json(AutocompletePayload {
        query: widget.query().to_string(),
        visible: widget.is_visible(),
        suggestions,
    })
}

async fn api_review(
    State(state): State<SharedState>,
    Query(params): Query<ReviewParams>,
) -> Result<Json<ReviewPayload>, ApiError> {
    let index = state.index();
    let id = params
        .id()
        .ok_or_else(|| ApiError::not_found("Provide a numeric `id` query parameter."))?;
    let record = index
        .get(id)
        .ok_or_else(|| ApiError::not_found(format!("No review #{id}")))?;
    Ok(Json(ReviewPayload {
        url: state.absolute_url(&record.detail_path()),
        html: render(&record.review),
        snippet: snippet(record, DEFAULT_SNIPPET_LEN),
        next_id: index.next_after(id).map(|next| next.id),
        record: record.clone(),
    }))
}

async fn api_next(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let index = state.index();
    let next_id = index
        .next_id()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(json!({ "count": index.len(), "nextId": next_id })))
}

async fn api_reload(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    match state.reload() {
        Ok(count) => {
            info!(count, "Review index reloaded");
            Ok(Json(json!({ "count": count })))
        }
        Err(err) => {
            warn!(error = %err, "Review index reload failed");
            Err(ApiError::internal(err.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    id: Option<String>,
}

impl ReviewParams {
    fn id(&self) -> Option<u32> {
        self.id.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchHitPayload {
    id: u32,
    artist: String,
    album: String,
    cover: String,
    href: String,
    snippet: String,
}

impl SearchHitPayload {
    fn from_record(record: &ReviewRecord) -> Self {
        Self {
            id: record.id,
            artist: record.artist.clone(),
            album: record.album.clone(),
            cover: record.cover.clone(),
            href: record.detail_path(),
            snippet: snippet(record, DEFAULT_SNIPPET_LEN),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResponsePayload {
    query: String,
    limit: usize,
    href: String,
    results: Vec<SearchHitPayload>,
}

#[derive(Debug, Clone, Serialize)]
struct SuggestionPayload {
    id: u32,
    tier: MatchTier,
    html: String,
    href: String,
}

#[derive(Debug, Clone, Serialize)]
struct AutocompletePayload {
    query: String,
    visible: bool,
    suggestions: Vec<SuggestionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewPayload {
    #[serde(flatten)]
    record: ReviewRecord,
    url: String,
    html: String,
    snippet: String,
    next_id: Option<u32>,
}

#[derive(Debug, Clone)]
struct Chrome {
    site_title: String,
    page_title: String,
    query: String,
    head: &'static str,
    script: &'static str,
}

impl Chrome {
    fn new(state: &AppState, page_title: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            site_title: state.site_title.clone(),
            page_title: page_title.into(),
            query: query.into(),
            head: PAGE_HEAD,
            script: AUTOCOMPLETE_SCRIPT,
        }
    }
}

struct ReviewCard<'a> {
    record: &'a ReviewRecord,
    href: String,
    body_html: String,
}

impl<'a> ReviewCard<'a> {
    fn new(record: &'a ReviewRecord) -> Self {
        Self {
            record,
            href: record.detail_path(),
            body_html: render(&record.review),
        }
    }
}

struct CoverCard<'a> {
    record: &'a ReviewRecord,
    href: String,
    snippet: String,
}

impl<'a> CoverCard<'a> {
    fn new(record: &'a ReviewRecord) -> Self {
        Self {
            record,
            href: record.detail_path(),
            snippet: snippet(record, DEFAULT_SNIPPET_LEN),
        }
    }
}

fn render_error_page(site_title: &str, message: impl Into<String>) -> String {
    let message = message.into();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{site_title} • Error</title>
    {head}
  </head>
  <body>
    <main>
      <h1>Something went wrong</h1>
      <p>{message}</p>
      <a href="/" id="backBtn">Back to reviews</a>
    </main>
  </body>
</html>"#,
        site_title = escape_html(site_title),
        head = PAGE_HEAD,
        message = escape_html(&message),
    )
}

/// Link to the search view for `query`.
pub fn search_path(query: &str) -> String {
    format!("/search?q={}", utf8_percent_encode(query, NON_ALPHANUMERIC))
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ chrome.page_title }} • {{ chrome.site_title }}</title>
    {{ chrome.head|safe }}
  </head>
  <body>
    <header class="site-header">
      <a href="/" class="brand">{{ chrome.site_title }}</a>
      <form class="search" action="/search" method="get">
        <input id="searchInput" name="q" type="search" value="{{ chrome.query }}" placeholder="Search artists and albums" autocomplete="off" />
        <div id="autocomplete" class="autocomplete" hidden></div>
      </form>
      <a href="/all" id="allBtn">All reviews</a>
    </header>
    <main>
      <section id="feed">
        {% if cards.is_empty() %}
        <p>No reviews yet.</p>
        {% endif %}
        {% for card in cards %}
        <article class="post">
          <h2><a href="{{ card.href }}">{{ card.record.artist }}</a></h2>
          <h3>{{ card.record.album }}</h3>
          <p>{{ card.record.release_date }}</p>
          <img src="{{ card.record.cover }}" loading="lazy" alt="{{ card.record.album }}">
          {{ card.body_html|safe }}
        </article>
        {% endfor %}
      </section>
    </main>
    <script>{{ chrome.script|safe }}</script>
  </body>
</html>"#,
    ext = "html"
)]
struct FeedTemplate<'a> {
    chrome: Chrome,
    cards: Vec<ReviewCard<'a>>,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ chrome.page_title }} • {{ chrome.site_title }}</title>
    {{ chrome.head|safe }}
  </head>
  <body>
    <header class="site-header">
      <a href="/" class="brand">{{ chrome.site_title }}</a>
      <form class="search" action="/search" method="get">
        <input id="searchInput" name="q" type="search" value="{{ chrome.query }}" placeholder="Search artists and albums" autocomplete="off" />
        <div id="autocomplete" class="autocomplete" hidden></div>
      </form>
      <a href="/" id="backBtn">Back</a>
    </header>
    <main>
      <h1>{{ heading }}</h1>
      {% if cards.is_empty() %}
      <p>{{ empty_message }}</p>
      {% endif %}
      <section id="{{ section_id }}" class="grid">
        {% for card in cards %}
        <a class="card" href="{{ card.href }}">
          <img src="{{ card.record.cover }}" loading="lazy" alt="{{ card.record.album }}">
          <h3>{{ card.record.artist }} – {{ card.record.album }}</h3>
          <p>{{ card.snippet|safe }}</p>
        </a>
        {% endfor %}
      </section>
    </main>
    <script>{{ chrome.script|safe }}</script>
  </body>
</html>"#,
    ext = "html"
)]
struct GridTemplate<'a> {
    chrome: Chrome,
    section_id: &'static str,
    heading: String,
    cards: Vec<CoverCard<'a>>,
    empty_message: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{{ chrome.page_title }} • {{ chrome.site_title }}</title>
    {{ chrome.head|safe }}
  </head>
  <body>
    <header class="site-header">
      <a href="/" class="brand">{{ chrome.site_title }}</a>
      <form class="search" action="/search" method="get">
        <input id="searchInput" name="q" type="search" value="{{ chrome.query }}" placeholder="Search artists and albums" autocomplete="off" />
        <div id="autocomplete" class="autocomplete" hidden></div>
      </form>
      <a href="/" id="backBtn">Back</a>
    </header>
    <main>
      <article id="review" class="detail">
        <h2>{{ card.record.artist }}</h2>
        <h3>{{ card.record.album }}</h3>
        <p>{{ card.record.release_date }}</p>
        <img src="{{ card.record.cover }}" loading="lazy" alt="{{ card.record.album }}">
        {{ card.body_html|safe }}
      </article>
      {% match next %}
      {% when Some with (next) %}
      <nav class="next">
        Next: <a href="{{ next.href }}" rel="next">{{ next.record.artist }} – {{ next.record.album }}</a>
      </nav>
      {% when None %}
      {% endmatch %}
    </main>
    <script>{{ chrome.script|safe }}</script>
  </body>
</html>"#,
    ext = "html"
)]
struct ReviewTemplate<'a> {
    chrome: Chrome,
    card: ReviewCard<'a>,
    next: Option<CoverCard<'a>>,
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn rec(id: u32, artist: &str, album: &str, review: &str) -> ReviewRecord {
        ReviewRecord {
            id,
            artist: artist.into(),
            album: album.into(),
            release_date: "2001".into(),
            cover: format!("covers/{id}.jpg"),
            review: review.into(),
        }
    }

    fn test_state(index_path: PathBuf) -> SharedState {
        let index = ReviewIndex::new(vec![
            rec(3, "Radiohead", "Amnesiac", "**Odd** and *cold* record"),
            rec(7, "Portishead", "Third", "<p>Raw <em>html</em></p>"),
            rec(5, "Head <Case>", "Bleach", "Plain"),
        ]);
        let config = WebConfig {
            index_path,
            ..WebConfig::default()
        };
        Arc::new(AppState::new(index, &config))
    }

    fn test_router() -> Router {
        build_router(test_state(PathBuf::from("/nonexistent/reviews.json")), None)
    }

    async fn get_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn feed_is_newest_first_with_rendered_bodies() {
        let (status, html) = get_text(test_router(), "/").await;
        assert!(status.is_success());
        let third = html.find("Third").unwrap();
        let bleach = html.find("Bleach").unwrap();
        let amnesiac = html.find("Amnesiac").unwrap();
        assert!(third < bleach && bleach < amnesiac);
        assert!(html.contains("<p><strong>Odd</strong> and <em>cold</em> record</p>"));
        assert!(html.contains("<p>Raw <em>html</em></p>"));
        assert!(html.contains("Head &lt;Case&gt;"));
        assert!(html.contains("id=\"feed\""));
    }

    #[tokio::test]
    async fn review_page_links_next_in_index_order() {
        let (status, html) = get_text(test_router(), "/review?id=3").await;
        assert!(status.is_success());
        assert!(html.contains("id=\"review\""));
        assert!(html.contains("review?id=7\" rel=\"next\""));
    }

    #[tokio::test]
    async fn unknown_review_is_not_found() {
        let (status, html) = get_text(test_router(), "/review?id=99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("Review not found."));
        let (status, _) = get_text(test_router(), "/review?id=abc").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_page_round_trips_query() {
        let (status, html) = get_text(test_router(), "/search?q=ishead").await;
        assert!(status.is_success());
        assert!(html.contains("value=\"ishead\""));
        assert!(html.contains("id=\"results\""));
        assert!(html.contains("review?id=7\""));
        assert!(!html.contains("review?id=3\""));
        assert!(!html.contains("review?id=5\""));
    }

    #[tokio::test]
    async fn grid_lists_latest() {
        let (status, html) = get_text(test_router(), "/all").await;
        assert!(status.is_success());
        assert!(html.contains("id=\"grid\""));
        assert!(html.contains("Odd and cold record"));
    }

    #[tokio::test]
    async fn api_search_returns_matches_in_index_order() {
        let (status, body) = get_text(test_router(), "/api/search?q=HEAD&limit=2").await;
        assert!(status.is_success());
        let payload: SearchResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.limit, 2);
        assert_eq!(payload.href, "/search?q=HEAD");
        let ids: Vec<_> = payload.results.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![3, 7]);
    }

    #[tokio::test]
    async fn api_autocomplete_tiers_results() {
        let (status, body) = get_text(test_router(), "/api/autocomplete?q=%20Head").await;
        assert!(status.is_success());
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["query"], "head");
        assert_eq!(payload["visible"], true);
        let suggestions = payload["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0]["id"], 5);
        assert_eq!(suggestions[0]["tier"], "prefix");
        assert_eq!(
            suggestions[0]["html"],
            "<span class=\"highlight\">Head</span> &lt;Case&gt; – Bleach"
        );
        assert_eq!(suggestions[1]["tier"], "substring");
    }

    #[tokio::test]
    async fn api_autocomplete_empty_query_is_hidden() {
        let (_, body) = get_text(test_router(), "/api/autocomplete?q=").await;
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["visible"], false);
        assert!(payload["suggestions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn api_review_includes_rendered_html() {
        let (status, body) = get_text(test_router(), "/api/review?id=3").await;
        assert!(status.is_success());
        let payload: ReviewPayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.record.album, "Amnesiac");
        assert_eq!(payload.url, "http://127.0.0.1:8080/review?id=3");
        assert_eq!(payload.html, "<p><strong>Odd</strong> and <em>cold</em> record</p>");
        assert_eq!(payload.snippet, "Odd and cold record");
        assert_eq!(payload.next_id, Some(7));

        let (status, _) = get_text(test_router(), "/api/review?id=42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn absolute_urls_follow_configured_base() {
        let config = WebConfig {
            base_url: "https://reviews.example/".to_string(),
            ..WebConfig::default()
        };
        let state = AppState::new(ReviewIndex::default(), &config);
        assert_eq!(
            state.absolute_url("/review?id=4"),
            "https://reviews.example/review?id=4"
        );
    }

    #[tokio::test]
    async fn api_next_reports_next_id() {
        let (_, body) = get_text(test_router(), "/api/next").await;
        let payload: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(payload["count"], 3);
        assert_eq!(payload["nextId"], 8);
    }

    #[tokio::test]
    async fn failed_reload_keeps_current_index() {
        let state = test_state(PathBuf::from("/nonexistent/reviews.json"));
        let router = build_router(state.clone(), None);
        let response = router
            .oneshot(Request::post("/api/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.index().len(), 3);
    }

    #[tokio::test]
    async fn reload_swaps_in_a_fresh_index() {
        let path = std::env::temp_dir().join(format!(
            "albumreviews-reload-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"id":1,"artist":"Only","album":"One","releaseDate":"","cover":"","review":""}]"#,
        )
        .unwrap();
        let state = test_state(path.clone());
        let before = state.index();
        let router = build_router(state.clone(), None);
        let response = router
            .oneshot(Request::post("/api/reload").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(state.index().len(), 1);
        assert_eq!(before.len(), 3);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn search_path_encodes_query() {
        assert_eq!(search_path("kid a"), "/search?q=kid%20a");
    }

    #[test]
    fn error_page_escapes_message() {
        let html = render_error_page("Reviews", "<bad>");
        assert!(html.contains("&lt;bad&gt;"));
    }
}
