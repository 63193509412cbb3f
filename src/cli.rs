use std::cmp;
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use albumreviews_rs::admin::{
    AdminSession, CoverUpload, DEFAULT_BRANCH, RepoTarget, ReviewDraft, StatusMessage,
};
use albumreviews_rs::autocomplete::SUGGESTION_LIMIT;
use albumreviews_rs::blob::{DEFAULT_API_BASE, GitHubContents};
use albumreviews_rs::render::{self, DEFAULT_SNIPPET_LEN};
use albumreviews_rs::{DEFAULT_INDEX_PATH, DEFAULT_SEARCH_LIMIT, ReviewIndex, ReviewRecord};
use atty::Stream;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "albumreviews-rs",
    about = "Render, search and publish album reviews",
    version
)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// Path to the review index.
    #[arg(long, global = true, default_value = DEFAULT_INDEX_PATH)]
    index: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render review text (Markdown or HTML) to HTML.
    Render {
        /// File to read; stdin when omitted or `-`.
        file: Option<PathBuf>,
        /// Print a plain-text snippet of this many characters instead.
        #[arg(long)]
        snippet: Option<usize>,
    },
    /// List reviews whose artist or album contains the query.
    Search {
        /// Text to match; case-insensitive.
        query: String,
        /// Maximum number of matches to return.
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Show search-box suggestions for a partially typed query.
    Suggest {
        query: String,
        #[arg(short, long, default_value_t = SUGGESTION_LIMIT)]
        limit: usize,
    },
    /// Show one review.
    Show {
        /// Review ID.
        id: u32,
    },
    /// Print the ID the next submitted review will get.
    NextId,
    /// Publish a new review and its cover to the site repository.
    Submit(SubmitArgs),
    /// Run the review website.
    #[cfg(feature = "web")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Repository owner.
    #[arg(long)]
    owner: String,
    /// Repository name.
    #[arg(long)]
    repo: String,
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,
    /// Path of the review index inside the repository.
    #[arg(long, default_value = DEFAULT_INDEX_PATH)]
    index_path: String,
    /// Access token; falls back to $GITHUB_TOKEN.
    #[arg(long)]
    token: Option<String>,
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,
    #[arg(long)]
    artist: String,
    #[arg(long)]
    album: String,
    #[arg(long, default_value = "")]
    release_date: String,
    /// File holding the review body, or `-` for stdin.
    #[arg(long)]
    review: PathBuf,
    /// Cover image to upload.
    #[arg(long)]
    cover: Option<PathBuf>,
}

#[cfg(feature = "web")]
#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: std::net::SocketAddr,
    /// Public base URL; derived from --addr when omitted.
    #[arg(long)]
    base_url: Option<String>,
    /// Directory served under /covers.
    #[arg(long)]
    covers_dir: Option<PathBuf>,
    #[arg(long, default_value = "Album Reviews")]
    site_title: String,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Command::Render { file, snippet } => handle_render(file, snippet, cli.json),
        Command::Search { query, limit } => handle_search(&cli.index, query, limit, cli.json),
        Command::Suggest { query, limit } => handle_suggest(&cli.index, query, limit, cli.json),
        Command::Show { id } => handle_show(&cli.index, id, cli.json),
        Command::NextId => handle_next_id(&cli.index, cli.json),
        Command::Submit(args) => handle_submit(args, cli.json),
        #[cfg(feature = "web")]
        Command::Serve(args) => handle_serve(cli.index, args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn runtime() -> io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

fn read_input(path: Option<&Path>) -> Result<String, Box<dyn Error>> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path).map_err(|err| {
            Box::<dyn Error>::from(format!("Failed to read {}: {err}", path.display()))
        }),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn handle_render(
    file: Option<PathBuf>,
    snippet: Option<usize>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let content = read_input(file.as_deref())?;
    if as_json {
        let payload = json!({
            "html": render::render(&content),
            "snippet": render::snippet_text(&content, snippet.unwrap_or(DEFAULT_SNIPPET_LEN)),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    match snippet {
        Some(max_len) => println!("{}", render::snippet_text(&content, max_len)),
        None => println!("{}", render::render(&content)),
    }
    Ok(())
}

fn handle_search(
    index_path: &Path,
    query: String,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let index = ReviewIndex::from_path(index_path)?;
    let limit = cmp::max(1, limit);
    let matches = index.search(&query, limit);

    if as_json {
        let payload = json!({
            "query": query,
            "limit": limit,
            "results": matches.iter().map(|record| record_summary(record)).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_record_table(&format!("Reviews matching \"{query}\":"), &matches);
    }
    Ok(())
}

fn handle_suggest(
    index_path: &Path,
    query: String,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let index = ReviewIndex::from_path(index_path)?;
    let suggestions = index.suggest(&query, cmp::max(1, limit));

    if as_json {
        let payload = json!({
            "query": query,
            "suggestions": suggestions.iter().map(|item| json!({
                "id": item.record.id,
                "tier": item.tier,
                "label": item.record.label(),
                "html": item.html,
                "href": item.href,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    if suggestions.is_empty() {
        println!("No suggestions for \"{query}\".");
        return Ok(());
    }
    let width = suggestions
        .iter()
        .map(|item| item.record.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max("ID".len());
    println!("{:>width$}  {:<9}  {}", "ID", "MATCH", "REVIEW", width = width);
    println!("{:->width$}  {:-<9}  {}", "", "", "------", width = width);
    for item in &suggestions {
        println!(
            "{:>width$}  {:<9}  {}",
            item.record.id,
            item.tier.as_str(),
            item.record.label(),
            width = width
        );
    }
    Ok(())
}

fn handle_show(index_path: &Path, id: u32, as_json: bool) -> Result<(), Box<dyn Error>> {
    let index = ReviewIndex::from_path(index_path)?;
    let record = index
        .get(id)
        .ok_or_else(|| format!("No review found with ID {id}"))?;
    let next = index.next_after(id);

    if as_json {
        let payload = json!({
            "review": record,
            "html": render::render(&record.review),
            "snippet": render::snippet(record, DEFAULT_SNIPPET_LEN),
            "next_id": next.map(|next| next.id),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_review(record, next);
    }
    Ok(())
}

fn handle_next_id(index_path: &Path, as_json: bool) -> Result<(), Box<dyn Error>> {
    let index = ReviewIndex::from_path(index_path)?;
    if as_json {
        let payload = json!({ "count": index.len(), "next_id": index.next_id()? });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", index.next_id()?);
    }
    Ok(())
}

fn repo_target(args: &SubmitArgs) -> RepoTarget {
    RepoTarget {
        index_path: args.index_path.clone(),
        ..RepoTarget::new(args.branch.clone())
    }
}

fn handle_submit(args: SubmitArgs, as_json: bool) -> Result<(), Box<dyn Error>> {
    let target = repo_target(&args);
    let review = read_input(Some(&args.review))?;
    let cover = match &args.cover {
        Some(path) => Some(CoverUpload {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            bytes: fs::read(path)
                .map_err(|err| format!("Failed to read {}: {err}", path.display()))?,
        }),
        None => None,
    };
    let draft = ReviewDraft {
        artist: args.artist,
        album: args.album,
        release_date: args.release_date,
        review,
    };

    let mut store = GitHubContents::new(args.owner, args.repo).with_api_base(args.api_base);
    match args.token.or_else(|| std::env::var("GITHUB_TOKEN").ok()) {
        Some(token) => store = store.with_token(token),
        None => tracing::warn!("No access token given; writes will likely be rejected"),
    }
    let mut session = AdminSession::new(store, target);

    let record = runtime()?.block_on(async {
        report_status(&StatusMessage::loading(), as_json);
        match session.load().await {
            Ok(summary) => report_status(&StatusMessage::loaded(&summary), as_json),
            Err(err) => {
                report_status(&StatusMessage::from(&err), as_json);
                return Err(Box::<dyn Error>::from(err));
            }
        }
        report_status(&StatusMessage::saving(), as_json);
        session.submit(&draft, cover.as_ref()).await.map_err(|err| {
            report_status(&StatusMessage::from(&err), as_json);
            Box::<dyn Error>::from(err)
        })
    })?;

    report_status(&StatusMessage::saved(&record), as_json);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

fn report_status(status: &StatusMessage, as_json: bool) {
    if as_json {
        return;
    }
    if status.is_error {
        eprintln!("{status}");
    } else {
        println!("{status}");
    }
}

#[cfg(feature = "web")]
fn handle_serve(index_path: PathBuf, args: ServeArgs) -> Result<(), Box<dyn Error>> {
    use albumreviews_rs::web::{WebConfig, serve};

    let config = WebConfig {
        base_url: args
            .base_url
            .unwrap_or_else(|| format!("http://{}", args.addr)),
        addr: args.addr,
        index_path,
        covers_dir: args.covers_dir,
        site_title: args.site_title,
    };
    runtime()?.block_on(serve(config))?;
    Ok(())
}

fn record_summary(record: &ReviewRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "artist": record.artist,
        "album": record.album,
        "release_date": record.release_date,
        "href": record.detail_path(),
    })
}

fn print_record_table(title: &str, rows: &[&ReviewRecord]) {
    if rows.is_empty() {
        println!("No reviews matched.");
        return;
    }
    let id_width = rows
        .iter()
        .map(|record| record.id.to_string().len())
        .max()
        .unwrap_or(2)
        .max("ID".len());
    let artist_width = rows
        .iter()
        .map(|record| record.artist.chars().count())
        .max()
        .unwrap_or(6)
        .max("ARTIST".len());
    println!("{title}");
    println!(
        "{:>id_width$}  {:<artist_width$}  {}",
        "ID", "ARTIST", "ALBUM"
    );
    println!("{:->id_width$}  {:-<artist_width$}  {}", "", "", "-----");
    for record in rows {
        println!(
            "{:>id_width$}  {:<artist_width$}  {}",
            record.id, record.artist, record.album
        );
    }
}

fn print_review(record: &ReviewRecord, next: Option<&ReviewRecord>) {
    println!("{} (#{})", record.label(), record.id);
    if !record.release_date.is_empty() {
        println!("Released: {}", record.release_date);
    }
    println!("Cover: {}", record.cover);

    let body = if render::looks_like_html(&record.review) {
        render::strip_tags(&record.review)
    } else {
        record.review.clone()
    };
    render_markdown_block("Review", &body);

    if let Some(next) = next {
        println!("\nNext: {} (#{})", next.label(), next.id);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
