//! Review body rendering.
//!
//! Bodies are either trusted HTML, passed through untouched, or a small
//! markdown dialect rewritten by an ordered list of single-pass rules. Later
//! rules run over the output of earlier ones, so the order below is part of
//! the format: inline code inside a fenced block is still rewritten, list
//! markers are looked for after emphasis, and so on.
//!
//! Heading and list rules start at a line start, but the whitespace around
//! their marker may span line breaks. `Intro\n\n* a` therefore turns the
//! blank line into part of the list item and stays one paragraph.
//!
//! Only fenced code is HTML-escaped. Everything else is emitted as written,
//! same as the HTML passthrough, so review bodies must come from a trusted
//! author.

use crate::ReviewRecord;

/// Default snippet length used by listings.
pub const DEFAULT_SNIPPET_LEN: usize = 220;

const FENCE: &str = "```";
const LI_OPEN: &str = "<li>";
const LI_CLOSE: &str = "</li>";
const ELLIPSIS: char = '…';
const LINE_BREAKS: [char; 4] = ['\n', '\r', '\u{2028}', '\u{2029}'];
const BLOCK_TAGS: &[&str] = &[
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "pre",
    "blockquote",
    "p",
    "img",
    "code",
];

/// Renders a review body to HTML.
///
/// Empty input yields an empty string. Input that looks like HTML (see
/// [`looks_like_html`]) is returned unchanged; anything else is treated as
/// markdown. Never fails: markers without a partner are left as literal text.
pub fn render(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    if looks_like_html(content.trim_matches(is_space)) {
        return content.to_string();
    }
    markdown_to_html(content)
}

/// Applies the markdown rules unconditionally.
pub fn markdown_to_html(markdown: &str) -> String {
    let html = fenced_code(markdown);
    let html = inline_code(&html);
    let html = (1..=6).rev().fold(html, |html, level| heading(&html, level));
    let html = emphasis(&html, "**", "strong");
    let html = emphasis(&html, "__", "strong");
    let html = emphasis(&html, "*", "em");
    let html = emphasis(&html, "_", "em");
    let html = links(&html);
    let html = list_items(&html, bullet_marker);
    let html = list_items(&html, number_marker);
    let html = group_list_items(&html);
    paragraphs(&html)
}

/// Loose tag-shape test: a `<`, an optional `/`, an ASCII letter and a `>`
/// somewhere after it.
///
/// Prose such as `a <b and c>` is classified as HTML and skips markdown
/// rendering. Existing bodies depend on this exact behaviour.
pub fn looks_like_html(text: &str) -> bool {
    text.match_indices('<').any(|(pos, _)| {
        let tag = &text[pos + 1..];
        let tag = tag.strip_prefix('/').unwrap_or(tag);
        let mut chars = tag.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic()) && chars.as_str().contains('>')
    })
}

/// Escapes `&`, `<` and `>`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Replaces every `<…>` run with a single space.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('>') {
            Some(close) if close > 0 => {
                out.push(' ');
                rest = &after[close + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Plain-text excerpt of a record's review, HTML-escaped for direct embedding.
pub fn snippet(record: &ReviewRecord, max_len: usize) -> String {
    snippet_text(&record.review, max_len)
}

/// Plain-text excerpt of a review body.
///
/// The body is rendered, stripped of tags and whitespace-collapsed. Text
/// longer than `max_len` characters is cut, trimmed and suffixed with `…`.
pub fn snippet_text(content: &str, max_len: usize) -> String {
    let text = strip_tags(&render(content))
        .split(is_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    match text.char_indices().nth(max_len) {
        None => escape_html(&text),
        Some((cut, _)) => {
            let mut out = escape_html(text[..cut].trim_matches(is_space));
            out.push(ELLIPSIS);
            out
        }
    }
}

fn fenced_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let body_start = open + FENCE.len();
        let Some(close) = rest[body_start..].find(FENCE) else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str("<pre><code>");
        out.push_str(&escape_html(&rest[body_start..body_start + close]));
        out.push_str("</code></pre>");
        rest = &rest[body_start + close + FENCE.len()..];
    }
    out.push_str(rest);
    out
}

fn inline_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('`') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('`') {
            Some(close) if close > 0 => {
                out.push_str("<code>");
                out.push_str(&after[..close]);
                out.push_str("</code>");
                rest = &after[close + 1..];
            }
            _ => {
                out.push('`');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Applies `rule` at every line start the way a `gm` regex does.
///
/// `rule` gets the whole text and a line start and returns the end of its
/// match plus the replacement. Scanning resumes at the first line start at or
/// after the end of the previous match, so a match may run over several lines.
fn rewrite_line_starts<F>(text: &str, rule: F) -> String
where
    F: Fn(&str, usize) -> Option<(usize, String)>,
{
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut line_start = Some(0);
    while let Some(start) = line_start {
        let mut resume = start;
        if let Some((end, replacement)) = rule(text, start) {
            out.push_str(&text[copied..start]);
            out.push_str(&replacement);
            copied = end;
            resume = end;
        }
        line_start = next_line_start(text, resume);
    }
    out.push_str(&text[copied..]);
    out
}

fn next_line_start(text: &str, from: usize) -> Option<usize> {
    let offset = text[from..].find(LINE_BREAKS)?;
    let brk = from + offset;
    let width = text[brk..].chars().next().map_or(1, char::len_utf8);
    Some(brk + width)
}

fn line_end(text: &str, from: usize) -> usize {
    text[from..].find(LINE_BREAKS).map_or(text.len(), |offset| from + offset)
}

/// Whitespace as matched by `\s`: Unicode spaces plus line terminators.
fn is_space(c: char) -> bool {
    (c.is_whitespace() && c != '\u{85}') || c == '\u{feff}'
}

fn leading_space_len(text: &str) -> usize {
    text.len() - text.trim_start_matches(is_space).len()
}

/// Span captured by `\s{min_ws,}(.+)$` starting at `from`.
///
/// The whitespace may cross line breaks. When it runs to the end of the
/// input, the last character that is not a line break becomes the body.
fn captured_body(text: &str, from: usize, min_ws: usize) -> Option<(usize, usize)> {
    let rest = &text[from..];
    let ws = &rest[..leading_space_len(rest)];
    let spaces: Vec<(usize, char)> = ws.char_indices().collect();
    if spaces.len() < min_ws {
        return None;
    }
    if ws.len() < rest.len() {
        let start = from + ws.len();
        return Some((start, line_end(text, start)));
    }
    spaces
        .iter()
        .enumerate()
        .rev()
        .take_while(|(kept, _)| *kept >= min_ws)
        .find(|(_, (_, c))| !LINE_BREAKS.contains(c))
        .map(|(_, &(pos, c))| (from + pos, from + pos + c.len_utf8()))
}

fn heading(text: &str, level: usize) -> String {
    let marker = "#".repeat(level);
    rewrite_line_starts(text, |text, start| {
        if !text[start..].starts_with(&marker) {
            return None;
        }
        let (body_start, body_end) = captured_body(text, start + level, 0)?;
        let body = &text[body_start..body_end];
        Some((body_end, format!("<h{level}>{body}</h{level}>")))
    })
}

// Both list styles become plain `<li>`; leading blank lines are part of the match.
fn list_items(text: &str, marker: fn(&str) -> Option<usize>) -> String {
    rewrite_line_starts(text, |text, start| {
        let indent = start + leading_space_len(&text[start..]);
        let marker_len = marker(&text[indent..])?;
        let (body_start, body_end) = captured_body(text, indent + marker_len, 1)?;
        let body = &text[body_start..body_end];
        Some((body_end, format!("{LI_OPEN}{body}{LI_CLOSE}")))
    })
}

fn bullet_marker(line: &str) -> Option<usize> {
    line.starts_with(['-', '*']).then_some(1)
}

fn number_marker(line: &str) -> Option<usize> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    (digits > 0 && line[digits..].starts_with('.')).then_some(digits + 1)
}

fn emphasis(text: &str, delimiter: &str, tag: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(delimiter) {
        out.push_str(&rest[..open]);
        let inner = &rest[open + delimiter.len()..];
        match closing_on_line(inner, delimiter) {
            Some(close) => {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                out.push_str(&inner[..close]);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
                rest = &inner[close + delimiter.len()..];
            }
            None => {
                // Delimiters are ASCII; retry one byte further on.
                out.push_str(&rest[open..open + 1]);
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Offset of the first `delimiter` after at least one character, without
/// crossing a line break.
fn closing_on_line(inner: &str, delimiter: &str) -> Option<usize> {
    let first = inner.chars().next().filter(|c| !LINE_BREAKS.contains(c))?;
    let line_end = inner.find(LINE_BREAKS).unwrap_or(inner.len());
    let from = first.len_utf8();
    inner[from..line_end]
        .find(delimiter)
        .map(|pos| from + pos)
}

fn links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match link_parts(after) {
            Some((label, href, consumed)) => {
                out.push_str("<a href=\"");
                out.push_str(href);
                out.push_str("\">");
                out.push_str(label);
                out.push_str("</a>");
                rest = &after[consumed..];
            }
            None => {
                out.push('[');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Splits `label](href)` into its parts plus the number of bytes consumed.
fn link_parts(after: &str) -> Option<(&str, &str, usize)> {
    let label_end = after.find(']').filter(|&end| end > 0)?;
    let target = after[label_end + 1..].strip_prefix('(')?;
    let href_end = target.find(')').filter(|&end| end > 0)?;
    let consumed = label_end + 2 + href_end + 1;
    Some((&after[..label_end], &target[..href_end], consumed))
}

/// Wraps each run of `<li>` elements separated only by whitespace in one
/// `<ul>`, dropping the whitespace between them.
fn group_list_items(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut rest = text;
    while let Some(start) = rest.find(LI_OPEN) {
        let Some(first_len) = list_item_len(&rest[start..]) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str("<ul>");
        let mut cursor = start + first_len;
        out.push_str(&rest[start..cursor]);
        loop {
            let tail = &rest[cursor..];
            let next = tail.trim_start_matches(is_space);
            if !next.starts_with(LI_OPEN) {
                break;
            }
            let Some(len) = list_item_len(next) else {
                break;
            };
            out.push_str(&next[..len]);
            cursor += tail.len() - next.len() + len;
        }
        out.push_str("</ul>");
        rest = &rest[cursor..];
    }
    out.push_str(rest);
    out
}

fn list_item_len(item: &str) -> Option<usize> {
    item.find(LI_CLOSE).map(|pos| pos + LI_CLOSE.len())
}

fn paragraphs(text: &str) -> String {
    split_blocks(text)
        .into_iter()
        .map(|part| {
            let part = part.trim_matches(is_space);
            if part.is_empty() {
                String::new()
            } else if starts_with_block_tag(part) {
                part.to_string()
            } else {
                format!("<p>{}</p>", part.replace('\n', "<br>"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Splits on blank lines: a newline, any whitespace, and a later newline.
fn split_blocks(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(offset) = text[search..].find('\n') {
        let newline = search + offset;
        let run = &text[newline + 1..];
        let run_len = leading_space_len(run);
        match run[..run_len].rfind('\n') {
            Some(last) => {
                parts.push(&text[start..newline]);
                start = newline + 1 + last + 1;
                search = start;
            }
            None => search = newline + 1,
        }
    }
    parts.push(&text[start..]);
    parts
}

fn starts_with_block_tag(part: &str) -> bool {
    let Some(tag) = part.strip_prefix('<') else {
        return false;
    };
    BLOCK_TAGS.iter().any(|name| {
        tag.get(..name.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(name))
    })
}
