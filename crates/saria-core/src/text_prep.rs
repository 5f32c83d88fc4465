//! Text preparation for speech — markdown flattening, chunking, language probe.
//!
//! Pure functions, no I/O. Generation replies arrive as markdown and read
//! badly when spoken verbatim, so the relay flattens them before handing
//! text to the speech endpoint.

use std::sync::LazyLock;

use regex::Regex;

// Compiled regexes — allocated once, reused across calls.
static RE_FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static RE_INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").unwrap());
static RE_EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*{1,2}([^*]+)\*{1,2}").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static RE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*]|\d+\.)\s+").unwrap());
static RE_MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static RE_DEVANAGARI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0900}-\x{097F}]").unwrap());

/// Flatten markdown so a reply reads naturally when spoken.
///
/// Handles: fenced code blocks, inline code, bold/italic, headings, links,
/// bullet and numbered lists.
pub fn clean_for_speech(text: &str) -> String {
    let mut c = text.to_string();

    // Fenced code blocks → placeholder (before inline code, since backticks nest)
    c = RE_FENCED_CODE
        .replace_all(&c, " See the code in our conversation. ")
        .into_owned();
    c = RE_INLINE_CODE.replace_all(&c, "").into_owned();
    // Bold / italic → plain
    c = RE_EMPHASIS.replace_all(&c, "$1").into_owned();
    // Headings → pound signs removed
    c = RE_HEADING.replace_all(&c, "").into_owned();
    // Links → text only
    c = RE_LINK.replace_all(&c, "$1").into_owned();
    // List markers → ". " prefix, read as a short pause
    c = RE_LIST_MARKER.replace_all(&c, ". ").into_owned();
    c = RE_MULTI_SPACE.replace_all(&c, " ").into_owned();

    c.trim().to_string()
}

/// Speech-language hint for a reply: any Devanagari means Hindi.
pub fn speech_lang(text: &str) -> &'static str {
    if RE_DEVANAGARI.is_match(text) {
        "hi"
    } else {
        "en"
    }
}

/// Longest text the speech endpoint accepts per request, in bytes.
pub const MAX_SPEECH_CHUNK_LEN: usize = 200;

/// Split text into chunks of at most `max_len` bytes for synthesis.
///
/// Prefers sentence boundaries (`. `), then word boundaries, then
/// hard-splits. Cuts only at char boundaries — replies can be Devanagari,
/// where byte offsets land mid-character.
pub fn split_for_speech(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while rest.len() > max_len {
        let window_end = floor_char_boundary(rest, max_len);
        if window_end == 0 {
            break;
        }
        let window = &rest[..window_end];

        // Sentence boundary first (keep the period), then word boundary,
        // then a hard cut at the window edge.
        let cut = window
            .rfind(". ")
            .map(|pos| pos + 1)
            .filter(|&pos| pos >= max_len / 2)
            .or_else(|| window.rfind(' ').filter(|&pos| pos >= max_len / 3))
            .unwrap_or(window_end);

        let chunk = rest[..cut].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }

    chunks
}

/// Largest char boundary at or below `i`.
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
