//! Cleanup of raw extracted document text.
//!
//! Text coming out of PDF/DOCX/EPUB extraction carries line-break
//! hyphenation, ligatures, control characters and ragged whitespace. The
//! normalizer turns it into a single line of single-spaced text, which the
//! chunker relies on.

use std::sync::LazyLock;

use regex::Regex;

/// A word split by a hyphen at a line break, continued in lowercase ("narra-\ntion").
/// Extractors mark the break with an ASCII hyphen, a soft hyphen or U+2010.
static LINE_BREAK_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})[-\x{00AD}\x{2010}][ \t]*\r?\n[ \t]*(\p{Ll})").expect("valid hyphenation regex"));

/// Non-printable characters: controls other than whitespace, format characters
/// (soft hyphen, zero-width joiners, BOM), private use, and the replacement character.
static NON_PRINTABLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[[\p{Cc}\p{Cf}\p{Co}\x{FFFD}]&&[^\t\n\r\x0B\x0C]]").expect("valid control regex"));

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Typographic ligatures emitted by PDF text extraction.
const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Normalize raw extracted text into a single speakable string.
///
/// Joins hyphenated line breaks, expands ligatures, strips non-printable
/// characters and collapses all whitespace (including newlines) to single
/// spaces. Empty or whitespace-only input yields an empty string.
pub fn normalize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let text = LINE_BREAK_HYPHEN.replace_all(raw, "$1$2");
    let text = expand_ligatures(&text);
    let text = NON_PRINTABLE.replace_all(&text, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");

    text.trim().to_string()
}

fn expand_ligatures(text: &str) -> String {
    if !text.chars().any(|c| ('\u{FB00}'..='\u{FB06}').contains(&c)) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, expansion)) => out.push_str(expansion),
            None => out.push(c),
        }
    }
    out
}
