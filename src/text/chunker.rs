//! Splitting normalized text into bounded, speakable chunks.
//!
//! Sentences are packed greedily up to the length bound. A sentence longer
//! than the bound is broken at clause boundaries; text with no sentence
//! terminator at all additionally falls back to word boundaries. A
//! terminated sentence (or clause) is never cut mid-way, so it may form an
//! oversized chunk on its own. Content is never dropped.

use std::ops::Range;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default maximum chunk length in characters.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 500;

/// Words ending in '.' that do not end a sentence.
const ABBREVIATIONS: &[&str] = &["mr", "mrs", "ms", "dr", "prof", "st", "jr", "sr", "vs", "etc", "e.g", "i.e", "mt", "gen", "col", "capt", "lt", "rev"];

/// Abbreviations that only hold before a number ("No. 5", "Ch. 3").
const NUMBERED_ABBREVIATIONS: &[&str] = &["no", "vol", "ch", "fig", "pp"];

const CLAUSE_MARKS: &[char] = &[',', ';', ':', '\u{2014}', '\u{2013}'];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("valid word regex"));

/// Unit in which the chunk length bound is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Unicode scalar values
    #[default]
    Chars,
    /// Whitespace-delimited words
    Words,
}

impl LengthUnit {
    /// Length of `text` in this unit.
    pub fn measure(&self, text: &str) -> usize {
        match self {
            LengthUnit::Chars => text.chars().count(),
            LengthUnit::Words => text.split_whitespace().count(),
        }
    }
}

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk length (L); values below 1 are treated as 1
    pub max_len: usize,
    pub unit: LengthUnit,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_len: DEFAULT_MAX_CHUNK_LEN, unit: LengthUnit::Chars }
    }
}

/// One synthesis unit of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Dense 0-based position in the document
    pub index: usize,
    pub text: String,
    /// Byte range of `text` within the normalized document text
    pub span: Range<usize>,
}

impl Chunk {
    /// Length of the chunk text in `unit`.
    pub fn len_in(&self, unit: LengthUnit) -> usize {
        unit.measure(&self.text)
    }
}

/// Splits normalized text into [`Chunk`]s. Deterministic for a given config and input.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

#[derive(Debug, Clone, Copy)]
struct Sentence {
    start: usize,
    end: usize,
    terminated: bool,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into ordered chunks covering all of its non-whitespace content.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let max_len = self.config.max_len.max(1);
        let unit = self.config.unit;

        let mut units: Vec<Range<usize>> = Vec::new();
        for sentence in split_sentences(text) {
            let range = sentence.start..sentence.end;
            if unit.measure(&text[range.clone()]) <= max_len {
                units.push(range);
                continue;
            }

            for clause in split_clauses(text, range) {
                if sentence.terminated || unit.measure(&text[clause.clone()]) <= max_len {
                    units.push(clause);
                } else {
                    units.extend(split_words(text, clause));
                }
            }
        }

        // Greedy packing of contiguous units
        let mut chunks = Vec::new();
        let mut current: Option<Range<usize>> = None;
        for range in units {
            current = match current {
                None => Some(range),
                Some(cur) if unit.measure(&text[cur.start..range.end]) <= max_len => Some(cur.start..range.end),
                Some(cur) => {
                    push_chunk(&mut chunks, text, cur);
                    Some(range)
                }
            };
        }
        if let Some(cur) = current {
            push_chunk(&mut chunks, text, cur);
        }

        chunks
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, span: Range<usize>) {
    chunks.push(Chunk { index: chunks.len(), text: text[span.clone()].to_string(), span });
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{2026}')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '}' | '\u{201D}' | '\u{2019}' | '\u{00BB}')
}

/// Whether the '.' at byte `dot` closes an abbreviation or an initial rather than a sentence.
///
/// `rest` is the text following the dot.
fn is_abbreviation(text: &str, sentence_start: usize, dot: usize, rest: &str) -> bool {
    let Some(word) = text[sentence_start..dot].split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(|c: char| matches!(c, '(' | '[' | '"' | '\'' | '\u{201C}' | '\u{2018}'));

    let mut chars = word.chars();
    if let (Some(first), None) = (chars.next(), chars.next())
        && first.is_uppercase()
        && first != 'I'
    {
        return true;
    }

    if NUMBERED_ABBREVIATIONS.iter().any(|abbr| word.eq_ignore_ascii_case(abbr)) {
        return rest.trim_start().starts_with(|c: char| c.is_ascii_digit());
    }

    ABBREVIATIONS.iter().any(|abbr| word.eq_ignore_ascii_case(abbr))
}

/// Split text into trimmed sentence spans.
///
/// A boundary is a terminator run (plus closing quotes/brackets) followed by
/// whitespace or end of text. The trailing piece without a terminator is
/// returned with `terminated = false`.
fn split_sentences(text: &str) -> Vec<Sentence> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start: Option<usize> = None;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        let sentence_start = match start {
            Some(s) => s,
            None if c.is_whitespace() => {
                i += 1;
                continue;
            }
            None => {
                start = Some(pos);
                pos
            }
        };

        if !is_terminator(c) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < chars.len() && (is_terminator(chars[j].1) || is_closer(chars[j].1)) {
            j += 1;
        }
        let at_break = j == chars.len() || chars[j].1.is_whitespace();
        let single_dot = c == '.' && j == i + 1;

        let end = chars.get(j).map_or(text.len(), |&(p, _)| p);
        if at_break && !(single_dot && is_abbreviation(text, sentence_start, pos, &text[end..])) {
            sentences.push(Sentence { start: sentence_start, end, terminated: true });
            start = None;
        }
        i = j;
    }

    if let Some(s) = start {
        let end = s + text[s..].trim_end().len();
        if end > s {
            sentences.push(Sentence { start: s, end, terminated: false });
        }
    }

    sentences
}

/// Split a span after clause punctuation that is followed by whitespace.
fn split_clauses(text: &str, span: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[span.clone()];
    let mut clauses = Vec::new();
    let mut piece_start = 0;
    let mut iter = slice.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if CLAUSE_MARKS.contains(&c) && iter.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            let end = i + c.len_utf8();
            clauses.extend(trim_span(text, span.start + piece_start..span.start + end));
            piece_start = end;
        }
    }
    clauses.extend(trim_span(text, span.start + piece_start..span.end));

    clauses
}

fn split_words(text: &str, span: Range<usize>) -> Vec<Range<usize>> {
    WORD.find_iter(&text[span.clone()]).map(|m| span.start + m.start()..span.start + m.end()).collect()
}

fn trim_span(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[span.clone()];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed_end = slice.trim_end().len();
    (trimmed_end > trimmed_start).then(|| span.start + trimmed_start..span.start + trimmed_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_texts(text: &str, max_len: usize, unit: LengthUnit) -> Vec<String> {
        Chunker::new(ChunkerConfig { max_len, unit }).chunk(text).into_iter().map(|c| c.text).collect()
    }

    const PASSAGE: &str = "It was the best of times, it was the worst of times. Mr. Lorry had travelled far; the road, \
        muddy and long, had worn him down. \"Is this the place?\" he asked. Nobody answered him, not the driver, \
        not the guard, not even J. Cruncher who sat beside the luggage. and then there was a long trailing run of \
        words without any terminal punctuation at all";

    #[test]
    fn test_oversized_sentence_forms_its_own_chunk() {
        let chunks = chunk_texts("Sentence one. Sentence two. Sentence three.", 13, LengthUnit::Chars);
        assert_eq!(chunks, vec!["Sentence one.", "Sentence two.", "Sentence three."]);
    }

    #[test]
    fn test_short_sentences_are_packed() {
        let chunks = chunk_texts("One. Two. Three. Four.", 30, LengthUnit::Chars);
        assert_eq!(chunks, vec!["One. Two. Three. Four."]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(Chunker::default().chunk("").is_empty());
        assert!(Chunker::default().chunk("   ").is_empty());
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let chunks = chunk_texts("Mr. Smith went home. He slept.", 20, LengthUnit::Chars);
        assert_eq!(chunks, vec!["Mr. Smith went home.", "He slept."]);
    }

    #[test]
    fn test_numbered_abbreviations_split_only_before_words() {
        let chunks = chunk_texts("He said no. Then he left the room.", 20, LengthUnit::Chars);
        assert_eq!(chunks, vec!["He said no.", "Then he left the room."]);

        let chunks = chunk_texts("See Fig. 3 and Vol. 2 for more. Done now.", 31, LengthUnit::Chars);
        assert_eq!(chunks, vec!["See Fig. 3 and Vol. 2 for more.", "Done now."]);

        let sentences = split_sentences("Turn to ch. 12 now. It has no. Really.");
        assert_eq!(sentences.len(), 3);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        let chunks = chunk_texts("He said \"go.\" Then he left.", 14, LengthUnit::Chars);
        assert_eq!(chunks, vec!["He said \"go.\"", "Then he left."]);
    }

    #[test]
    fn test_long_sentence_falls_back_to_clauses() {
        let chunks = chunk_texts("First clause here, second clause here, third one.", 20, LengthUnit::Chars);
        assert_eq!(chunks, vec!["First clause here,", "second clause here,", "third one."]);
    }

    #[test]
    fn test_unterminated_text_falls_back_to_words() {
        let chunks = chunk_texts("alpha beta gamma delta epsilon", 11, LengthUnit::Chars);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta", "epsilon"]);
    }

    #[test]
    fn test_word_bound() {
        let chunks = chunk_texts("a b c d. e f.", 3, LengthUnit::Words);
        assert_eq!(chunks, vec!["a b c d.", "e f."]);
    }

    #[test]
    fn test_chunks_reconstruct_text() {
        for max_len in [1, 5, 13, 40, 80, 200, 10_000] {
            let chunks = Chunker::new(ChunkerConfig { max_len, unit: LengthUnit::Chars }).chunk(PASSAGE);
            let joined = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(" ");
            assert_eq!(joined, PASSAGE, "max_len = {}", max_len);
        }
    }

    #[test]
    fn test_chunk_indices_and_spans_are_consistent() {
        let chunks = Chunker::new(ChunkerConfig { max_len: 40, unit: LengthUnit::Chars }).chunk(PASSAGE);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&PASSAGE[chunk.span.clone()], chunk.text);
        }
        assert!(chunks.windows(2).all(|w| w[0].span.end < w[1].span.start));
    }

    #[test]
    fn test_oversized_chunks_hold_a_single_unit() {
        let max_len = 30;
        let chunks = Chunker::new(ChunkerConfig { max_len, unit: LengthUnit::Chars }).chunk(PASSAGE);
        for chunk in chunks.iter().filter(|c| c.len_in(LengthUnit::Chars) > max_len) {
            assert_eq!(split_sentences(&chunk.text).len(), 1, "oversized chunk spans sentences: {:?}", chunk.text);
            assert_eq!(split_clauses(&chunk.text, 0..chunk.text.len()).len(), 1, "oversized chunk spans clauses: {:?}", chunk.text);
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = Chunker::new(ChunkerConfig { max_len: 60, unit: LengthUnit::Chars });
        assert_eq!(chunker.chunk(PASSAGE), chunker.chunk(PASSAGE));
    }
}
