//! Loading a file into removable tokens at a chosen granularity.
//!
//! # Overview
//!
//! A [`LoadedFile`] is one on-disk file split into three pieces:
//!
//! - a fixed **prefix** (bytes the reduction may never touch),
//! - a sequence of **tokens**, each either removable or fixed,
//! - a fixed **suffix**.
//!
//! When the content carries a reduction-boundary marker pair (a line
//! containing [`MARKER_BEGIN`] followed later by a line containing
//! [`MARKER_END`]), only the region between the two marker lines is
//! tokenized; the marker lines themselves and everything outside them become
//! the fixed prefix/suffix. Without a matched pair the whole file is
//! tokenized.
//!
//! # Round-trip invariant
//!
//! `serialize()` of a freshly loaded file reproduces the original bytes
//! exactly, at every granularity. Reduction only ever drops removable
//! tokens, so a file whose every candidate was rejected commits back
//! byte-identical.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Opening reduction-boundary marker. A line containing this substring
/// starts the reducible region.
pub const MARKER_BEGIN: &[u8] = b"DDBEGIN";

/// Closing reduction-boundary marker. The first line containing this
/// substring after the opening marker ends the reducible region.
pub const MARKER_END: &[u8] = b"DDEND";

// Quoted string literals, single or double quoted, with backslash escapes.
static QUOTED_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?s:\\.|[^"\\])*"|'(?s:\\.|[^'\\])*'"#).expect("invalid regex")
});

/// The unit a file is split into for reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Every byte in the reducible region is one removable token.
    Bytes,
    /// Every newline-inclusive line is one removable token.
    Lines,
    /// Bytes inside quoted string literals are removable (escape sequences
    /// as single tokens); everything else is fixed.
    JsStrings,
}

impl Granularity {
    /// Plural unit name for log and description lines.
    pub fn unit(self) -> &'static str {
        match self {
            Granularity::Bytes => "bytes",
            Granularity::Lines => "lines",
            Granularity::JsStrings => "string tokens",
        }
    }
}

/// One contiguous slice of file content. Fixed tokens survive every
/// candidate; removable tokens are what the reduction search drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) data: Vec<u8>,
    pub(crate) removable: bool,
}

impl Token {
    fn fixed(data: Vec<u8>) -> Self {
        Token {
            data,
            removable: false,
        }
    }

    fn removable(data: Vec<u8>) -> Self {
        Token {
            data,
            removable: true,
        }
    }
}

/// A file loaded for reduction: fixed prefix, token sequence, fixed suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    path: PathBuf,
    granularity: Granularity,
    prefix: Vec<u8>,
    tokens: Vec<Token>,
    suffix: Vec<u8>,
}

impl LoadedFile {
    /// Load `path` and tokenize it at `granularity`.
    pub fn load(path: &Path, granularity: Granularity) -> io::Result<Self> {
        let content = fs::read(path)?;
        let file = Self::from_bytes(path, granularity, &content);
        tracing::debug!(
            path = %path.display(),
            tokens = file.len(),
            unit = granularity.unit(),
            "loaded file for reduction"
        );
        Ok(file)
    }

    /// Tokenize in-memory content. `path` is retained as the write-back
    /// target but is not touched here.
    pub fn from_bytes(path: &Path, granularity: Granularity, content: &[u8]) -> Self {
        let (prefix, region, suffix) = split_marker_region(content);
        let tokens = match granularity {
            Granularity::Bytes => tokenize_bytes(region),
            Granularity::Lines => tokenize_lines(region),
            Granularity::JsStrings => tokenize_js_strings(region),
        };
        LoadedFile {
            path: path.to_path_buf(),
            granularity,
            prefix: prefix.to_vec(),
            tokens,
            suffix: suffix.to_vec(),
        }
    }

    /// Number of removable tokens. This is the "length" every chunk
    /// calculation and progress estimate works in.
    pub fn len(&self) -> usize {
        self.tokens.iter().filter(|t| t.removable).count()
    }

    /// True when nothing is removable.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Concatenate prefix, surviving tokens, and suffix.
    pub fn serialize(&self) -> Vec<u8> {
        let total = self.prefix.len()
            + self.tokens.iter().map(|t| t.data.len()).sum::<usize>()
            + self.suffix.len();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&self.prefix);
        for token in &self.tokens {
            out.extend_from_slice(&token.data);
        }
        out.extend_from_slice(&self.suffix);
        out
    }

    /// BLAKE3 fingerprint of the serialized content.
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.serialize())
    }

    /// Write the serialized content back to the file's path.
    pub fn write(&self) -> io::Result<()> {
        fs::write(&self.path, self.serialize())
    }

    /// A copy with removable tokens `start..end` (indices counted over
    /// removable tokens only) dropped. Fixed tokens are unaffected.
    pub(crate) fn without_removable_range(&self, start: usize, end: usize) -> LoadedFile {
        let mut removable_idx = 0;
        let tokens = self
            .tokens
            .iter()
            .filter(|token| {
                if !token.removable {
                    return true;
                }
                let idx = removable_idx;
                removable_idx += 1;
                !(start..end).contains(&idx)
            })
            .cloned()
            .collect();
        LoadedFile {
            path: self.path.clone(),
            granularity: self.granularity,
            prefix: self.prefix.clone(),
            tokens,
            suffix: self.suffix.clone(),
        }
    }

    pub(crate) fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub(crate) fn with_tokens(&self, tokens: Vec<Token>) -> LoadedFile {
        LoadedFile {
            path: self.path.clone(),
            granularity: self.granularity,
            prefix: self.prefix.clone(),
            tokens,
            suffix: self.suffix.clone(),
        }
    }
}

/// BLAKE3 digest of raw content as lowercase hex.
pub fn content_fingerprint(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

// ---------------------------------------------------------------------------
// Tokenizers
// ---------------------------------------------------------------------------

/// True when the content holds a matched reduction-boundary marker pair: a
/// line containing [`MARKER_BEGIN`] followed on a later line by
/// [`MARKER_END`].
pub fn contains_marker_pair(content: &[u8]) -> bool {
    find_marker_region(content).is_some()
}

/// Byte range of the reducible region between a matched marker pair:
/// `(just past the MARKER_BEGIN line, start of the MARKER_END line)`.
fn find_marker_region(content: &[u8]) -> Option<(usize, usize)> {
    let mut begin_end = None; // byte offset just past the MARKER_BEGIN line
    let mut offset = 0;
    for line in split_lines(content) {
        let line_end = offset + line.len();
        if begin_end.is_none() {
            if find_subslice(line, MARKER_BEGIN).is_some() {
                begin_end = Some(line_end);
            }
        } else if find_subslice(line, MARKER_END).is_some() {
            return begin_end.map(|begin| (begin, offset));
        }
        offset = line_end;
    }
    None
}

/// Split content into (prefix, reducible region, suffix) around a matched
/// marker pair. Without a pair the whole content is the region.
fn split_marker_region(content: &[u8]) -> (&[u8], &[u8], &[u8]) {
    match find_marker_region(content) {
        Some((begin, end)) => (&content[..begin], &content[begin..end], &content[end..]),
        None => (&content[..0], content, &content[content.len()..]),
    }
}

fn tokenize_bytes(region: &[u8]) -> Vec<Token> {
    region.iter().map(|&b| Token::removable(vec![b])).collect()
}

fn tokenize_lines(region: &[u8]) -> Vec<Token> {
    split_lines(region)
        .map(|line| Token::removable(line.to_vec()))
        .collect()
}

fn tokenize_js_strings(region: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in QUOTED_STRING.find_iter(region) {
        // Everything up to and including the opening quote is fixed.
        tokens.push(Token::fixed(region[last..m.start() + 1].to_vec()));
        let inner = &region[m.start() + 1..m.end() - 1];
        let mut i = 0;
        while i < inner.len() {
            // An escape sequence reduces as a single token.
            let width = if inner[i] == b'\\' && i + 1 < inner.len() {
                2
            } else {
                1
            };
            tokens.push(Token::removable(inner[i..i + width].to_vec()));
            i += width;
        }
        // Closing quote stays fixed.
        tokens.push(Token::fixed(region[m.end() - 1..m.end()].to_vec()));
        last = m.end();
    }
    if last < region.len() {
        tokens.push(Token::fixed(region[last..].to_vec()));
    }
    tokens
}

/// Iterate newline-inclusive lines; a final unterminated line is yielded
/// as-is.
fn split_lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content.split_inclusive(|&b| b == b'\n')
}

/// First occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
