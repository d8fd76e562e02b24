//! Shell-glob (fnmatch) patterns for file-name and full-path filters.
//!
//! Unlike path-aware globbing, `*` here matches any run of characters
//! including `/`, so `*/cache/*` matches a full path at any depth.

#![allow(missing_docs)]

use std::path::Path;

use regex::Regex;

use crate::core::errors::{BalanceError, Result};

/// The pattern that admits everything; used when no includes are configured.
pub const MATCH_ALL: &str = "*";

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    compiled: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            compiled: glob_to_regex(pattern)?,
        })
    }

    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }
}

/// An ordered list of globs matched with "any" semantics.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<GlobPattern>,
}

impl PatternSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| GlobPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Compile `patterns`, substituting [`MATCH_ALL`] when the list is empty.
    pub fn compile_or_all<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            Self::compile(&[MATCH_ALL])
        } else {
            Self::compile(patterns)
        }
    }

    #[must_use]
    pub fn matches_any(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Include/exclude pair: admitted iff some include matches and no exclude does.
#[derive(Debug, Clone)]
pub struct IncludeExclude {
    pub include: PatternSet,
    pub exclude: PatternSet,
}

impl IncludeExclude {
    pub fn compile<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: PatternSet::compile_or_all(include)?,
            exclude: PatternSet::compile(exclude)?,
        })
    }

    #[must_use]
    pub fn admits(&self, text: &str) -> bool {
        self.include.matches_any(text) && !self.exclude.matches_any(text)
    }
}

/// Validate that a glob pattern can be compiled.
pub fn validate_glob_pattern(pattern: &str) -> Result<()> {
    glob_to_regex(pattern).map(|_| ())
}

/// Text used when matching a path: lossy UTF-8, so undecodable bytes become
/// U+FFFD and still satisfy `*` and `?`.
#[must_use]
pub fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Convert an fnmatch-style glob into an anchored regex.
///
/// - `*`  → any run of characters, `/` included
/// - `?`  → exactly one character
/// - `[…]` → character class; `[!…]` negates; a leading `]` is literal
/// - an unterminated `[` is a literal bracket
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex_str = String::with_capacity(pattern.len() * 2 + 8);
    regex_str.push_str(r"(?s)\A");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                // Collapse runs of `*`; they are equivalent.
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                regex_str.push_str(".*");
            }
            '?' => {
                regex_str.push('.');
                i += 1;
            }
            '[' => match parse_class(&chars, i) {
                Some((class, next)) => {
                    regex_str.push_str(&class);
                    i = next;
                }
                None => {
                    regex_str.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                regex_str.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                i += 1;
            }
        }
    }

    regex_str.push_str(r"\z");

    Regex::new(&regex_str).map_err(|err| BalanceError::InvalidPattern {
        pattern: pattern.to_string(),
        details: err.to_string(),
    })
}

/// Translate the class starting at `chars[start] == '['`. Returns the regex
/// class and the index just past the closing `]`, or `None` if unterminated.
fn parse_class(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut j = start + 1;
    let negated = chars.get(j) == Some(&'!');
    if negated {
        j += 1;
    }
    // A `]` in first position is a literal member.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    if j >= chars.len() {
        return None;
    }

    let body_start = start + 1 + usize::from(negated);
    let mut class = String::from("[");
    if negated {
        class.push('^');
    }
    for &c in &chars[body_start..j] {
        match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => {
                class.push('\\');
                class.push(c);
            }
            c => class.push(c),
        }
    }
    class.push(']');
    Some((class, j + 1))
}
