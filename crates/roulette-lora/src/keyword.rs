//! Keyword filtering of candidate files
//!
//! An expression is split into lower-cased tokens: `"quoted phrases"` stay
//! whole, everything else splits on whitespace. Tokens are substring-matched
//! against the file name, or the file name plus its metadata keyword text.

use crate::resolver::MetadataResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use roulette_core::{FilterMode, KeywordFilterSpec, LoraFile, Outcome, SearchScope, Warning};
use tracing::{debug, info};

static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|(\S+)"#).expect("token pattern is valid"));

/// Split an expression into lower-cased tokens
pub fn parse(expression: &str) -> Vec<String> {
    TOKEN_PATTERN
        .captures_iter(expression)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

/// A parsed keyword filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFilter {
    expression: String,
    tokens: Vec<String>,
    mode: FilterMode,
    scope: SearchScope,
}

impl KeywordFilter {
    /// Parse a filter expression
    pub fn new(expression: &str, mode: FilterMode, scope: SearchScope) -> Self {
        Self {
            expression: expression.trim().to_string(),
            tokens: parse(expression),
            mode,
            scope,
        }
    }

    /// Parse from request settings
    pub fn from_spec(spec: &KeywordFilterSpec) -> Self {
        Self::new(&spec.expression, spec.mode, spec.scope)
    }

    /// Parsed tokens
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether the filter passes everything
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether `text` satisfies the tokens under the filter mode
    ///
    /// `text` must already be lower-case.
    pub fn matches(&self, text: &str) -> bool {
        match self.mode {
            FilterMode::And => self.tokens.iter().all(|t| text.contains(t.as_str())),
            FilterMode::Or => self.tokens.iter().any(|t| text.contains(t.as_str())),
        }
    }

    /// Keep the files that match, preserving order
    ///
    /// Metadata scope resolves every file once through `resolver` and logs
    /// progress every `progress_interval` files.
    pub fn apply(
        &self,
        files: Vec<LoraFile>,
        resolver: &MetadataResolver,
        progress_interval: usize,
    ) -> Outcome<Vec<LoraFile>> {
        if self.is_empty() {
            return Outcome::clean(files);
        }

        let mut outcome = Outcome::clean(Vec::new());
        let total = files.len();

        match self.scope {
            SearchScope::Filename => {
                outcome.value = files
                    .into_iter()
                    .filter(|f| self.matches(&f.name().to_lowercase()))
                    .collect();
            }
            SearchScope::Metadata => {
                info!(count = total, "Searching metadata for keywords");
                for (index, file) in files.into_iter().enumerate() {
                    let keywords = resolver.keyword_text(&file).absorb(&mut outcome.warnings);
                    let text = format!("{} {}", file.name().to_lowercase(), keywords);
                    if self.matches(&text) {
                        outcome.value.push(file);
                    }
                    let done = index + 1;
                    if progress_interval > 0 && done % progress_interval == 0 {
                        info!(done, total, "Metadata search progress");
                    }
                }
                info!(matched = outcome.value.len(), total, "Metadata search complete");
            }
        }

        debug!(
            filter = %self.expression,
            tokens = ?self.tokens,
            matched = outcome.value.len(),
            total,
            "Applied keyword filter"
        );
        if outcome.value.is_empty() {
            outcome.warn(Warning::FilterEmptied(self.expression.clone()));
        }
        outcome
    }
}
