// src/filter.rs

//! Tag filters
//!
//! A filter expression is a whitespace-separated list of terms evaluated
//! against the tag ids a database assigns to its files and folders. A `!`
//! prefix excludes; plain terms include. Terms resolve through the
//! database's `tag_dictionary`; terms that resolve nowhere are collected so
//! the run summary can point out likely misspellings.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A filter compiled against one database's tag dictionary
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    positive: Vec<u32>,
    negative: Vec<u32>,
    /// Terms that resolved through the dictionary
    pub resolved_terms: Vec<String>,
    /// Terms the dictionary does not know; they match nothing
    pub unknown_terms: Vec<String>,
}

impl FileFilter {
    /// Compile `expression` against `tag_dictionary`.
    ///
    /// `None` compiles to a pass-everything filter. A blank expression or a
    /// term with characters outside `[a-z0-9_-]` is a fatal
    /// [`Error::BadFileFilter`] for the owning database.
    pub fn compile(
        expression: Option<&str>,
        tag_dictionary: Option<&BTreeMap<String, u32>>,
    ) -> Result<Self> {
        let Some(expression) = expression else {
            return Ok(Self::default());
        };

        if expression.trim().is_empty() {
            return Err(Error::BadFileFilter(
                "filter expression is empty".to_string(),
            ));
        }

        let mut filter = Self::default();
        for raw_term in expression.split_whitespace() {
            let (negated, term) = match raw_term.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw_term),
            };

            let normalized = normalize_term(term)?;
            match tag_dictionary.and_then(|dict| lookup_tag(dict, &normalized)) {
                Some(tag) => {
                    filter.resolved_terms.push(normalized);
                    if negated {
                        filter.negative.push(tag);
                    } else {
                        filter.positive.push(tag);
                    }
                }
                None => filter.unknown_terms.push(normalized),
            }
        }

        Ok(filter)
    }

    /// True when the filter imposes no restriction
    pub fn is_pass_through(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }

    /// Whether an entry with these tags should be installed
    pub fn allows(&self, tags: Option<&[u32]>) -> bool {
        let tags = tags.unwrap_or(&[]);

        if self.negative.iter().any(|tag| tags.contains(tag)) {
            return false;
        }
        if !self.positive.is_empty() && !self.positive.iter().any(|tag| tags.contains(tag)) {
            return false;
        }
        true
    }
}

fn normalize_term(term: &str) -> Result<String> {
    let normalized = term.to_lowercase().replace('-', "_");
    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(Error::BadFileFilter(format!("bad filter term '{term}'")));
    }
    Ok(normalized)
}

fn lookup_tag(dictionary: &BTreeMap<String, u32>, term: &str) -> Option<u32> {
    dictionary
        .iter()
        .find(|(name, _)| normalize_term(name).ok().as_deref() == Some(term))
        .map(|(_, tag)| *tag)
}
