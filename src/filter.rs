use crate::log_store::LogStore;
use crate::types::{LogEntry, LogLevel};
use log::warn;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub levels: BTreeSet<LogLevel>,
    pub keyword: String,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            levels: LogLevel::ALL.into_iter().collect(),
            keyword: String::new(),
        }
    }
}

impl FilterCriteria {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.levels.contains(&entry.level()) && keyword_matches(entry.message(), &self.keyword)
    }
}

/// Case-insensitive literal substring test. An empty keyword matches everything.
pub fn keyword_matches(message: &str, keyword: &str) -> bool {
    keyword.is_empty() || message.to_lowercase().contains(&keyword.to_lowercase())
}

/// The visible subsequence of the log store, in store order.
#[derive(Debug)]
pub struct FilteredView<'a> {
    pub entries: Vec<&'a LogEntry>,
    pub total: usize,
    pub criteria: &'a FilterCriteria,
}

impl FilteredView<'_> {
    pub fn visible(&self) -> usize {
        self.entries.len()
    }
}

pub fn apply<'a>(store: &'a LogStore, criteria: &'a FilterCriteria) -> FilteredView<'a> {
    let entries = store.iter().filter(|entry| criteria.matches(entry)).collect();

    FilteredView {
        entries,
        total: store.len(),
        criteria,
    }
}

/// Marks literal, case-insensitive occurrences of a keyword.
pub struct Highlighter {
    pattern: Regex,
}

impl Highlighter {
    /// Returns `None` for an empty keyword.
    pub fn new(keyword: &str) -> Option<Self> {
        if keyword.is_empty() {
            return None;
        }

        match RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()
        {
            Ok(pattern) => Some(Self { pattern }),
            Err(e) => {
                warn!("Cannot highlight keyword {:?}: {}", keyword, e);
                None
            }
        }
    }

    pub fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        self.pattern
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}

pub fn highlight_numbers(text: &str, mark: impl Fn(&str) -> String) -> String {
    NUMBER_PATTERN
        .replace_all(text, |caps: &regex::Captures| mark(&caps[1]))
        .into_owned()
}
