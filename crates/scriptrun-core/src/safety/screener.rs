//! Aho-Corasick based denylist screen for script text.

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::ScreenConfig;
use crate::error::ConfigError;

/// Outcome of screening one script. Computed once, before any process exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskVerdict {
    /// Whether execution may proceed.
    pub allowed: bool,

    /// Denylist entry that caused the rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,

    /// Human-readable rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RiskVerdict {
    /// Verdict for a script that matched nothing.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            matched_pattern: None,
            message: None,
        }
    }

    /// Verdict for a script containing a denylisted pattern.
    pub fn reject(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self {
            allowed: false,
            message: Some(format!("Dangerous code detected: {}", pattern)),
            matched_pattern: Some(pattern),
        }
    }

    /// Verdict for a script that could not be read. Never fails open.
    pub fn unreadable(error: impl std::fmt::Display) -> Self {
        Self {
            allowed: false,
            matched_pattern: None,
            message: Some(format!("Error reading file: {}", error)),
        }
    }
}

/// Case-insensitive multi-pattern screen over a fixed, ordered denylist.
///
/// When several patterns occur, the one listed first in the denylist is
/// reported, regardless of where each occurs in the text.
pub struct Screener {
    /// Automaton over the lowercased denylist, `None` when the screen is off
    /// or the list is empty.
    automaton: Option<AhoCorasick>,
    /// Original spelling of each pattern, indexed like the automaton.
    patterns: Vec<String>,
}

impl Screener {
    /// Build a screen from an ordered denylist.
    pub fn new<I, S>(denylist: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = denylist.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            return Ok(Self::disabled());
        }

        let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();
        let automaton = AhoCorasick::new(&lowered)
            .map_err(|e| ConfigError::Validation(format!("Invalid denylist: {}", e)))?;

        Ok(Self {
            automaton: Some(automaton),
            patterns,
        })
    }

    /// Build a screen from configuration.
    pub fn from_config(config: &ScreenConfig) -> Result<Self, ConfigError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Self::new(config.denylist.iter().cloned())
    }

    /// A screen that allows everything.
    pub fn disabled() -> Self {
        Self {
            automaton: None,
            patterns: Vec::new(),
        }
    }

    /// Screen script text.
    pub fn screen(&self, text: &str) -> RiskVerdict {
        let Some(automaton) = &self.automaton else {
            return RiskVerdict::allow();
        };

        let haystack = text.to_lowercase();
        let first = automaton
            .find_overlapping_iter(&haystack)
            .map(|m| m.pattern().as_usize())
            .min();

        match first {
            Some(index) => RiskVerdict::reject(self.patterns[index].clone()),
            None => RiskVerdict::allow(),
        }
    }

    /// Screen a script file. Read failures produce a disallowed verdict.
    pub fn screen_file(&self, path: &Path) -> RiskVerdict {
        match std::fs::read_to_string(path) {
            Ok(text) => self.screen(&text),
            Err(e) => RiskVerdict::unreadable(e),
        }
    }

    /// Ordered denylist this screen checks.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
