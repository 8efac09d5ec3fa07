//! Core data model for the resolution engine.

use serde::{Deserialize, Serialize};

/// Unlock code shared by every shared-session release. A well-known
/// constant on the upstream, never fetched.
pub const UNLOCK_CODE: &str = "online-fix.me";

/// One catalog search result awaiting possible disambiguation.
///
/// Immutable once constructed; `detail_url` is the opaque reference used
/// for follow-up resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub raw_title: String,
    pub detail_url: String,
    /// Best-effort thumbnail from the search page. Unused by the core logic.
    pub thumbnail: Option<String>,
}

/// Derived split of a mixed-script catalog title. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTitle {
    /// Latin-script search keyword, numerals normalized to digits.
    pub keyword: String,
    /// Native-script display name; falls back to the raw title's first
    /// segment when no native-script segment exists.
    pub display_name: String,
}

/// One line of the standalone (single-instance) detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandaloneLine {
    /// Archive password for the download.
    Password(String),
    /// Pan extract code.
    ExtractCode(String),
    /// A named download link.
    Link { label: String, url: String },
    /// Free-form note (including the branch-level "not found" line).
    Note(String),
}

/// One resolved shared-session release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopItem {
    pub title: String,
    /// Always [`UNLOCK_CODE`]; carried per item so the dispatched message
    /// is self-contained.
    pub unlock_code: String,
    /// Normalized `YYYY-MM-DD HH:MM`, or the failure reason when degraded.
    pub updated: String,
    pub resource_link: Option<String>,
    /// True when the fallback path supplied the link instead of a verified
    /// upstream fetch.
    pub degraded: bool,
}

/// Aggregated two-branch resolution result.
///
/// A bundle may have empty sub-sequences; it is a total failure only when
/// both are empty. Once both branches complete or are declared exhausted
/// the bundle is always delivered — partial results are never discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBundle {
    pub display_name: String,
    pub keyword: String,
    pub standalone: Vec<StandaloneLine>,
    pub coop: Vec<CoopItem>,
}

impl ResourceBundle {
    /// True when the standalone branch produced something beyond notes
    /// (a "not found" note alone is not content).
    pub fn has_standalone_content(&self) -> bool {
        self.standalone
            .iter()
            .any(|line| !matches!(line, StandaloneLine::Note(_)))
    }

    /// Total failure: neither branch produced anything deliverable.
    pub fn is_empty(&self) -> bool {
        !self.has_standalone_content() && self.coop.is_empty()
    }
}
