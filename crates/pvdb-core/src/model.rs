//! Core record types: sources, songs, and run diagnostics

use crate::config::LoadOrder;
use crate::scanner::DiscoveredMod;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a source's entries come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// The base game catalog (always wins conflicts)
    Base,
    /// One mod directory
    Mod,
}

/// One origin database: the base game or a single mod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Identifying name (mod directory name, or "base")
    pub name: String,
    /// Base game or mod
    pub kind: SourceKind,
    /// Priority rank; lower rank is kept preferentially, base is rank 0
    pub priority: u32,
    /// Excluded entirely from scanning
    pub ignored: bool,
    /// Scanned and conflict-detected, but never auto-mutated
    pub exempt: bool,
    /// Path to this source's pv_db file
    pub pvdb_path: PathBuf,
}

/// Index of a source within its registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub usize);

/// Immutable per-run registry of every discovered source
///
/// Built once per run and passed by reference into every downstream
/// component; iteration order is priority order (base first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Build a registry from the base catalog and the discovered mods
    ///
    /// Mods are ordered by (priority rank, name) after the base source, so
    /// that walking the registry visits sources in precedence order.
    pub fn build(
        base_pvdb: Option<PathBuf>,
        mods: &[DiscoveredMod],
        order: &LoadOrder,
    ) -> Self {
        let mut sources = Vec::new();

        if let Some(path) = base_pvdb {
            sources.push(Source {
                name: "base".to_string(),
                kind: SourceKind::Base,
                priority: 0,
                ignored: false,
                exempt: false,
                pvdb_path: path,
            });
        }

        let mut mod_sources: Vec<Source> = mods
            .iter()
            .map(|m| Source {
                name: m.name.clone(),
                kind: SourceKind::Mod,
                priority: order.rank(&m.name),
                ignored: order.is_ignored(&m.name),
                exempt: order.is_exempt(&m.name),
                pvdb_path: m.pvdb_path.clone(),
            })
            .collect();
        mod_sources.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        sources.extend(mod_sources);

        Self { sources }
    }

    /// Look up a source by id
    pub fn get(&self, id: SourceId) -> &Source {
        &self.sources[id.0]
    }

    /// Find a source id by name
    pub fn find(&self, name: &str) -> Option<SourceId> {
        self.sources.iter().position(|s| s.name == name).map(SourceId)
    }

    /// All sources in priority order, with their ids
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &Source)> {
        self.sources.iter().enumerate().map(|(i, s)| (SourceId(i), s))
    }

    /// Sources that participate in scanning (non-ignored), in priority order
    pub fn active(&self) -> impl Iterator<Item = (SourceId, &Source)> {
        self.iter().filter(|(_, s)| !s.ignored)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True if the registry holds no sources
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// File position of a parsed entry: path plus the 1-based line numbers
/// the entry occupies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub path: PathBuf,
    pub lines: Vec<usize>,
}

impl Locator {
    /// First line of the entry (file order key for tie-breaking)
    pub fn first_line(&self) -> usize {
        self.lines.first().copied().unwrap_or(0)
    }
}

/// One parsed song entry, immutable after parsing
///
/// Mutation acts on the file through the locator, never on this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Numeric PV identifier
    pub pv_id: u32,
    /// Primary title (may be empty when only a secondary title exists)
    pub title: String,
    /// Secondary (alternate-language) title
    pub title_en: Option<String>,
    /// Owning source
    pub source: SourceId,
    /// Where the entry's lines live on disk
    pub locator: Locator,
}

impl Song {
    /// Title preferred for display: primary, else secondary
    pub fn display_title(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else {
            self.title_en.as_deref().unwrap_or("")
        }
    }

    /// Title used for normalized matching: secondary when present, else primary
    ///
    /// Returns None when neither field resolves to a non-empty string; such
    /// songs are excluded from title conflict detection only.
    pub fn matching_title(&self) -> Option<&str> {
        match self.title_en.as_deref() {
            Some(en) if !en.is_empty() => Some(en),
            _ if !self.title.is_empty() => Some(&self.title),
            _ => None,
        }
    }
}

/// Classification of a non-fatal problem found during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// An entry that could not be parsed and was skipped
    MalformedEntry,
    /// Two entries from the same source collided on a key (later kept)
    SelfConflict,
    /// A source's file could not be read; the source was dropped
    SourceDropped,
}

/// A non-fatal problem attached to the source and file it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source: String,
    pub path: PathBuf,
    pub line: Option<usize>,
    pub message: String,
}
