//! Catalog builder: merges per-source song sequences into conflict indexes
//!
//! Parsing may happen per source in any order, but this merge step is the
//! single serialization point; indexes are BTreeMaps so every downstream
//! walk is deterministic.

use crate::error::Error;
use crate::model::{Diagnostic, DiagnosticKind, SourceId, SourceRegistry, Song};
use crate::normalize::{NormalizePolicy, NormalizedTitle};
use crate::parser::{parse_pvdb, ParseOutcome, SuppressedEntry};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Merged view of every live song across all non-ignored sources
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    /// Every live song, sources in priority order, file order within a source
    pub songs: Vec<Song>,
    /// Identifier index: PV id to songs sharing it
    pub by_id: BTreeMap<u32, Vec<Song>>,
    /// Title index: normalized title to songs sharing it
    pub by_title: BTreeMap<NormalizedTitle, Vec<Song>>,
    /// Entries already suppressed by a prior run
    pub suppressed: Vec<SuppressedEntry>,
    /// Non-fatal problems collected across the whole build
    pub diagnostics: Vec<Diagnostic>,
}

impl Catalog {
    /// Number of live songs contributed by one source
    pub fn count_for(&self, source: SourceId) -> usize {
        self.songs.iter().filter(|s| s.source == source).count()
    }
}

/// Parse every active source and merge the results
///
/// A source whose file cannot be read is dropped from the run with a
/// diagnostic; all other sources continue.
pub fn build_catalog(registry: &SourceRegistry, policy: &NormalizePolicy) -> Catalog {
    let mut outcomes = Vec::new();
    let mut diagnostics = Vec::new();

    for (id, source) in registry.active() {
        match parse_pvdb(id, source) {
            Ok(outcome) => outcomes.push((id, outcome)),
            Err(err) => {
                warn!(source = %source.name, "source dropped: {}", err);
                let io_message = match &err {
                    Error::SourceRead { source: io, .. } => io.to_string(),
                    other => other.to_string(),
                };
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::SourceDropped,
                    source: source.name.clone(),
                    path: source.pvdb_path.clone(),
                    line: None,
                    message: io_message,
                });
            }
        }
    }

    let mut catalog = build_catalog_from_outcomes(registry, policy, outcomes);
    diagnostics.append(&mut catalog.diagnostics);
    catalog.diagnostics = diagnostics;
    info!(
        songs = catalog.songs.len(),
        diagnostics = catalog.diagnostics.len(),
        "catalog built"
    );
    catalog
}

/// Merge already-parsed outcomes into a catalog (useful for testing)
///
/// Outcomes must be supplied in registry priority order, base first; the
/// index lists then inherit that order by construction.
pub fn build_catalog_from_outcomes(
    registry: &SourceRegistry,
    policy: &NormalizePolicy,
    outcomes: Vec<(SourceId, ParseOutcome)>,
) -> Catalog {
    let mut catalog = Catalog::default();

    for (id, outcome) in outcomes {
        let source_name = &registry.get(id).name;
        catalog.diagnostics.extend(outcome.diagnostics);
        catalog.suppressed.extend(outcome.suppressed);

        for song in outcome.songs {
            insert_indexed(
                catalog.by_id.entry(song.pv_id).or_default(),
                song.clone(),
                source_name,
                &mut catalog.diagnostics,
                "PV id",
            );
            if let Some(key) = policy.song_key(&song) {
                insert_indexed(
                    catalog.by_title.entry(key).or_default(),
                    song.clone(),
                    source_name,
                    &mut catalog.diagnostics,
                    "normalized title",
                );
            }
            catalog.songs.push(song);
        }
    }

    catalog
}

/// Push a song into an index list, replacing any earlier entry from the
/// same source (logged, never surfaced as a conflict group)
fn insert_indexed(
    list: &mut Vec<Song>,
    song: Song,
    source_name: &str,
    diagnostics: &mut Vec<Diagnostic>,
    key_kind: &str,
) {
    if let Some(pos) = list.iter().position(|s| s.source == song.source) {
        diagnostics.push(Diagnostic {
            kind: DiagnosticKind::SelfConflict,
            source: source_name.to_string(),
            path: song.locator.path.clone(),
            line: Some(song.locator.first_line()),
            message: format!(
                "duplicate {} within source (pv_{}), keeping the later entry",
                key_kind, song.pv_id
            ),
        });
        list[pos] = song;
    } else {
        list.push(song);
    }
}
