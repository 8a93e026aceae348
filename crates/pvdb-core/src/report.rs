//! Report rendering: flatten run results into CSV or JSON
//!
//! The core exposes three result sets (all songs, ID conflict groups,
//! title conflict groups); this module turns them into rows a
//! spreadsheet or script can consume.

use crate::catalog::Catalog;
use crate::conflict::ConflictKey;
use crate::error::Result;
use crate::model::{Diagnostic, SourceRegistry, Song};
use crate::planner::{ResolvedConflict, Verdict};
use serde::Serialize;
use std::path::Path;

/// One row per live song
#[derive(Debug, Clone, Serialize)]
pub struct SongRow {
    pub source: String,
    pub pv_id: u32,
    pub title: String,
    pub title_en: Option<String>,
    pub path: String,
    pub line: usize,
}

/// One row per conflict group member
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRow {
    pub key: String,
    pub verdict: Verdict,
    pub source: String,
    pub pv_id: u32,
    pub title: String,
    pub title_en: Option<String>,
    pub path: String,
    pub line: usize,
}

/// Flattened result sets of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub songs: Vec<SongRow>,
    pub id_conflicts: Vec<ConflictRow>,
    pub title_conflicts: Vec<ConflictRow>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Flatten catalog and resolved conflicts into report rows
pub fn build_report(
    registry: &SourceRegistry,
    catalog: &Catalog,
    resolved: &[ResolvedConflict],
) -> RunReport {
    let songs = catalog
        .songs
        .iter()
        .map(|song| SongRow {
            source: registry.get(song.source).name.clone(),
            pv_id: song.pv_id,
            title: song.title.clone(),
            title_en: song.title_en.clone(),
            path: song.locator.path.display().to_string(),
            line: song.locator.first_line(),
        })
        .collect();

    let mut id_conflicts = Vec::new();
    let mut title_conflicts = Vec::new();
    for conflict in resolved {
        let rows = match &conflict.key {
            ConflictKey::Id(_) => &mut id_conflicts,
            ConflictKey::Title(_) => &mut title_conflicts,
        };
        rows.push(conflict_row(registry, conflict, &conflict.winner, Verdict::Keep));
        for loser in &conflict.losers {
            rows.push(conflict_row(registry, conflict, loser, Verdict::Suppress));
        }
    }

    RunReport {
        songs,
        id_conflicts,
        title_conflicts,
        diagnostics: catalog.diagnostics.clone(),
    }
}

fn conflict_row(
    registry: &SourceRegistry,
    conflict: &ResolvedConflict,
    song: &Song,
    verdict: Verdict,
) -> ConflictRow {
    ConflictRow {
        key: conflict.key.to_string(),
        verdict,
        source: registry.get(song.source).name.clone(),
        pv_id: song.pv_id,
        title: song.title.clone(),
        title_en: song.title_en.clone(),
        path: song.locator.path.display().to_string(),
        line: song.locator.first_line(),
    }
}

/// Write the report as three CSV files (songs, id_conflicts,
/// title_conflicts) under a directory
pub fn write_csv_report<P: AsRef<Path>>(report: &RunReport, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut songs = csv::Writer::from_path(dir.join("songs.csv"))?;
    for row in &report.songs {
        songs.serialize(row)?;
    }
    songs.flush()?;

    let mut ids = csv::Writer::from_path(dir.join("id_conflicts.csv"))?;
    for row in &report.id_conflicts {
        ids.serialize(row)?;
    }
    ids.flush()?;

    let mut titles = csv::Writer::from_path(dir.join("title_conflicts.csv"))?;
    for row in &report.title_conflicts {
        titles.serialize(row)?;
    }
    titles.flush()?;

    Ok(())
}

/// Write the whole report as one pretty-printed JSON document
pub fn write_json_report<P: AsRef<Path>>(report: &RunReport, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}
