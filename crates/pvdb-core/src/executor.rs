//! Mutation executor: backup, comment-out apply, and restore
//!
//! Each target file moves through `unmodified -> backed-up -> mutated`.
//! Suppression never deletes content; every line of a losing entry is
//! prefixed with [`SUPPRESS_MARKER`] so the edit is auditable, idempotent,
//! and reversible from the backup.

use crate::error::{Error, Result};
use crate::model::SourceRegistry;
use crate::parser::SUPPRESS_MARKER;
use crate::planner::{MutationAction, MutationPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Manifest file name inside the backup root
pub const MANIFEST_FILE: &str = "backups.json";

/// One verbatim pre-mutation copy of a source's database file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub source: String,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BackupManifest {
    entries: BTreeMap<String, BackupEntry>,
}

/// On-disk backup store under a caller-supplied root, addressed by source
/// name and tracked in a JSON manifest
#[derive(Debug)]
pub struct BackupStore {
    root: PathBuf,
    manifest: BackupManifest,
}

impl BackupStore {
    /// Open (or create) the store at the given root
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            let content = fs::read_to_string(&manifest_path)?;
            serde_json::from_str(&content)?
        } else {
            BackupManifest::default()
        };

        Ok(Self { root, manifest })
    }

    /// True when a backup exists for the source
    pub fn has_backup(&self, source_name: &str) -> bool {
        self.manifest.entries.contains_key(source_name)
    }

    /// Names of every source with a backup, sorted
    pub fn sources(&self) -> Vec<String> {
        self.manifest.entries.keys().cloned().collect()
    }

    /// Copy a file verbatim into the store before its first mutation
    ///
    /// Idempotent: once a backup exists for the source, repeated calls are
    /// no-ops and the original copy is never overwritten.
    pub fn backup(&mut self, source_name: &str, original: &Path) -> Result<PathBuf> {
        if let Some(entry) = self.manifest.entries.get(source_name) {
            return Ok(entry.backup_path.clone());
        }

        let file_name = original
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("mod_pv_db.txt");
        let backup_path = self.root.join(format!("{}_{}.bak", source_name, file_name));
        fs::copy(original, &backup_path).map_err(|e| Error::Backup {
            path: original.to_path_buf(),
            message: e.to_string(),
        })?;

        info!(source = source_name, backup = %backup_path.display(), "backup created");
        self.manifest.entries.insert(
            source_name.to_string(),
            BackupEntry {
                source: source_name.to_string(),
                original_path: original.to_path_buf(),
                backup_path: backup_path.clone(),
                created: Utc::now(),
            },
        );
        self.save_manifest()?;
        Ok(backup_path)
    }

    /// Copy the backup back over the live file, overwriting any mutation
    ///
    /// The manifest entry and backup copy are consumed, so a later run
    /// rebuilds a fresh backup from the restored file.
    pub fn restore(&mut self, source_name: &str) -> Result<PathBuf> {
        let entry = self
            .manifest
            .entries
            .get(source_name)
            .ok_or_else(|| Error::RestoreMissing {
                source_name: source_name.to_string(),
            })?;

        fs::copy(&entry.backup_path, &entry.original_path).map_err(|e| Error::Restore {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        let entry = self
            .manifest
            .entries
            .remove(source_name)
            .expect("entry checked above");
        if let Err(e) = fs::remove_file(&entry.backup_path) {
            warn!(backup = %entry.backup_path.display(), "could not remove consumed backup: {}", e);
        }
        self.save_manifest()?;
        info!(source = source_name, target = %entry.original_path.display(), "backup restored");
        Ok(entry.original_path)
    }

    fn save_manifest(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

/// Per-file result of one apply pass
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub source: String,
    /// Entries whose lines were (or would be) newly marked
    pub entries_suppressed: usize,
    pub lines_marked: usize,
    pub lines_already_marked: usize,
    /// Actions skipped because the owning source is exempt
    pub exempt_skipped: usize,
    /// Failure that aborted this file only
    pub error: Option<String>,
}

/// Result of applying (or dry-running) a whole plan
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub dry_run: bool,
    pub files: Vec<FileOutcome>,
}

impl ApplyOutcome {
    /// True when no per-file failure occurred
    pub fn is_clean(&self) -> bool {
        self.files.iter().all(|f| f.error.is_none())
    }
}

/// Apply a mutation plan to disk, or simulate it
///
/// Dry-run computes the identical action set, in identical order, without
/// writing. A failure on one file aborts that file only; files already
/// mutated in the same run are left as-is (use restore to roll back).
pub fn apply_plan(
    plan: &MutationPlan,
    registry: &SourceRegistry,
    backups: &mut BackupStore,
    dry_run: bool,
) -> ApplyOutcome {
    let mut by_file: BTreeMap<PathBuf, Vec<&MutationAction>> = BTreeMap::new();
    for action in &plan.actions {
        by_file
            .entry(action.song.locator.path.clone())
            .or_default()
            .push(action);
    }

    let mut files = Vec::new();
    for (path, actions) in by_file {
        let source_name = registry.get(actions[0].song.source).name.clone();
        let exempt_skipped = actions.iter().filter(|a| a.exempt).count();
        let live: Vec<&MutationAction> = actions.iter().filter(|a| !a.exempt).copied().collect();

        let mut outcome = FileOutcome {
            path: path.clone(),
            source: source_name.clone(),
            entries_suppressed: live.len(),
            lines_marked: 0,
            lines_already_marked: 0,
            exempt_skipped,
            error: None,
        };

        let targets: BTreeSet<usize> = live
            .iter()
            .flat_map(|a| a.song.locator.lines.iter().copied())
            .collect();
        if targets.is_empty() {
            files.push(outcome);
            continue;
        }

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                outcome.error = Some(
                    Error::SourceRead {
                        name: source_name,
                        path: path.clone(),
                        source: e,
                    }
                    .to_string(),
                );
                files.push(outcome);
                continue;
            }
        };

        let (marked_content, marked, already) = mark_lines(&content, &targets);
        outcome.lines_marked = marked;
        outcome.lines_already_marked = already;

        if dry_run || marked == 0 {
            // Nothing to write: either simulating, or a re-run over an
            // already fully marked file.
            files.push(outcome);
            continue;
        }

        if let Err(e) = backups.backup(&source_name, &path) {
            outcome.error = Some(e.to_string());
            files.push(outcome);
            continue;
        }

        if let Err(e) = fs::write(&path, marked_content) {
            outcome.error = Some(
                Error::MutationWrite {
                    path: path.clone(),
                    source: e,
                }
                .to_string(),
            );
            files.push(outcome);
            continue;
        }

        info!(
            file = %path.display(),
            entries = outcome.entries_suppressed,
            lines = marked,
            "suppressed conflicting entries"
        );
        files.push(outcome);
    }

    ApplyOutcome { dry_run, files }
}

/// Prefix the marker onto every target line not already bearing it
///
/// Untouched lines (and line endings) pass through byte-identical, which
/// keeps re-apply a provable no-op.
fn mark_lines(content: &str, targets: &BTreeSet<usize>) -> (String, usize, usize) {
    let mut out = String::with_capacity(content.len() + targets.len() * SUPPRESS_MARKER.len());
    let mut marked = 0;
    let mut already = 0;

    for (idx, segment) in content.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        if targets.contains(&line_no) {
            if segment.trim_start().starts_with(SUPPRESS_MARKER) {
                already += 1;
            } else {
                out.push_str(SUPPRESS_MARKER);
                marked += 1;
            }
        }
        out.push_str(segment);
    }

    (out, marked, already)
}

/// Outcome of one per-source restore request
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub source: String,
    pub restored: Option<PathBuf>,
    pub error: Option<String>,
}

/// Restore one source, or every source with a backup
///
/// Failures are isolated per source: a missing backup for one mod does
/// not stop the others from restoring.
pub fn restore_backups(backups: &mut BackupStore, only: Option<&str>) -> Vec<RestoreReport> {
    let names: Vec<String> = match only {
        Some(name) => vec![name.to_string()],
        None => backups.sources(),
    };

    names
        .into_iter()
        .map(|source| match backups.restore(&source) {
            Ok(path) => RestoreReport {
                source,
                restored: Some(path),
                error: None,
            },
            Err(e) => RestoreReport {
                source,
                restored: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}
