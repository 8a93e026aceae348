//! Discovery of per-mod pv_db database files under a mods root
//!
//! Each mod ships its database as `<mod>/.../rom/mod_pv_db.txt`; the mod
//! name is the top-level directory under the mods root.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One discovered mod and its database file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredMod {
    /// Mod directory name
    pub name: String,
    /// Full path to the mod's pv_db file
    pub pvdb_path: PathBuf,
}

/// Scan a mods root for every mod's pv_db file, sorted by mod name
///
/// When a mod somehow carries more than one database file, the lexically
/// smallest path wins and the rest are reported as a warning, so the run
/// stays deterministic and per-source errors stay non-fatal.
pub fn scan_mods<P: AsRef<Path>>(mods_root: P) -> Result<Vec<DiscoveredMod>> {
    let root = mods_root.as_ref();
    let mut candidates: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let is_pvdb = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case("mod_pv_db.txt"));
        if !is_pvdb {
            continue;
        }

        let in_rom = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case("rom"));
        if !in_rom {
            continue;
        }

        // Mod name is the first path component below the root
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let mut components = rel.components();
        let Some(first) = components.next() else {
            continue;
        };
        if components.next().is_none() {
            // The file sits directly under the root with no mod directory
            continue;
        }
        let name = first.as_os_str().to_string_lossy().to_string();

        candidates.entry(name).or_default().push(path.to_path_buf());
    }

    let mods = candidates
        .into_iter()
        .map(|(name, mut paths)| {
            paths.sort();
            if paths.len() > 1 {
                warn!(
                    mod_name = %name,
                    kept = %paths[0].display(),
                    "mod has {} pv_db files, keeping the first",
                    paths.len()
                );
            }
            DiscoveredMod {
                name,
                pvdb_path: paths.swap_remove(0),
            }
        })
        .collect();

    Ok(mods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "pv_1.song_name=X\n").unwrap();
    }

    #[test]
    fn test_scan_finds_rom_databases_sorted_by_mod() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("PackB/rom/mod_pv_db.txt"));
        touch(&root.join("PackA/rom/mod_pv_db.txt"));
        touch(&root.join("PackC/data/rom/mod_pv_db.txt"));

        let mods = scan_mods(root).unwrap();
        let names: Vec<&str> = mods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["PackA", "PackB", "PackC"]);
        assert!(mods[2].pvdb_path.ends_with("data/rom/mod_pv_db.txt"));
    }

    #[test]
    fn test_scan_skips_files_outside_rom() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("PackA/mod_pv_db.txt"));
        touch(&root.join("PackB/other/mod_pv_db.txt"));
        touch(&root.join("PackC/rom/notes.txt"));

        let mods = scan_mods(root).unwrap();
        assert!(mods.is_empty());
    }

    #[test]
    fn test_scan_duplicate_database_keeps_smallest_path() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Pack/a/rom/mod_pv_db.txt"));
        touch(&root.join("Pack/b/rom/mod_pv_db.txt"));

        let mods = scan_mods(root).unwrap();
        assert_eq!(mods.len(), 1);
        assert!(mods[0].pvdb_path.ends_with("a/rom/mod_pv_db.txt"));
    }

    #[test]
    fn test_scan_filename_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("Pack/rom/MOD_PV_DB.TXT"));

        let mods = scan_mods(root).unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].name, "Pack");
    }

    #[test]
    fn test_scan_missing_root_is_an_error() {
        assert!(scan_mods("definitely/not/a/dir").is_err());
    }
}
