//! Load-order configuration: mod priorities plus ignore/exempt lists
//!
//! The document is a small TOML file living next to the game root:
//!
//! ```toml
//! mods = "mods"
//! priority = ["SongPackA", "SongPackB"]
//! ignore = ["BrokenPack"]
//! exempt = ["MegaPack"]
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Rank given to mods absent from the priority list
pub const DEFAULT_RANK: u32 = 9999;

#[derive(Debug, Clone, Default, Deserialize)]
struct RawLoadOrder {
    /// Mods directory, relative to the config file
    mods: Option<String>,
    #[serde(default)]
    priority: Vec<String>,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default)]
    exempt: Vec<String>,
}

/// Parsed load-order document
#[derive(Debug, Clone, Default)]
pub struct LoadOrder {
    mods_dir: Option<String>,
    ranks: BTreeMap<String, u32>,
    ignore: BTreeSet<String>,
    exempt: BTreeSet<String>,
}

impl LoadOrder {
    /// Load a load-order file; a missing file yields an empty order
    /// (every mod default-ranked, nothing ignored or exempt)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "load-order file not found, proceeding without priorities");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Parse a load-order document from a string (useful for testing)
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        let raw: RawLoadOrder = toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

        Ok(Self::from_raw(raw))
    }

    /// Build a load order directly from its parts
    pub fn from_parts(priority: Vec<String>, ignore: Vec<String>, exempt: Vec<String>) -> Self {
        Self::from_raw(RawLoadOrder {
            mods: None,
            priority,
            ignore,
            exempt,
        })
    }

    fn from_raw(raw: RawLoadOrder) -> Self {
        // Rank 0 is reserved for the base game
        let ranks = raw
            .priority
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, i as u32 + 1))
            .collect();

        Self {
            mods_dir: raw.mods,
            ranks,
            ignore: raw.ignore.into_iter().collect(),
            exempt: raw.exempt.into_iter().collect(),
        }
    }

    /// Priority rank for a mod name; unlisted mods share the default rank
    pub fn rank(&self, name: &str) -> u32 {
        self.ranks.get(name).copied().unwrap_or(DEFAULT_RANK)
    }

    /// True if the mod is excluded from scanning entirely
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }

    /// True if the mod is conflict-detected but never auto-mutated
    pub fn is_exempt(&self, name: &str) -> bool {
        self.exempt.contains(name)
    }

    /// Mods root directory, resolved relative to the config file location
    pub fn mods_root(&self, config_path: &Path) -> Option<PathBuf> {
        let dir = self.mods_dir.as_ref()?;
        let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
        Some(parent.join(dir))
    }
}
