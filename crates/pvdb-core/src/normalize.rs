//! Title normalization for fuzzy duplicate matching
//!
//! Normalization is a pure function kept separate from indexing so its
//! rules can be unit-tested in isolation: case fold, punctuation strip,
//! whitespace collapse, then a known-alias table merging localization
//! variants of the same song.

use crate::model::Song;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical form of a song title used as the title-conflict key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NormalizedTitle(String);

impl NormalizedTitle {
    /// The canonical key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NormalizedTitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalization rules, constructed once per run
///
/// The alias table maps an already-normalized variant to its canonical
/// key; the default table covers common localization variants seen in
/// song packs. Callers can supply their own table since these rules are
/// policy, not a fixed contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizePolicy {
    aliases: BTreeMap<String, String>,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self::with_aliases([
            ("ロキ", "roki"),
            ("メルト", "melt"),
            ("ヒバナ", "hibana"),
            ("シャルル", "charles"),
            ("テオ", "teo"),
            ("千本桜", "senbonzakura"),
            ("ゴーストルール", "ghost rule"),
            ("ドーナツホール", "donut hole"),
            ("ワールドイズマイン", "world is mine"),
            ("アンノウン・マザーグース", "unknown mother goose"),
            ("Ievan Polkka", "levan polka"),
        ])
    }
}

impl NormalizePolicy {
    /// Policy with no aliases at all (basic normalization only)
    pub fn basic() -> Self {
        Self {
            aliases: BTreeMap::new(),
        }
    }

    /// Build a policy from (variant, canonical) pairs
    ///
    /// Both sides are run through basic normalization so the table can be
    /// written with natural spelling.
    pub fn with_aliases<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let aliases = pairs
            .into_iter()
            .filter_map(|(variant, canonical)| {
                let v = basic_normalize(variant);
                let c = basic_normalize(canonical);
                (!v.is_empty() && !c.is_empty()).then_some((v, c))
            })
            .collect();
        Self { aliases }
    }

    /// Normalize a raw title; None when nothing survives normalization
    pub fn normalize(&self, raw: &str) -> Option<NormalizedTitle> {
        let basic = basic_normalize(raw);
        if basic.is_empty() {
            return None;
        }
        let resolved = self.aliases.get(&basic).cloned().unwrap_or(basic);
        Some(NormalizedTitle(resolved))
    }

    /// Title-conflict key for a song, preferring its secondary title
    pub fn song_key(&self, song: &Song) -> Option<NormalizedTitle> {
        self.normalize(song.matching_title()?)
    }
}

/// Case fold, strip punctuation and symbols, collapse whitespace runs
fn basic_normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.extend(c.to_lowercase());
    }
    out
}
