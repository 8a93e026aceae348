//! Conflict detection over the catalog indexes

use crate::catalog::Catalog;
use crate::model::{SourceRegistry, Song};
use crate::normalize::NormalizedTitle;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// The shared key a conflict group collides on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKey {
    /// Same PV identifier
    Id(u32),
    /// Same normalized title
    Title(NormalizedTitle),
}

impl std::fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKey::Id(id) => write!(f, "pv_{}", id),
            ConflictKey::Title(t) => write!(f, "\"{}\"", t),
        }
    }
}

/// Two or more songs from distinct sources sharing one key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictGroup {
    pub key: ConflictKey,
    /// Members ordered by (source priority, PV id, file order)
    pub members: Vec<Song>,
}

impl ConflictGroup {
    /// Number of distinct sources involved
    pub fn source_count(&self) -> usize {
        self.members
            .iter()
            .map(|s| s.source)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// All conflict groups found in one run; ID and title conflicts are
/// independent outputs and one song may appear in both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conflicts {
    pub id_conflicts: Vec<ConflictGroup>,
    pub title_conflicts: Vec<ConflictGroup>,
}

impl Conflicts {
    /// True when no conflicts of either kind were found
    pub fn is_empty(&self) -> bool {
        self.id_conflicts.is_empty() && self.title_conflicts.is_empty()
    }

    /// Total number of groups
    pub fn len(&self) -> usize {
        self.id_conflicts.len() + self.title_conflicts.len()
    }
}

/// Deterministic member ordering within a group
pub fn member_order(registry: &SourceRegistry, a: &Song, b: &Song) -> Ordering {
    let sa = registry.get(a.source);
    let sb = registry.get(b.source);
    sa.priority
        .cmp(&sb.priority)
        .then_with(|| a.pv_id.cmp(&b.pv_id))
        .then_with(|| a.locator.first_line().cmp(&b.locator.first_line()))
        .then_with(|| sa.name.cmp(&sb.name))
}

/// Scan both indexes and emit every group spanning at least two sources
///
/// Index iteration and member ordering are both deterministic, so the
/// output is reproducible across runs on unchanged input.
pub fn detect_conflicts(catalog: &Catalog, registry: &SourceRegistry) -> Conflicts {
    let id_conflicts = catalog
        .by_id
        .iter()
        .filter_map(|(&id, list)| group_if_conflicting(ConflictKey::Id(id), list, registry))
        .collect();

    let title_conflicts = catalog
        .by_title
        .iter()
        .filter_map(|(key, list)| {
            group_if_conflicting(ConflictKey::Title(key.clone()), list, registry)
        })
        .collect();

    Conflicts {
        id_conflicts,
        title_conflicts,
    }
}

fn group_if_conflicting(
    key: ConflictKey,
    list: &[Song],
    registry: &SourceRegistry,
) -> Option<ConflictGroup> {
    let sources: BTreeSet<_> = list.iter().map(|s| s.source).collect();
    if sources.len() < 2 {
        return None;
    }
    let mut members = list.to_vec();
    members.sort_by(|a, b| member_order(registry, a, b));
    Some(ConflictGroup { key, members })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_catalog_from_outcomes;
    use crate::config::LoadOrder;
    use crate::model::SourceId;
    use crate::normalize::NormalizePolicy;
    use crate::parser::parse_pvdb_str;
    use crate::scanner::DiscoveredMod;
    use std::path::PathBuf;

    fn registry(mod_names: &[&str]) -> SourceRegistry {
        let order = LoadOrder::from_parts(
            mod_names.iter().map(|n| n.to_string()).collect(),
            vec![],
            vec![],
        );
        let mods: Vec<DiscoveredMod> = mod_names
            .iter()
            .map(|n| DiscoveredMod {
                name: n.to_string(),
                pvdb_path: PathBuf::from(format!("mods/{}/rom/mod_pv_db.txt", n)),
            })
            .collect();
        SourceRegistry::build(Some(PathBuf::from("base/pv_db.txt")), &mods, &order)
    }

    fn detect(registry: &SourceRegistry, texts: &[(&str, &str)]) -> Conflicts {
        let outcomes = texts
            .iter()
            .map(|(name, text)| {
                let id = registry.find(name).unwrap();
                let path = registry.get(id).pvdb_path.clone();
                (id, parse_pvdb_str(text, id, name, &path))
            })
            .collect();
        let catalog =
            build_catalog_from_outcomes(registry, &NormalizePolicy::default(), outcomes);
        detect_conflicts(&catalog, registry)
    }

    #[test]
    fn test_id_conflict_across_sources() {
        let registry = registry(&["PackA"]);
        let conflicts = detect(
            &registry,
            &[
                ("base", "pv_1.song_name=Levan Polka\n"),
                ("PackA", "pv_1.song_name=Different Song\n"),
            ],
        );

        assert_eq!(conflicts.id_conflicts.len(), 1);
        assert!(conflicts.title_conflicts.is_empty());
        let group = &conflicts.id_conflicts[0];
        assert_eq!(group.key, ConflictKey::Id(1));
        assert_eq!(group.members.len(), 2);
        assert_eq!(group.source_count(), 2);
    }

    #[test]
    fn test_same_source_duplicates_are_not_groups() {
        let registry = registry(&["PackA"]);
        let conflicts = detect(
            &registry,
            &[("PackA", "pv_1.song_name=One\npv_1.song_name_en=One Again\n")],
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_title_conflict_through_alias() {
        let registry = registry(&["PackA", "PackB"]);
        let conflicts = detect(
            &registry,
            &[
                ("PackA", "pv_10.song_name=ロキ\n"),
                ("PackB", "pv_20.song_name=Roki\n"),
            ],
        );

        assert!(conflicts.id_conflicts.is_empty());
        assert_eq!(conflicts.title_conflicts.len(), 1);
        let members = &conflicts.title_conflicts[0].members;
        assert_eq!(members[0].pv_id, 10);
        assert_eq!(members[1].pv_id, 20);
    }

    #[test]
    fn test_members_ordered_by_priority_then_id() {
        let registry = registry(&["PackA", "PackB"]);
        // Inserted base last by giving base the highest id; ordering must
        // still put base first.
        let conflicts = detect(
            &registry,
            &[
                ("base", "pv_5.song_name=Song\n"),
                ("PackA", "pv_5.song_name=Song A\n"),
                ("PackB", "pv_5.song_name=Song B\n"),
            ],
        );

        let names: Vec<&str> = conflicts.id_conflicts[0]
            .members
            .iter()
            .map(|s| registry.get(s.source).name.as_str())
            .collect();
        assert_eq!(names, vec!["base", "PackA", "PackB"]);
    }

    #[test]
    fn test_song_can_join_both_conflict_kinds() {
        let registry = registry(&["PackA", "PackB"]);
        let conflicts = detect(
            &registry,
            &[
                ("PackA", "pv_1.song_name=Shared Title\n"),
                ("PackB", "pv_1.song_name=Shared Title\n"),
            ],
        );

        assert_eq!(conflicts.id_conflicts.len(), 1);
        assert_eq!(conflicts.title_conflicts.len(), 1);
        assert_eq!(conflicts.len(), 2);
    }
}
