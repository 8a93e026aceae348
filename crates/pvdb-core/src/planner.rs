//! Resolution planning: pick a survivor per conflict group and derive an
//! ordered mutation plan for everything else

use crate::conflict::{ConflictGroup, ConflictKey, Conflicts};
use crate::model::{SourceKind, SourceRegistry, Song};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Planned fate of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Keep,
    Suppress,
}

/// One planned edit against a located entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationAction {
    pub song: Song,
    pub verdict: Verdict,
    /// The owning source is exempt: recorded for reporting, never executed
    pub exempt: bool,
}

/// A conflict group with its survivor decided
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub key: ConflictKey,
    pub winner: Song,
    pub losers: Vec<Song>,
}

/// Suppress actions ordered by (file, first line) so sequential in-file
/// edits are safe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationPlan {
    pub actions: Vec<MutationAction>,
}

impl MutationPlan {
    /// True when nothing needs editing
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions the executor will actually perform
    pub fn executable(&self) -> impl Iterator<Item = &MutationAction> {
        self.actions.iter().filter(|a| !a.exempt)
    }
}

/// Resolve every conflict group and build the mutation plan
///
/// Survivor precedence: the base game's entry if present, otherwise the
/// lowest priority rank, ties broken by source name then file order. A
/// song losing in several groups yields a single action.
pub fn plan_resolutions(
    conflicts: &Conflicts,
    registry: &SourceRegistry,
) -> (Vec<ResolvedConflict>, MutationPlan) {
    let mut resolved = Vec::new();
    let mut actions: Vec<MutationAction> = Vec::new();
    let mut planned: BTreeSet<(PathBuf, u32)> = BTreeSet::new();

    let groups = conflicts
        .id_conflicts
        .iter()
        .chain(conflicts.title_conflicts.iter());
    for group in groups {
        let resolution = resolve_group(group, registry);
        for loser in &resolution.losers {
            let slot = (loser.locator.path.clone(), loser.pv_id);
            if !planned.insert(slot) {
                continue;
            }
            actions.push(MutationAction {
                song: loser.clone(),
                verdict: Verdict::Suppress,
                exempt: registry.get(loser.source).exempt,
            });
        }
        resolved.push(resolution);
    }

    actions.sort_by(|a, b| {
        a.song
            .locator
            .path
            .cmp(&b.song.locator.path)
            .then_with(|| a.song.locator.first_line().cmp(&b.song.locator.first_line()))
    });

    (resolved, MutationPlan { actions })
}

/// Pick the survivor of one group; the rest lose in member order
fn resolve_group(group: &ConflictGroup, registry: &SourceRegistry) -> ResolvedConflict {
    let winner_idx = group
        .members
        .iter()
        .enumerate()
        .min_by_key(|(_, song)| {
            let source = registry.get(song.source);
            (
                source.kind != SourceKind::Base,
                source.priority,
                source.name.clone(),
                song.locator.first_line(),
            )
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let winner = group.members[winner_idx].clone();
    let losers = group
        .members
        .iter()
        .enumerate()
        .filter(|&(idx, _)| idx != winner_idx)
        .map(|(_, song)| song.clone())
        .collect();

    ResolvedConflict {
        key: group.key.clone(),
        winner,
        losers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::build_catalog_from_outcomes;
    use crate::config::LoadOrder;
    use crate::conflict::detect_conflicts;
    use crate::normalize::NormalizePolicy;
    use crate::parser::parse_pvdb_str;
    use crate::scanner::DiscoveredMod;
    use std::path::PathBuf;

    fn registry_with(
        mod_names: &[&str],
        exempt: &[&str],
        with_base: bool,
    ) -> SourceRegistry {
        let order = LoadOrder::from_parts(
            mod_names.iter().map(|n| n.to_string()).collect(),
            vec![],
            exempt.iter().map(|n| n.to_string()).collect(),
        );
        let mods: Vec<DiscoveredMod> = mod_names
            .iter()
            .map(|n| DiscoveredMod {
                name: n.to_string(),
                pvdb_path: PathBuf::from(format!("mods/{}/rom/mod_pv_db.txt", n)),
            })
            .collect();
        let base = with_base.then(|| PathBuf::from("base/pv_db.txt"));
        SourceRegistry::build(base, &mods, &order)
    }

    fn plan(
        registry: &SourceRegistry,
        texts: &[(&str, &str)],
    ) -> (Vec<ResolvedConflict>, MutationPlan) {
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
        let conflicts = detect_conflicts(&catalog, registry);
        plan_resolutions(&conflicts, registry)
    }

    #[test]
    fn test_base_entry_always_survives() {
        let registry = registry_with(&["PackA"], &[], true);
        let (resolved, plan) = plan(
            &registry,
            &[
                ("base", "pv_1.song_name=Levan Polka\n"),
                ("PackA", "pv_1.song_name=Different Song\n"),
            ],
        );

        assert_eq!(resolved.len(), 1);
        assert_eq!(registry.get(resolved[0].winner.source).name, "base");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].verdict, Verdict::Suppress);
        assert_eq!(registry.get(plan.actions[0].song.source).name, "PackA");
    }

    #[test]
    fn test_lowest_rank_survives_without_base() {
        let registry = registry_with(&["PackA", "PackB"], &[], false);
        let (resolved, plan) = plan(
            &registry,
            &[
                ("PackA", "pv_262.song_name=ロキ\n"),
                ("PackB", "pv_900.song_name=Roki\n"),
            ],
        );

        assert_eq!(resolved.len(), 1);
        assert_eq!(registry.get(resolved[0].winner.source).name, "PackA");
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].song.pv_id, 900);
    }

    #[test]
    fn test_equal_rank_tie_breaks_on_source_name() {
        // Neither mod is in the priority list, so both share the default rank
        let mods = vec![
            DiscoveredMod {
                name: "Zeta".to_string(),
                pvdb_path: PathBuf::from("mods/Zeta/rom/mod_pv_db.txt"),
            },
            DiscoveredMod {
                name: "Alpha".to_string(),
                pvdb_path: PathBuf::from("mods/Alpha/rom/mod_pv_db.txt"),
            },
        ];
        let registry = SourceRegistry::build(None, &mods, &LoadOrder::default());

        let (resolved, _) = plan(
            &registry,
            &[
                ("Alpha", "pv_7.song_name=Tie Song\n"),
                ("Zeta", "pv_7.song_name=Tie Song Again\n"),
            ],
        );
        assert_eq!(registry.get(resolved[0].winner.source).name, "Alpha");
    }

    #[test]
    fn test_exempt_losers_are_recorded_but_not_executable() {
        let registry = registry_with(&["PackA", "MegaPack"], &["MegaPack"], false);
        let (resolved, plan) = plan(
            &registry,
            &[
                ("PackA", "pv_3.song_name=Keeper\n"),
                ("MegaPack", "pv_3.song_name=Loser\n"),
            ],
        );

        assert_eq!(resolved[0].losers.len(), 1);
        assert_eq!(plan.actions.len(), 1);
        assert!(plan.actions[0].exempt);
        assert_eq!(plan.executable().count(), 0);
    }

    #[test]
    fn test_double_loss_yields_single_action() {
        // PackB's pv_1 loses the id conflict and the title conflict
        let registry = registry_with(&["PackA", "PackB"], &[], false);
        let (resolved, plan) = plan(
            &registry,
            &[
                ("PackA", "pv_1.song_name=Shared Title\n"),
                ("PackB", "pv_1.song_name=Shared Title\n"),
            ],
        );

        assert_eq!(resolved.len(), 2);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(registry.get(plan.actions[0].song.source).name, "PackB");
    }

    #[test]
    fn test_actions_ordered_by_file_then_line() {
        let registry = registry_with(&["PackA", "PackB", "PackC"], &[], false);
        let (_, plan) = plan(
            &registry,
            &[
                ("PackA", "pv_1.song_name=First\npv_2.song_name=Second\n"),
                ("PackB", "pv_2.song_name=Second\npv_1.song_name=First\n"),
                ("PackC", "pv_1.song_name=First\n"),
            ],
        );

        // Losers are all of PackB and PackC; within PackB's file the
        // actions must follow line order.
        let positions: Vec<(String, usize)> = plan
            .actions
            .iter()
            .map(|a| {
                (
                    registry.get(a.song.source).name.clone(),
                    a.song.locator.first_line(),
                )
            })
            .collect();
        assert_eq!(
            positions,
            vec![
                ("PackB".to_string(), 1),
                ("PackB".to_string(), 2),
                ("PackC".to_string(), 1),
            ]
        );
    }
}
