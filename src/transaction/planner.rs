// src/transaction/planner.rs

//! Transition planning
//!
//! The planner diffs the installed state against a resolved set and emits an
//! ordered plan: packages to remove, then packages to add. Both lists come
//! out in dependency order (dependencies before dependents) so that hooks
//! always run with their dependencies present. Addition edges come from the
//! resolved set; removal edges come from the installed records.

use crate::resolver::{DependencyGraph, ResolvedSet, VersionedPackage};
use std::collections::BTreeMap;
use tracing::debug;

/// Ordered removals and additions turning `installed` into `resolved`
#[derive(Debug, Default)]
pub struct TransitionPlan {
    pub removals: Vec<VersionedPackage>,
    pub additions: Vec<VersionedPackage>,
}

impl TransitionPlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }
}

/// Diff installed packages against the resolved set
///
/// - installed but not resolved: removal
/// - resolved but not installed, or installed at another version: addition
///   (and removal of the old version)
/// - same id and version on both sides: no-op
///
/// Historical installed state may carry several records per id; only the
/// newest one is considered.
pub fn plan_transition(
    installed: &BTreeMap<String, Vec<VersionedPackage>>,
    resolved: &ResolvedSet,
) -> TransitionPlan {
    let mut removal_records: BTreeMap<&str, &VersionedPackage> = BTreeMap::new();
    let mut addition_records: BTreeMap<&str, &VersionedPackage> = BTreeMap::new();

    let current: BTreeMap<&str, &VersionedPackage> = installed
        .iter()
        .filter_map(|(id, records)| {
            records
                .iter()
                .max_by_key(|record| record.version)
                .map(|record| (id.as_str(), record))
        })
        .collect();

    for (&id, &record) in &current {
        match resolved.get(id) {
            None => {
                removal_records.insert(id, record);
            }
            Some(selected) if selected.version != record.version => {
                removal_records.insert(id, record);
                addition_records.insert(id, selected);
            }
            Some(_) => {}
        }
    }
    for (id, selected) in resolved {
        if !current.contains_key(id.as_str()) {
            addition_records.insert(id.as_str(), selected);
        }
    }

    debug!(
        removals = removal_records.len(),
        additions = addition_records.len(),
        "computed transition diff"
    );

    TransitionPlan {
        removals: order_by_dependencies(&removal_records),
        additions: order_by_dependencies(&addition_records),
    }
}

/// Order a diff subset so dependencies come before their dependents
fn order_by_dependencies(
    records: &BTreeMap<&str, &VersionedPackage>,
) -> Vec<VersionedPackage> {
    let mut graph = DependencyGraph::new();
    for (id, record) in records {
        graph.add_node(*id);
        for dep in &record.dependencies {
            graph.add_edge(*id, dep.package_id.as_str());
        }
    }

    graph
        .dependency_order()
        .into_iter()
        .map(|id| (*records[id.as_str()]).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{Constraint, Resolver};
    use crate::version::{SemanticVersion, VersionRange};

    fn constraint_min(id: &str, major: u32, minor: u32, patch: u32) -> Constraint {
        Constraint {
            package_id: id.to_string(),
            range: VersionRange {
                min: Some(SemanticVersion::new(major, minor, patch)),
                max: None,
            },
            repository_id: None,
        }
    }

    fn pkg(id: &str, major: u32, minor: u32, patch: u32, deps: Vec<Constraint>) -> VersionedPackage {
        VersionedPackage {
            id: id.to_string(),
            repository_id: String::new(),
            version: SemanticVersion::new(major, minor, patch),
            supported_arch: Vec::new(),
            dependencies: deps,
        }
    }

    fn labels(records: &[VersionedPackage]) -> Vec<String> {
        records.iter().map(|record| record.to_string()).collect()
    }

    fn resolve(universe: Vec<VersionedPackage>, constraints: &[Constraint]) -> ResolvedSet {
        Resolver::new(universe).resolve(constraints).unwrap()
    }

    #[test]
    fn test_linear_chain_installs_leaves_first() {
        let resolved = resolve(
            vec![
                pkg("pkgA", 1, 0, 0, vec![constraint_min("pkgB", 1, 0, 0)]),
                pkg("pkgB", 1, 0, 0, vec![constraint_min("pkgC", 1, 0, 0)]),
                pkg("pkgC", 1, 0, 0, vec![constraint_min("pkgD", 1, 0, 0)]),
                pkg("pkgD", 1, 0, 0, vec![constraint_min("pkgE", 1, 0, 0)]),
                pkg("pkgE", 1, 0, 0, vec![]),
            ],
            &[constraint_min("pkgA", 1, 0, 0)],
        );

        let plan = plan_transition(&BTreeMap::new(), &resolved);
        assert!(plan.removals.is_empty());
        assert_eq!(
            labels(&plan.additions),
            vec![
                "pkgE-1.0.0",
                "pkgD-1.0.0",
                "pkgC-1.0.0",
                "pkgB-1.0.0",
                "pkgA-1.0.0",
            ]
        );
    }

    #[test]
    fn test_branching_dependencies_share_order() {
        let resolved = resolve(
            vec![
                pkg("pkgA", 1, 0, 0, vec![constraint_min("pkgB", 1, 0, 0)]),
                pkg(
                    "pkgB",
                    1,
                    0,
                    0,
                    vec![
                        constraint_min("pkgC", 1, 0, 0),
                        constraint_min("pkgD", 1, 0, 0),
                    ],
                ),
                pkg("pkgC", 1, 0, 0, vec![constraint_min("pkgD", 1, 0, 0)]),
                pkg("pkgD", 1, 0, 0, vec![]),
            ],
            &[
                constraint_min("pkgD", 1, 0, 0),
                constraint_min("pkgA", 1, 0, 0),
            ],
        );

        let plan = plan_transition(&BTreeMap::new(), &resolved);
        assert_eq!(
            labels(&plan.additions),
            vec!["pkgD-1.0.0", "pkgC-1.0.0", "pkgB-1.0.0", "pkgA-1.0.0"]
        );
    }

    #[test]
    fn test_version_change_removes_then_adds() {
        let resolved = resolve(
            vec![
                pkg("pkgA", 1, 0, 0, vec![constraint_min("pkgB", 1, 0, 0)]),
                pkg("pkgB", 1, 0, 0, vec![constraint_min("pkgC", 1, 0, 0)]),
                pkg("pkgC", 1, 0, 0, vec![]),
            ],
            &[constraint_min("pkgA", 1, 0, 0)],
        );

        let mut installed = BTreeMap::new();
        installed.insert("pkgC".to_string(), vec![pkg("pkgC", 0, 9, 9, vec![])]);

        let plan = plan_transition(&installed, &resolved);
        assert_eq!(labels(&plan.removals), vec!["pkgC-0.9.9"]);
        assert_eq!(
            labels(&plan.additions),
            vec!["pkgC-1.0.0", "pkgB-1.0.0", "pkgA-1.0.0"]
        );
    }

    #[test]
    fn test_full_removal_orders_leaves_first() {
        let mut installed = BTreeMap::new();
        installed.insert(
            "pkgA".to_string(),
            vec![pkg("pkgA", 1, 0, 0, vec![constraint_min("pkgB", 1, 0, 0)])],
        );
        installed.insert(
            "pkgB".to_string(),
            vec![pkg("pkgB", 1, 0, 0, vec![constraint_min("pkgC", 1, 0, 0)])],
        );
        installed.insert("pkgC".to_string(), vec![pkg("pkgC", 1, 0, 0, vec![])]);
        installed.insert(
            "pkgD".to_string(),
            vec![pkg("pkgD", 1, 0, 0, vec![constraint_min("pkgA", 1, 0, 0)])],
        );

        let plan = plan_transition(&installed, &ResolvedSet::new());
        assert!(plan.additions.is_empty());
        assert_eq!(
            labels(&plan.removals),
            vec!["pkgC-1.0.0", "pkgB-1.0.0", "pkgA-1.0.0", "pkgD-1.0.0"]
        );
    }

    #[test]
    fn test_cycle_is_tolerated() {
        let resolved = resolve(
            vec![
                pkg("pkgA", 1, 0, 0, vec![constraint_min("pkgB", 1, 0, 0)]),
                pkg(
                    "pkgB",
                    1,
                    0,
                    0,
                    vec![
                        constraint_min("pkgC", 1, 0, 0),
                        constraint_min("pkgD", 1, 0, 0),
                    ],
                ),
                pkg("pkgC", 1, 0, 0, vec![constraint_min("pkgD", 1, 0, 0)]),
                pkg("pkgD", 1, 0, 0, vec![constraint_min("pkgC", 1, 0, 0)]),
            ],
            &[
                constraint_min("pkgD", 1, 0, 0),
                constraint_min("pkgA", 1, 0, 0),
            ],
        );

        let plan = plan_transition(&BTreeMap::new(), &resolved);
        let added = labels(&plan.additions);
        assert_eq!(added.len(), 4);

        let mut first_two: Vec<_> = added[0..2].to_vec();
        first_two.sort();
        assert_eq!(first_two, vec!["pkgC-1.0.0", "pkgD-1.0.0"]);

        let mut last_two: Vec<_> = added[2..].to_vec();
        last_two.sort();
        assert_eq!(last_two, vec!["pkgA-1.0.0", "pkgB-1.0.0"]);
    }

    #[test]
    fn test_same_version_is_a_no_op() {
        let resolved = resolve(
            vec![pkg("pkgA", 1, 0, 0, vec![])],
            &[constraint_min("pkgA", 1, 0, 0)],
        );

        let mut installed = BTreeMap::new();
        installed.insert("pkgA".to_string(), vec![pkg("pkgA", 1, 0, 0, vec![])]);

        let plan = plan_transition(&installed, &resolved);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_newest_historical_record_wins() {
        let resolved = resolve(
            vec![pkg("pkgA", 2, 0, 0, vec![])],
            &[constraint_min("pkgA", 2, 0, 0)],
        );

        // Two historical entries; the newer one matches the resolved set
        let mut installed = BTreeMap::new();
        installed.insert(
            "pkgA".to_string(),
            vec![
                pkg("pkgA", 1, 0, 0, vec![]),
                pkg("pkgA", 2, 0, 0, vec![]),
            ],
        );

        let plan = plan_transition(&installed, &resolved);
        assert!(plan.is_empty());
    }
}
