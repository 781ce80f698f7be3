// src/resolver/mod.rs

//! Dependency resolution over the package universe
//!
//! The resolver selects exactly one version per package id such that every
//! top-level and transitive constraint is satisfied. The search is a
//! depth-first backtrack over a worklist of constraints: candidates for a
//! package are tried newest-first, a tentative selection queues the
//! candidate's own dependencies at the worklist tail, and a dead end unwinds
//! the selection and moves to the next candidate.

mod graph;

pub use graph::DependencyGraph;

use crate::error::{Error, Result};
use crate::version::{SemanticVersion, VersionRange};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// A requirement that some version of a package be present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub package_id: String,
    pub range: VersionRange,
    /// Restricts candidates to one repository: use sparingly
    pub repository_id: Option<String>,
}

impl Constraint {
    /// Constraint matching any version of `package_id`
    pub fn any(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            range: VersionRange::any(),
            repository_id: None,
        }
    }

    /// Constraint matching exactly `version` of `package_id`
    pub fn exactly(package_id: impl Into<String>, version: SemanticVersion) -> Self {
        Self {
            package_id: package_id.into(),
            range: VersionRange::exactly(version),
            repository_id: None,
        }
    }

    /// Whether `package` satisfies this constraint
    pub fn allows(&self, package: &VersionedPackage) -> bool {
        if !self.range.contains(&package.version) {
            return false;
        }
        if let Some(repo) = &self.repository_id {
            if repo != &package.repository_id {
                return false;
            }
        }
        true
    }

    /// Parse a command-line constraint expression
    ///
    /// Supported forms:
    /// - `package-id` (any version)
    /// - `package-id=1.2.3` or `package-id==1.2.3` (exact)
    /// - `package-id>=1.2.3` (minimum)
    /// - `package-id<2.0.0` (maximum)
    /// - `package-id>=1.0.0,<2.0.0` (combined, order irrelevant)
    ///
    /// Versions may have one to three components; missing components are
    /// zero. A later clause of the same kind overwrites an earlier one.
    pub fn parse(arg: &str) -> Result<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(
                r"^(?P<package_id>[a-z\-.]+)(?:[\s,]*(?:(?:==?\s*(?P<eql>[\d.]+))|(?:>=\s*(?P<min>[\d.]+))|(?:<\s*(?P<max>[\d.]+)))[\s,]*)*$",
            )
            .expect("constraint pattern is valid")
        });

        let captures = pattern.captures(arg).ok_or_else(|| {
            Error::ParseError(format!("unable to parse constraint from {:?}", arg))
        })?;

        let package_id = captures["package_id"].to_string();

        if let Some(eql) = captures.name("eql") {
            let version = SemanticVersion::parse_partial(eql.as_str())?;
            return Ok(Self::exactly(package_id, version));
        }

        let mut range = VersionRange::any();
        if let Some(min) = captures.name("min") {
            range.min = Some(SemanticVersion::parse_partial(min.as_str())?);
        }
        if let Some(max) = captures.name("max") {
            range.max = Some(SemanticVersion::parse_partial(max.as_str())?);
        }
        range.validate()?;

        Ok(Self {
            package_id,
            range,
            repository_id: None,
        })
    }

    /// Parse every argument as a constraint, preserving order
    pub fn parse_all(args: &[String]) -> Result<Vec<Self>> {
        args.iter().map(|arg| Self::parse(arg)).collect()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.package_id, self.range)
    }
}

/// One concrete versioned artifact in the universe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPackage {
    pub id: String,
    pub repository_id: String,
    pub version: SemanticVersion,
    pub supported_arch: Vec<String>,
    pub dependencies: Vec<Constraint>,
}

impl fmt::Display for VersionedPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.id, self.version)
    }
}

/// The selected set: one package per id
pub type ResolvedSet = BTreeMap<String, VersionedPackage>;

/// Backtracking dependency resolver over a fixed universe
pub struct Resolver {
    /// Universe records grouped by id, insertion order preserved
    packages: HashMap<String, Vec<VersionedPackage>>,
}

impl Resolver {
    /// Build a resolver from the flattened universe records
    pub fn new(universe: Vec<VersionedPackage>) -> Self {
        let mut packages: HashMap<String, Vec<VersionedPackage>> = HashMap::new();
        for package in universe {
            packages.entry(package.id.clone()).or_default().push(package);
        }
        debug!(package_ids = packages.len(), "resolver universe loaded");
        Self { packages }
    }

    /// Resolve the constraints to one version per package id
    ///
    /// Returns an opaque error when no assignment satisfies every
    /// constraint; the search does not explain which constraint failed.
    pub fn resolve(&self, constraints: &[Constraint]) -> Result<ResolvedSet> {
        let worklist: Vec<&Constraint> = constraints.iter().collect();
        let mut resolved: HashMap<&str, &VersionedPackage> = HashMap::new();

        if self.resolve_recursive(&worklist, &mut resolved) {
            Ok(resolved
                .into_iter()
                .map(|(id, package)| (id.to_string(), package.clone()))
                .collect())
        } else {
            Err(Error::ResolutionError(
                "unable to resolve requested packages".to_string(),
            ))
        }
    }

    /// Work through the remaining constraints, backtracking on dead ends
    fn resolve_recursive<'a>(
        &'a self,
        worklist: &[&'a Constraint],
        resolved: &mut HashMap<&'a str, &'a VersionedPackage>,
    ) -> bool {
        let Some((constraint, remaining)) = worklist.split_first() else {
            return true;
        };
        let package_id = constraint.package_id.as_str();

        let Some(known_versions) = self.packages.get(package_id) else {
            debug!(package = package_id, "constraint names an unknown package");
            return false;
        };

        // Already selected on this branch: the new constraint must agree,
        // otherwise this whole branch is a dead end.
        if let Some(current) = resolved.get(package_id) {
            if constraint.allows(current) {
                return self.resolve_recursive(remaining, resolved);
            }
            return false;
        }

        // Candidates sorted descending by version; the sort is stable so
        // equal versions keep their universe insertion order.
        let mut candidates: Vec<&VersionedPackage> = known_versions.iter().collect();
        candidates.sort_by(|a, b| b.version.cmp(&a.version));

        for candidate in candidates {
            if !constraint.allows(candidate) {
                continue;
            }

            resolved.insert(package_id, candidate);
            debug!(candidate = %candidate, "tentatively selected");

            let mut next: Vec<&Constraint> =
                Vec::with_capacity(remaining.len() + candidate.dependencies.len());
            next.extend_from_slice(remaining);
            next.extend(candidate.dependencies.iter());

            if self.resolve_recursive(&next, resolved) {
                return true;
            }

            resolved.remove(package_id);
            debug!(candidate = %candidate, "backtracking");
        }

        false
    }
}
