// src/repository/metadata.rs

//! Remote catalog document schema
//!
//! A catalog is a JSON document enumerating packages and their downloadable
//! artifacts for one repository. Each artifact is one concrete version with
//! its own dependency list; the catalog's `id` becomes the repository id
//! stamped on every record flattened out of it.

use crate::manifest::Manifest;
use crate::resolver::{Constraint, VersionedPackage};
use crate::version::{SemanticVersion, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dependency declaration on a catalog artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDependency {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<SemanticVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<SemanticVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

impl ArtifactDependency {
    pub fn to_constraint(&self) -> Constraint {
        Constraint {
            package_id: self.id.clone(),
            range: VersionRange {
                min: self.min,
                max: self.max,
            },
            repository_id: self.repository_id.clone(),
        }
    }
}

/// One downloadable version of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    pub version: SemanticVersion,
    #[serde(default)]
    pub supported_arch: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<ArtifactDependency>,
}

/// A package entry in a catalog, holding one artifact per published version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    #[serde(default)]
    pub manifest_version: u32,
    pub name: String,
    pub author: String,
    pub description: String,
    pub artifacts: Vec<Artifact>,
}

/// A remote repository catalog document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCatalog {
    pub manifest_version: u32,
    pub id: String,
    pub name: String,
    pub description: String,
    pub packages: BTreeMap<String, PackageEntry>,
}

impl RepositoryCatalog {
    /// Flatten the catalog into one record per (package, artifact) pair,
    /// each stamped with this catalog's id
    pub fn flatten(&self) -> Vec<VersionedPackage> {
        let mut records = Vec::new();
        for (package_id, entry) in &self.packages {
            for artifact in &entry.artifacts {
                records.push(versioned_package(package_id, &self.id, artifact));
            }
        }
        records
    }

    /// Locate the artifact matching a flattened record
    pub fn find_artifact(&self, package_id: &str, version: &SemanticVersion) -> Option<&Artifact> {
        self.packages.get(package_id).and_then(|entry| {
            entry
                .artifacts
                .iter()
                .find(|artifact| artifact.version == *version)
        })
    }
}

/// Build a resolver record from a catalog artifact
pub fn versioned_package(
    package_id: &str,
    repository_id: &str,
    artifact: &Artifact,
) -> VersionedPackage {
    VersionedPackage {
        id: package_id.to_string(),
        repository_id: repository_id.to_string(),
        version: artifact.version,
        supported_arch: artifact.supported_arch.clone(),
        dependencies: artifact
            .dependencies
            .iter()
            .map(ArtifactDependency::to_constraint)
            .collect(),
    }
}

/// Build a resolver record from an archive or installed-state manifest
pub fn versioned_package_from_manifest(
    manifest: &Manifest,
    repository_id: &str,
) -> VersionedPackage {
    VersionedPackage {
        id: manifest.id.clone(),
        repository_id: repository_id.to_string(),
        version: manifest.version,
        supported_arch: manifest.supported_arch.clone(),
        dependencies: manifest
            .dependencies
            .iter()
            .map(|(dep_id, spec)| Constraint {
                package_id: dep_id.clone(),
                range: spec.range(),
                repository_id: spec.repository_id.clone(),
            })
            .collect(),
    }
}
