// src/manifest.rs

//! The `manifest.json` document carried at the root of every package archive
//!
//! The manifest names the package, its version, and its dependencies. The
//! dependency map is keyed by package id; each value narrows the acceptable
//! versions and may pin the dependency to a specific repository.

use crate::version::{SemanticVersion, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dependency declaration inside a manifest
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Minimum required version (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<SemanticVersion>,
    /// Maximum supported version (exclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<SemanticVersion>,
    /// Restricts the dependency to a specific repository: use sparingly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
}

impl DependencySpec {
    pub fn range(&self) -> VersionRange {
        VersionRange {
            min: self.min,
            max: self.max,
        }
    }
}

/// The manifest.json inside a .kpkg archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: SemanticVersion,
    #[serde(default)]
    pub supported_arch: Vec<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let json = r#"{
            "id": "com.example.app",
            "name": "Example App",
            "author": "Example Author",
            "description": "An example package",
            "version": [1, 2, 3],
            "supported_arch": ["armhf"],
            "dependencies": {
                "org.lua": {},
                "io.github.niluje.fbink": {
                    "min": [0, 6, 10],
                    "max": [0, 7, 0]
                },
                "com.example.pinned": {
                    "min": [1, 0, 0],
                    "repository_id": "example-repo"
                }
            }
        }"#;

        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.id, "com.example.app");
        assert_eq!(manifest.version, SemanticVersion::new(1, 2, 3));
        assert_eq!(manifest.supported_arch, vec!["armhf"]);
        assert_eq!(manifest.dependencies.len(), 3);

        let fbink = &manifest.dependencies["io.github.niluje.fbink"];
        assert_eq!(fbink.min, Some(SemanticVersion::new(0, 6, 10)));
        assert_eq!(fbink.max, Some(SemanticVersion::new(0, 7, 0)));
        assert_eq!(fbink.repository_id, None);

        let lua = &manifest.dependencies["org.lua"];
        assert!(lua.range().contains(&SemanticVersion::new(9, 9, 9)));

        let pinned = &manifest.dependencies["com.example.pinned"];
        assert_eq!(pinned.repository_id.as_deref(), Some("example-repo"));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{
            "id": "com.example.minimal",
            "name": "Minimal",
            "author": "",
            "description": "",
            "version": [0, 1, 0]
        }"#;

        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(manifest.supported_arch.is_empty());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_bad_version_array_is_rejected() {
        let json = r#"{
            "id": "com.example.bad",
            "name": "Bad",
            "author": "",
            "description": "",
            "version": [1, 2]
        }"#;

        assert!(serde_json::from_str::<Manifest>(json).is_err());
    }
}
