// src/version/mod.rs

//! Version handling for package dependencies
//!
//! Package versions are strict three-component semantic versions compared
//! lexicographically on (major, minor, patch). On the wire a version is a
//! three-element integer array (`[1, 2, 3]`); any other array length is a
//! format error. Ranges have an inclusive minimum and an exclusive maximum,
//! either of which may be open.

use crate::error::{Error, Result};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A (major, minor, patch) version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version with one to three components
    ///
    /// Missing components default to zero:
    /// - "1" → 1.0.0
    /// - "1.2" → 1.2.0
    /// - "1.2.3" → 1.2.3
    ///
    /// More than three components or a non-numeric component is an error.
    pub fn parse_partial(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(Error::ParseError(format!(
                "version {:?} must have 1 to 3 components",
                s
            )));
        }

        let mut components = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part.parse::<u32>().map_err(|e| {
                Error::ParseError(format!("invalid version component {:?}: {}", part, e))
            })?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }

    /// The smallest version strictly greater than this one
    ///
    /// Used to turn an equality request into a half-open range:
    /// `=1.2.3` becomes `[1.2.3, 1.2.4)`.
    pub fn bump_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    pub fn compare(&self, other: &SemanticVersion) -> Ordering {
        self.cmp(other)
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.major)?;
        tuple.serialize_element(&self.minor)?;
        tuple.serialize_element(&self.patch)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        struct VersionVisitor;

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = SemanticVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a [major, minor, patch] integer array")
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<SemanticVersion, A::Error> {
                let major = seq
                    .next_element::<u32>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let minor = seq
                    .next_element::<u32>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let patch = seq
                    .next_element::<u32>()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                if seq.next_element::<u32>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(SemanticVersion::new(major, minor, patch))
            }
        }

        deserializer.deserialize_seq(VersionVisitor)
    }
}

/// A half-open version range: inclusive minimum, exclusive maximum
///
/// Either bound may be absent, making the range open on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<SemanticVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<SemanticVersion>,
}

impl VersionRange {
    /// The unbounded range matching every version
    pub fn any() -> Self {
        Self::default()
    }

    /// Range matching exactly `version`: `[version, version.bump_patch())`
    pub fn exactly(version: SemanticVersion) -> Self {
        Self {
            min: Some(version),
            max: Some(version.bump_patch()),
        }
    }

    /// Validate that a two-sided range is not empty or inverted
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min >= max {
                return Err(Error::ParseError(format!(
                    "version range minimum {} must be below maximum {}",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Whether `version` falls in the range (min inclusive, max exclusive)
    pub fn contains(&self, version: &SemanticVersion) -> bool {
        if let Some(min) = &self.min {
            if version < min {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if version >= max {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self
            .min
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string());
        let max = self
            .max
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(f, "[min={}, max={}]", min, max)
    }
}
