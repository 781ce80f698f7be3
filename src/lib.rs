// src/lib.rs

//! kpm — package manager for jailbroken Kindle e-readers
//!
//! Packages are .kpkg archives (normalized tar under an optional xz or gzip
//! layer) carrying a manifest.json. Records from remote catalogs, local
//! archive files, and the installed tree feed one backtracking resolver;
//! the resolved set is diffed against the installed state into an ordered
//! transition plan, which the transaction engine executes step by step.
//!
//! # Architecture
//!
//! - One version per package id, selected newest-first under constraints
//! - Catalog sources behind a shared fetch/download contract
//! - Installed state derived by scanning the install root, never cached
//! - Sequential transactions, cooperative cancellation, no rollback

pub mod cancel;
pub mod compression;
pub mod config;
mod error;
pub mod kpkg;
pub mod manifest;
pub mod repository;
pub mod resolver;
pub mod scriptlet;
pub mod state;
pub mod transaction;
pub mod version;

pub use cancel::CancelToken;
pub use config::KpmConfig;
pub use error::{Error, Result};
pub use manifest::{DependencySpec, Manifest};
pub use resolver::{Constraint, ResolvedSet, Resolver, VersionedPackage};
pub use transaction::{plan_transition, TransactionEngine, TransitionPlan};
pub use version::{SemanticVersion, VersionRange};
