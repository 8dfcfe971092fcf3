//! Registry document published for the consuming client application.
//!
//! One pipeline run produces one registry: a mapping from artifact name to
//! deployed address and interface schema, written as a single atomic document.
//! Re-running a pipeline overwrites the registry in full; it holds exactly the
//! latest confirmed set, never history.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use keel_core::write_text_atomic;

pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

fn registry_schema_version() -> u32 {
    REGISTRY_SCHEMA_VERSION
}

#[derive(Debug, Error)]
/// Enumerates supported `RegistryError` values.
pub enum RegistryError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write registry {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("registry {path} is malformed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported registry schema {found} in {path}")]
    UnsupportedSchema { found: u32, path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Deployed endpoint descriptor for one artifact. Derived strictly from a
/// deployment record whose final status is confirmed or verified; the
/// publisher never emits an entry below that bar.
pub struct RegistryEntry {
    pub address: String,
    pub interface_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `RegistryDocument` used across keel components.
pub struct RegistryDocument {
    #[serde(default = "registry_schema_version")]
    pub schema_version: u32,
    pub chain_id: u64,
    #[serde(default)]
    pub entries: BTreeMap<String, RegistryEntry>,
}

impl RegistryDocument {
    pub fn new(chain_id: u64) -> Self {
        Self {
            schema_version: REGISTRY_SCHEMA_VERSION,
            chain_id,
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, artifact_name: impl Into<String>, entry: RegistryEntry) {
        self.entries.insert(artifact_name.into(), entry);
    }
}

/// Atomically replaces the registry document at `path`. The consuming
/// application never observes a partial registry.
pub fn publish_registry(path: &Path, document: &RegistryDocument) -> Result<(), RegistryError> {
    let payload = serde_json::to_string_pretty(document).map_err(|error| RegistryError::Write {
        path: path.display().to_string(),
        reason: error.to_string(),
    })?;
    write_text_atomic(path, &payload).map_err(|error| RegistryError::Write {
        path: path.display().to_string(),
        reason: format!("{error:#}"),
    })
}

pub fn load_registry(path: &Path) -> Result<RegistryDocument, RegistryError> {
    let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let parsed: RegistryDocument =
        serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    if parsed.schema_version != REGISTRY_SCHEMA_VERSION {
        return Err(RegistryError::UnsupportedSchema {
            found: parsed.schema_version,
            path: path.display().to_string(),
        });
    }
    Ok(parsed)
}
