use std::path::{Path, PathBuf};

use ethers_core::abi::Abi;
use ethers_core::types::Bytes;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates supported `ArtifactError` values.
pub enum ArtifactError {
    #[error("no compiled artifact found for '{name}'")]
    NotFound { name: String },
    #[error("failed to read artifact file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact file {path} is malformed: {reason}")]
    Malformed { path: String, reason: String },
}

#[derive(Debug, Clone)]
/// Immutable compiled-artifact description resolved from build output.
pub struct ArtifactSpec {
    pub name: String,
    /// `sourceName:ContractName` reference submitted to the verification service.
    pub source_reference: String,
    /// Raw ABI document published into the registry for client consumption.
    pub interface_schema: Value,
    /// Parsed ABI used for constructor-argument encoding.
    pub abi: Abi,
    /// Creation bytecode, constructor arguments not yet appended.
    pub bytecode: Bytes,
    /// Hex sha256 of the creation bytecode, carried into the run report.
    pub content_digest: String,
}

#[derive(Debug, Deserialize)]
struct RawArtifact {
    #[serde(rename = "contractName")]
    contract_name: Option<String>,
    #[serde(rename = "sourceName")]
    source_name: Option<String>,
    abi: Value,
    bytecode: String,
}

#[derive(Debug, Clone)]
/// Pure lookup over a directory of compiled artifact JSON files.
pub struct ArtifactStore {
    build_dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Resolves `name` to an [`ArtifactSpec`]. Deterministic for a fixed
    /// build directory; repeated calls return equivalent specs.
    pub fn resolve(&self, name: &str) -> Result<ArtifactSpec, ArtifactError> {
        let path = self.build_dir.join(format!("{name}.json"));
        if !path.exists() {
            return Err(ArtifactError::NotFound {
                name: name.to_string(),
            });
        }
        let raw = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Read {
            path: path.display().to_string(),
            source,
        })?;
        parse_artifact(name, &path, &raw)
    }
}

fn parse_artifact(name: &str, path: &Path, raw: &str) -> Result<ArtifactSpec, ArtifactError> {
    let malformed = |reason: String| ArtifactError::Malformed {
        path: path.display().to_string(),
        reason,
    };

    // Build tools on some platforms emit a UTF-8 BOM; tolerate it.
    let trimmed = raw.trim_start_matches('\u{feff}');
    let parsed: RawArtifact = serde_json::from_str(trimmed)
        .map_err(|error| malformed(format!("invalid artifact JSON: {error}")))?;

    let bytecode_hex = parsed.bytecode.trim();
    let stripped = bytecode_hex
        .strip_prefix("0x")
        .ok_or_else(|| malformed("bytecode must be 0x-prefixed hex".to_string()))?;
    let bytecode_bytes = hex::decode(stripped)
        .map_err(|error| malformed(format!("bytecode is not valid hex: {error}")))?;
    if bytecode_bytes.is_empty() {
        return Err(malformed(
            "bytecode is empty; artifact is not deployable".to_string(),
        ));
    }

    let abi: Abi = serde_json::from_value(parsed.abi.clone())
        .map_err(|error| malformed(format!("invalid ABI document: {error}")))?;

    let contract_name = parsed
        .contract_name
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| name.to_string());
    let source_reference = match parsed.source_name.filter(|value| !value.trim().is_empty()) {
        Some(source_name) => format!("{source_name}:{contract_name}"),
        None => contract_name.clone(),
    };

    let content_digest = hex::encode(Sha256::digest(&bytecode_bytes));

    Ok(ArtifactSpec {
        name: name.to_string(),
        source_reference,
        interface_schema: parsed.abi,
        abi,
        bytecode: Bytes::from(bytecode_bytes),
        content_digest,
    })
}
