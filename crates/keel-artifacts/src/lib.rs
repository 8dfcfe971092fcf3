//! Compiled-artifact store for keel pipelines.
//!
//! Loads hardhat-style build output (one JSON file per contract with `abi`
//! and `bytecode` fields) into immutable [`ArtifactSpec`] values consumed by
//! the deployer and verifier. Resolution is a pure lookup: no side effects,
//! deterministic for a fixed build directory.

pub mod artifact_store;

pub use artifact_store::{ArtifactError, ArtifactSpec, ArtifactStore};
