//! Ledger submission layer for keel pipelines.
//!
//! Exposes the narrow [`ChainClient`] seam the orchestrator deploys through
//! (submit a deployment transaction, await its confirmation), a JSON-RPC
//! implementation backed by a node or signer sidecar that holds the key
//! material, and the [`Deployer`] retry wrapper that turns client outcomes
//! into deployment records.

pub mod constructor_args;
pub mod deployer;
pub mod rpc_client;
pub mod types;

pub use constructor_args::{encode_constructor_args_hex, encode_deployment};
pub use deployer::{DeployRetryPolicy, Deployer};
pub use rpc_client::{ChainClientConfig, HttpChainClient};
pub use types::{
    format_address, format_h256, parse_address, parse_h256, ChainClient, ChainError, Confirmation,
    DeploymentRecord, DeploymentStatus, DeploymentTarget,
};
