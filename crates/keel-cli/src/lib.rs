//! CLI argument models and validation utilities for the keel deployer binary.
//!
//! Exposes the clap-backed flag surface plus the validation helpers the
//! startup path runs before building clients.

pub mod cli_args;
pub mod validation;

pub use cli_args::Cli;
pub use validation::validate_run_configuration;
