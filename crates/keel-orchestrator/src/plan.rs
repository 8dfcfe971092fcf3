//! Deploy-plan configuration.
//!
//! The plan names every artifact in a run together with its constructor
//! arguments. String arguments may carry `${address:Other}` placeholders;
//! each placeholder both declares a dependency edge on `Other` and marks
//! where the confirmed address is substituted at deploy time. The plan is the
//! authoritative statement of constructor arguments for a run; the pipeline
//! never guesses between historical signatures.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEPLOY_PLAN_SCHEMA_VERSION: u32 = 1;

fn deploy_plan_schema_version() -> u32 {
    DEPLOY_PLAN_SCHEMA_VERSION
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{address:([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern")
    })
}

#[derive(Debug, Error)]
/// Enumerates supported `PlanError` values.
pub enum PlanError {
    #[error("failed to read deploy plan {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("deploy plan {path} is malformed: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported deploy plan schema {found}")]
    UnsupportedSchema { found: u32 },
    #[error("deploy plan names no artifacts")]
    EmptyPlan,
    #[error("artifact '{name}' appears more than once in the deploy plan")]
    DuplicateArtifact { name: String },
    #[error("artifact '{artifact}' references unknown dependency '{dependency}'")]
    UnknownDependency {
        artifact: String,
        dependency: String,
    },
    #[error("artifact '{name}' depends on its own address")]
    SelfDependency { name: String },
    #[error("cyclic dependency among artifacts: {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },
    #[error("selection names unknown artifact '{name}'")]
    UnknownSelection { name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `PlanArtifact` used across keel components.
pub struct PlanArtifact {
    pub name: String,
    #[serde(default)]
    pub constructor_args: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `DeployPlan` used across keel components.
pub struct DeployPlan {
    #[serde(default = "deploy_plan_schema_version")]
    pub schema_version: u32,
    pub artifacts: Vec<PlanArtifact>,
}

impl DeployPlan {
    pub fn get(&self, name: &str) -> Option<&PlanArtifact> {
        self.artifacts.iter().find(|artifact| artifact.name == name)
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .map(|artifact| artifact.name.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.schema_version != DEPLOY_PLAN_SCHEMA_VERSION {
            return Err(PlanError::UnsupportedSchema {
                found: self.schema_version,
            });
        }
        if self.artifacts.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut seen = BTreeSet::new();
        for artifact in &self.artifacts {
            if !seen.insert(artifact.name.clone()) {
                return Err(PlanError::DuplicateArtifact {
                    name: artifact.name.clone(),
                });
            }
        }

        for artifact in &self.artifacts {
            for dependency in dependencies_of(artifact) {
                if dependency == artifact.name {
                    return Err(PlanError::SelfDependency {
                        name: artifact.name.clone(),
                    });
                }
                if !seen.contains(&dependency) {
                    return Err(PlanError::UnknownDependency {
                        artifact: artifact.name.clone(),
                        dependency,
                    });
                }
            }
        }
        Ok(())
    }

    /// Narrows the plan to `selection` plus the transitive dependencies those
    /// artifacts need, preserving the original artifact order.
    pub fn restrict_to(&self, selection: &[String]) -> Result<DeployPlan, PlanError> {
        for name in selection {
            if self.get(name).is_none() {
                return Err(PlanError::UnknownSelection { name: name.clone() });
            }
        }

        let mut keep: BTreeSet<String> = selection.iter().cloned().collect();
        loop {
            let mut grew = false;
            for artifact in &self.artifacts {
                if !keep.contains(&artifact.name) {
                    continue;
                }
                for dependency in dependencies_of(artifact) {
                    if keep.insert(dependency) {
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }

        Ok(DeployPlan {
            schema_version: self.schema_version,
            artifacts: self
                .artifacts
                .iter()
                .filter(|artifact| keep.contains(&artifact.name))
                .cloned()
                .collect(),
        })
    }
}

pub fn load_deploy_plan(path: &Path) -> Result<DeployPlan, PlanError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let trimmed = raw.trim_start_matches('\u{feff}');
    let plan: DeployPlan = serde_json::from_str(trimmed).map_err(|source| PlanError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    plan.validate()?;
    Ok(plan)
}

/// Dependency edges declared by an artifact's constructor arguments.
pub fn dependencies_of(artifact: &PlanArtifact) -> BTreeSet<String> {
    let mut dependencies = BTreeSet::new();
    for value in &artifact.constructor_args {
        collect_placeholders(value, &mut dependencies);
    }
    dependencies
}

fn collect_placeholders(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => {
            for capture in placeholder_pattern().captures_iter(text) {
                out.insert(capture[1].to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_placeholders(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_placeholders(item, out);
            }
        }
        _ => {}
    }
}

/// Substitutes `${address:Name}` placeholders using `resolve`. Returns the
/// name of the first dependency `resolve` cannot supply an address for.
pub fn substitute_placeholders(
    args: &[Value],
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<Value>, String> {
    let mut required = BTreeSet::new();
    for value in args {
        collect_placeholders(value, &mut required);
    }
    for dependency in &required {
        if resolve(dependency).is_none() {
            return Err(dependency.clone());
        }
    }
    Ok(args
        .iter()
        .map(|value| substitute_value(value, resolve))
        .collect())
}

fn substitute_value(value: &Value, resolve: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(text) => {
            let replaced = placeholder_pattern().replace_all(text, |caps: &regex::Captures| {
                resolve(&caps[1]).unwrap_or_default()
            });
            Value::String(replaced.into_owned())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, resolve))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute_value(item, resolve)))
                .collect(),
        ),
        other => other.clone(),
    }
}
