//! Dependency ordering over the deploy plan.

use std::collections::{BTreeMap, BTreeSet};

use crate::plan::{dependencies_of, DeployPlan, PlanError};

/// Kahn topological sort with name-sorted tie-breaking so a given plan always
/// deploys in the same order. Fails pre-flight with `CyclicDependency` before
/// any submission is attempted.
pub fn dependency_order(plan: &DeployPlan) -> Result<Vec<String>, PlanError> {
    let mut in_degree: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for artifact in &plan.artifacts {
        in_degree.entry(artifact.name.clone()).or_insert(0);
        for dependency in dependencies_of(artifact) {
            *in_degree.entry(artifact.name.clone()).or_insert(0) += 1;
            dependents
                .entry(dependency)
                .or_default()
                .insert(artifact.name.clone());
        }
    }

    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| name.clone())
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while let Some(name) = ready.iter().next().cloned() {
        ready.remove(&name);
        order.push(name.clone());
        if let Some(children) = dependents.get(&name) {
            for child in children.clone() {
                if let Some(degree) = in_degree.get_mut(&child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(child);
                    }
                }
            }
        }
    }

    if order.len() != in_degree.len() {
        let members: Vec<String> = in_degree
            .into_iter()
            .filter(|(name, _)| !order.contains(name))
            .map(|(name, _)| name)
            .collect();
        return Err(PlanError::CyclicDependency { members });
    }
    Ok(order)
}

/// Direct and transitive dependents of `root`: the artifacts that can no
/// longer deploy once `root` has failed.
pub fn transitive_dependents(plan: &DeployPlan, root: &str) -> BTreeSet<String> {
    let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for artifact in &plan.artifacts {
        for dependency in dependencies_of(artifact) {
            dependents
                .entry(dependency)
                .or_default()
                .insert(artifact.name.clone());
        }
    }

    let mut reached = BTreeSet::new();
    let mut frontier = vec![root.to_string()];
    while let Some(current) = frontier.pop() {
        if let Some(children) = dependents.get(&current) {
            for child in children {
                if reached.insert(child.clone()) {
                    frontier.push(child.clone());
                }
            }
        }
    }
    reached
}
