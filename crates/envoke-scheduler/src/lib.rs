//! Dependency-aware scheduling: stable topological order and ready batches.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use envoke_core::{ConfigError, EnvDescriptor};

/// Pull-based cursor over the schedulable environments.
///
/// Built once per run from the target list; each [`next_batch`] call consumes
/// the environments at the front of the topological order whose dependencies
/// are all completed. Never blocks; yields an empty batch when nothing is
/// ready yet.
///
/// [`next_batch`]: ReadyBatches::next_batch
#[derive(Debug)]
pub struct ReadyBatches {
    /// Remaining names, topologically ordered.
    order: Vec<String>,
    /// Dependency sets restricted to the scheduled universe.
    deps: HashMap<String, HashSet<String>>,
}

impl ReadyBatches {
    /// Environments whose dependencies are all in `completed`, taken from the
    /// front of the order up to the first one still blocked.
    pub fn next_batch(&mut self, completed: &HashSet<String>) -> Vec<String> {
        let take = self
            .order
            .iter()
            .take_while(|name| {
                self.deps[name.as_str()]
                    .iter()
                    .all(|dep| completed.contains(dep))
            })
            .count();
        self.order.drain(..take).collect()
    }

    /// True once every environment has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.order.is_empty()
    }

    /// Names not yet handed out, in schedule order.
    pub fn pending(&self) -> &[String] {
        &self.order
    }
}

/// Compute the schedule for `to_run` over the given descriptors.
///
/// Dependencies on names outside `to_run` are dropped, the same treatment as
/// already-completed environments. The order is a stable topological sort
/// with ties broken by input order, so identical inputs always schedule
/// identically. A cycle is a fatal configuration error naming one member.
pub fn run_order(envs: &[EnvDescriptor], to_run: &[String]) -> Result<ReadyBatches, ConfigError> {
    let universe: HashSet<&str> = to_run.iter().map(String::as_str).collect();
    let by_name: HashMap<&str, &EnvDescriptor> =
        envs.iter().map(|env| (env.name.as_str(), env)).collect();

    let mut deps: HashMap<String, HashSet<String>> = HashMap::new();
    for name in to_run {
        let in_universe: HashSet<String> = by_name
            .get(name.as_str())
            .map(|env| {
                env.depends_on
                    .iter()
                    .filter(|dep| universe.contains(dep.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        deps.insert(name.clone(), in_universe);
    }

    let order = stable_topological_sort(to_run, &deps)?;
    debug!(?order, "computed run order");
    Ok(ReadyBatches { order, deps })
}

/// Repeatedly peel off every environment whose dependencies are already
/// placed, preserving input order within each round. A round without
/// progress means the rest form a cycle.
fn stable_topological_sort(
    to_run: &[String],
    deps: &HashMap<String, HashSet<String>>,
) -> Result<Vec<String>, ConfigError> {
    let mut order: Vec<String> = Vec::with_capacity(to_run.len());
    let mut placed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&String> = to_run.iter().collect();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut next_remaining: Vec<&String> = Vec::new();
        for name in remaining {
            let ready = deps[name.as_str()]
                .iter()
                .all(|dep| placed.contains(dep.as_str()));
            if ready {
                placed.insert(name.as_str());
                order.push(name.clone());
            } else {
                next_remaining.push(name);
            }
        }
        if next_remaining.len() == before {
            return Err(ConfigError::DependencyCycle(next_remaining[0].clone()));
        }
        remaining = next_remaining;
    }
    Ok(order)
}
