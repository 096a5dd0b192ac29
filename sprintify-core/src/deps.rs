//! Task dependency validation within a single sprint.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    SelfReference,
    Unknown(Uuid),
    Cycle,
}

/// Returns true if giving `task` the dependency list `new_deps` closes a loop.
///
/// `edges` maps every task of the sprint to its current dependencies. The
/// entry for `task` is ignored in favour of `new_deps`.
pub fn would_create_cycle(edges: &HashMap<Uuid, Vec<Uuid>>, task: Uuid, new_deps: &[Uuid]) -> bool {
    // A cycle exists iff `task` is reachable from one of its new dependencies.
    let mut stack: Vec<Uuid> = new_deps.to_vec();
    let mut seen: HashSet<Uuid> = HashSet::new();

    while let Some(current) = stack.pop() {
        if current == task {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = edges.get(&current) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

/// Validate a dependency list for `task` against the sprint's current graph.
///
/// `task` may be absent from `edges` when it is being created.
pub fn validate_dependencies(
    edges: &HashMap<Uuid, Vec<Uuid>>,
    task: Uuid,
    new_deps: &[Uuid],
) -> Result<(), DependencyError> {
    for dep in new_deps {
        if *dep == task {
            return Err(DependencyError::SelfReference);
        }
        if !edges.contains_key(dep) {
            return Err(DependencyError::Unknown(*dep));
        }
    }
    if would_create_cycle(edges, task, new_deps) {
        return Err(DependencyError::Cycle);
    }
    Ok(())
}

/// Remove duplicates while keeping first-seen order.
pub fn dedup(deps: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    deps.iter().copied().filter(|d| seen.insert(*d)).collect()
}
