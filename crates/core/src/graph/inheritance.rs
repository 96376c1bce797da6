#![forbid(unsafe_code)]

use std::collections::BTreeSet;

/// Result of following a single-parent inheritance chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InheritanceChain {
    /// Starting id first, then each parent in order.
    pub ids: Vec<String>,
    pub cyclic: bool,
}

impl InheritanceChain {
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|candidate| candidate == id)
    }
}

pub fn inheritance_chain<E>(
    start: &str,
    mut parent_of: impl FnMut(&str) -> Result<Option<String>, E>,
) -> Result<InheritanceChain, E> {
    let mut ids = vec![start.to_string()];
    let mut seen = BTreeSet::from([start.to_string()]);
    let mut current = start.to_string();

    while let Some(parent) = parent_of(&current)? {
        if !seen.insert(parent.clone()) {
            return Ok(InheritanceChain { ids, cyclic: true });
        }
        ids.push(parent.clone());
        current = parent;
    }

    Ok(InheritanceChain { ids, cyclic: false })
}

/// Whether making `parent` the inheritance parent of `child` would close a cycle.
pub fn would_create_cycle<E>(
    child: &str,
    parent: &str,
    parent_of: impl FnMut(&str) -> Result<Option<String>, E>,
) -> Result<bool, E> {
    if child == parent {
        return Ok(true);
    }
    let chain = inheritance_chain(parent, parent_of)?;
    Ok(chain.cyclic || chain.contains(child))
}
