#![forbid(unsafe_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};

/// In-memory child → parents adjacency, loaded once per walk.
#[derive(Clone, Debug, Default)]
pub struct ParentMap {
    parents: HashMap<String, Vec<String>>,
}

impl ParentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_edge(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        let parents = self.parents.entry(child.into()).or_default();
        let parent = parent.into();
        if !parents.contains(&parent) {
            parents.push(parent);
            parents.sort();
        }
    }

    pub fn parents_of(&self, id: &str) -> &[String] {
        self.parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl FromIterator<(String, String)> for ParentMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (parent, child) in iter {
            map.insert_edge(parent, child);
        }
        map
    }
}

/// Breadth-first walk from `start` over `parents`, recording the shortest distance to every
/// reachable node. `start` itself has depth 0. `max_depth` of `None` walks the whole graph;
/// the visited set still guarantees termination on cyclic input.
pub fn ancestors_with_depth<E>(
    start: &str,
    max_depth: Option<u32>,
    mut parents: impl FnMut(&str) -> Result<Vec<String>, E>,
) -> Result<BTreeMap<String, u32>, E> {
    let mut depths = BTreeMap::new();
    depths.insert(start.to_string(), 0u32);
    let mut queue = VecDeque::from([(start.to_string(), 0u32)]);

    while let Some((id, depth)) = queue.pop_front() {
        if max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        for parent in parents(&id)? {
            if depths.contains_key(&parent) {
                continue;
            }
            depths.insert(parent.clone(), depth + 1);
            queue.push_back((parent, depth + 1));
        }
    }

    Ok(depths)
}
