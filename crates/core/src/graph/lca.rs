#![forbid(unsafe_code)]

use super::MAX_ANCESTOR_DEPTH;
use std::collections::HashMap;

/// Level-bounded search for the closest node that is an ancestor (or self) of both `a` and `b`.
///
/// Both frontiers advance one level per round until an id shows up in both visited sets. Among
/// several shared ids found in the same round the one with the smallest combined distance wins,
/// ties broken by id. Returns `None` when nothing is shared within [`MAX_ANCESTOR_DEPTH`] levels.
pub fn lowest_common_ancestor<E>(
    a: &str,
    b: &str,
    mut parents: impl FnMut(&str) -> Result<Vec<String>, E>,
) -> Result<Option<String>, E> {
    let mut seen_a = HashMap::from([(a.to_string(), 0u32)]);
    let mut seen_b = HashMap::from([(b.to_string(), 0u32)]);
    let mut frontier_a = vec![a.to_string()];
    let mut frontier_b = vec![b.to_string()];

    for level in 0..=MAX_ANCESTOR_DEPTH {
        if let Some(found) = closest_shared(&seen_a, &seen_b) {
            return Ok(Some(found));
        }
        if level == MAX_ANCESTOR_DEPTH || (frontier_a.is_empty() && frontier_b.is_empty()) {
            break;
        }
        frontier_a = expand(&frontier_a, &mut seen_a, level + 1, &mut parents)?;
        frontier_b = expand(&frontier_b, &mut seen_b, level + 1, &mut parents)?;
    }

    Ok(None)
}

fn expand<E>(
    frontier: &[String],
    seen: &mut HashMap<String, u32>,
    depth: u32,
    parents: &mut impl FnMut(&str) -> Result<Vec<String>, E>,
) -> Result<Vec<String>, E> {
    let mut next = Vec::new();
    for id in frontier {
        for parent in parents(id)? {
            if seen.contains_key(&parent) {
                continue;
            }
            seen.insert(parent.clone(), depth);
            next.push(parent);
        }
    }
    Ok(next)
}

fn closest_shared(seen_a: &HashMap<String, u32>, seen_b: &HashMap<String, u32>) -> Option<String> {
    seen_a
        .iter()
        .filter_map(|(id, da)| seen_b.get(id).map(|db| (da + db, id)))
        .min()
        .map(|(_, id)| id.clone())
}
