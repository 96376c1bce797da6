#![forbid(unsafe_code)]

mod ancestors;
mod inheritance;
mod lca;

pub use ancestors::*;
pub use inheritance::*;
pub use lca::*;

/// Hard bound on ancestor-search levels. Commit and change graphs are otherwise unbounded, and
/// the walk has to terminate deterministically even on malformed input.
pub const MAX_ANCESTOR_DEPTH: u32 = 100;

#[cfg(test)]
mod tests;
