#![forbid(unsafe_code)]

//! SQLite-backed engine: change graph, versions, materialized state, merge, and the file
//! change queue.

mod store;

pub use store::*;
