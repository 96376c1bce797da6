#![forbid(unsafe_code)]

mod cache;
mod changes;
mod core;
mod files;
mod graph;
mod versions;

pub(super) fn full_schema_sql() -> String {
    let mut sql = String::new();
    sql.push_str(core::SQL);
    sql.push_str(changes::SQL);
    sql.push_str(graph::SQL);
    sql.push_str(versions::SQL);
    sql.push_str(cache::SQL);
    sql.push_str(files::SQL);
    sql
}
