#![forbid(unsafe_code)]

use super::super::support::STATE_COLUMNS;
use super::super::versions::{active_version_id_tx, verify_inheritance_acyclic_tx};
use super::super::LixError;
use super::cache::{StateCacheMetrics, ensure_schema_cache_tx, mark_all_schemas_stale_tx, materialize_generic_tx};
use super::history::{HISTORY_COLUMNS, materialize_history_tx};
use lix_core::sql::{
    LogicalView, Statement, StatementKind, ViewReference, quote_literal, rewrite_view_references,
    view_references,
};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Rows (column name → JSON value) and, for writes, the affected-row count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub num_affected_rows: usize,
}

/// Runs one SQL statement, serving `state`, `state_all` and `state_history` from the engine.
///
/// Writes may touch any table, so they invalidate every state cache and re-check version
/// inheritance before returning.
pub(in crate::store) fn execute_tx(
    conn: &Connection,
    metrics: &mut StateCacheMetrics,
    sql: &str,
    params: &[Value],
) -> Result<QueryResult, LixError> {
    let statement = Statement::parse(sql)?;
    let rewritten = if view_references(&statement).is_empty() {
        sql.to_string()
    } else {
        let active_version_id = active_version_id_tx(conn)?;
        let mut generic: Option<&'static str> = None;
        rewrite_view_references(&statement, |reference: &ViewReference| {
            view_subquery(conn, metrics, &mut generic, &active_version_id, reference).map(Some)
        })?
    };
    debug!(sql = %rewritten, "executing statement");

    let bound = params.iter().map(json_to_sql).collect::<Vec<_>>();
    let mut stmt = conn.prepare(&rewritten)?;
    let result = if stmt.column_count() == 0 {
        let affected = stmt.execute(params_from_iter(bound.iter()))?;
        QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            num_affected_rows: affected,
        }
    } else {
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = stmt.query(params_from_iter(bound.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (index, column) in columns.iter().enumerate() {
                object.insert(column.clone(), sql_to_json(row.get_ref(index)?));
            }
            out.push(object);
        }
        drop(rows);
        let num_affected_rows = if statement.kind == StatementKind::Write {
            usize::try_from(conn.changes()).unwrap_or(0)
        } else {
            0
        };
        QueryResult {
            columns,
            rows: out,
            num_affected_rows,
        }
    };
    drop(stmt);

    if statement.kind != StatementKind::Query {
        mark_all_schemas_stale_tx(conn)?;
        verify_inheritance_acyclic_tx(conn)?;
    }
    Ok(result)
}

fn view_subquery(
    conn: &Connection,
    metrics: &mut StateCacheMetrics,
    generic: &mut Option<&'static str>,
    active_version_id: &str,
    reference: &ViewReference,
) -> Result<String, LixError> {
    if reference.write_target {
        return Err(LixError::UnsupportedQuery(
            "state views are read-only; write through a state transaction",
        ));
    }

    match reference.view {
        LogicalView::State | LogicalView::StateAll => {
            let source = match reference.schema_key.as_deref() {
                Some(schema_key) => format!("\"{}\"", ensure_schema_cache_tx(conn, metrics, schema_key)?),
                None => match generic {
                    Some(table) => table.to_string(),
                    None => {
                        let table = materialize_generic_tx(conn, metrics)?;
                        *generic = Some(table);
                        table.to_string()
                    }
                },
            };
            let filter = match reference.view {
                LogicalView::State => {
                    format!(" WHERE version_id = {}", quote_literal(active_version_id))
                }
                _ => String::new(),
            };
            Ok(format!("SELECT {STATE_COLUMNS} FROM {source}{filter}"))
        }
        LogicalView::StateHistory => {
            let Some(change_set_id) = reference.change_set_id.as_deref() else {
                return Err(LixError::UnsupportedQuery(
                    "state_history requires a change_set_id equality filter",
                ));
            };
            let table = materialize_history_tx(conn, change_set_id)?;
            Ok(format!(
                "SELECT {HISTORY_COLUMNS} FROM {table} WHERE change_set_id = {}",
                quote_literal(change_set_id)
            ))
        }
    }
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number
                .as_f64()
                .map(SqlValue::Real)
                .unwrap_or(SqlValue::Null),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::Number(integer.into()),
        ValueRef::Real(real) => Number::from_f64(real).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_parameters_map_to_sqlite_values() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(json_to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(json_to_sql(&json!({"a": 1})), SqlValue::Text("{\"a\":1}".to_string()));
        assert_eq!(sql_to_json(ValueRef::Blob(&[1, 2])), json!([1, 2]));
    }
}
