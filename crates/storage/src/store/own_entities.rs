#![forbid(unsafe_code)]

use super::accounts::{delete_account_tx, upsert_account_tx};
use super::key_values::{delete_key_value_tx, set_key_value_tx};
use super::LixError;
use lix_core::ids::{OWN_ENTITY_PLUGIN_KEY, is_own_entity_schema};
use lix_core::model::{Account, Change};
use rusqlite::Connection;
use serde_json::Value;

pub(in crate::store) const KEY_VALUE_SCHEMA: &str = "lix_key_value";
pub(in crate::store) const ACCOUNT_SCHEMA: &str = "lix_account";

/// Own entities must be written under the engine's plugin key.
pub(in crate::store) fn check_own_entity_plugin(schema_key: &str, plugin_key: &str) -> Result<(), LixError> {
    if is_own_entity_schema(schema_key) && plugin_key != OWN_ENTITY_PLUGIN_KEY {
        return Err(LixError::PluginKeyMismatch {
            expected: OWN_ENTITY_PLUGIN_KEY.to_string(),
            actual: plugin_key.to_string(),
        });
    }
    Ok(())
}

/// Projects a committed own-entity change onto the engine table it mirrors.
pub(in crate::store) fn apply_own_entity_change_tx(
    conn: &Connection,
    change: &Change,
    content: Option<&Value>,
) -> Result<(), LixError> {
    if !is_own_entity_schema(&change.schema_key) {
        return Ok(());
    }
    check_own_entity_plugin(&change.schema_key, &change.plugin_key)?;

    match change.schema_key.as_str() {
        KEY_VALUE_SCHEMA => match content {
            Some(content) => {
                let value = content.get("value").cloned().unwrap_or(Value::Null);
                set_key_value_tx(conn, &change.entity_id, &value)
            }
            None => delete_key_value_tx(conn, &change.entity_id),
        },
        ACCOUNT_SCHEMA => match content {
            Some(content) => {
                let name = content
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or(LixError::InvalidInput("lix_account snapshot requires a name"))?;
                upsert_account_tx(
                    conn,
                    &Account {
                        id: change.entity_id.clone(),
                        name: name.to_string(),
                    },
                )
            }
            None => delete_account_tx(conn, &change.entity_id),
        },
        _ => Ok(()),
    }
}
