use serde_json::Value;

use crate::config::EntityConfig;
use crate::query::EntityQuery;

/// The wire contract between resolvers and the entities reducer. Records
/// only ever change through these actions.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityAction {
    ReceiveEntityConfigs(Vec<EntityConfig>),

    /// Upsert fetched records for `(kind, name)`. When `query` is present
    /// the received key set is remembered under it as provenance, so
    /// later equivalent queries can reuse the result. `invalidate_cache`
    /// asks matching resolvers to drop their resolution entries.
    ReceiveItems {
        kind: String,
        name: String,
        records: Vec<Value>,
        query: Option<EntityQuery>,
        invalidate_cache: bool,
    },

    RemoveItems {
        kind: String,
        name: String,
        keys: Vec<String>,
        invalidate_cache: bool,
    },

    /// Cache the outcome of one permission probe, keyed
    /// `"{action}/{resource}[/{id}]"`.
    ReceivePermission { key: String, allowed: bool },
}
