use std::collections::HashMap;

use serde_json::Value;

use hente_core::Reducer;

use crate::actions::EntityAction;
use crate::config::EntityConfig;
use crate::query::EntityQuery;

/// `(kind, name)` pair identifying one entity collection.
pub type EntityKey = (String, String);

/// Root state of the entities store.
///
/// Records are keyed by the stringified primary key of their entity.
/// `queried` remembers which keys each query produced, which is both the
/// read path for query selectors and the reuse check that lets a
/// single-record resolver skip a fetch an equivalent collection fetch
/// already covered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitiesState {
    pub configs: Vec<EntityConfig>,
    pub records: HashMap<EntityKey, HashMap<String, Value>>,
    pub queried: HashMap<EntityKey, Vec<(EntityQuery, Vec<String>)>>,
    pub permissions: HashMap<String, bool>,
}

impl EntitiesState {
    pub fn config(&self, kind: &str, name: &str) -> Option<&EntityConfig> {
        self.configs.iter().find(|c| c.kind == kind && c.name == name)
    }

    pub fn record(&self, kind: &str, name: &str, key: &str) -> Option<&Value> {
        self.records
            .get(&(kind.to_string(), name.to_string()))?
            .get(key)
    }

    pub fn queried_keys(&self, kind: &str, name: &str, query: &EntityQuery) -> Option<&[String]> {
        self.queried
            .get(&(kind.to_string(), name.to_string()))?
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, keys)| keys.as_slice())
    }
}

/// Stringified record key: entity primary keys may arrive as JSON numbers
/// or strings; both index the same record slot.
pub(crate) fn record_key_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct EntitiesReducer;

impl Reducer for EntitiesReducer {
    type State = EntitiesState;
    type Action = EntityAction;

    fn initial_state(&self) -> EntitiesState {
        EntitiesState::default()
    }

    fn reduce(&self, state: &EntitiesState, action: &EntityAction) -> EntitiesState {
        let mut next = state.clone();
        match action {
            EntityAction::ReceiveEntityConfigs(configs) => {
                for config in configs {
                    let known = next
                        .configs
                        .iter()
                        .any(|c| c.kind == config.kind && c.name == config.name);
                    if !known {
                        next.configs.push(config.clone());
                    }
                }
            }

            EntityAction::ReceiveItems {
                kind,
                name,
                records,
                query,
                ..
            } => {
                let key_field = state
                    .config(kind, name)
                    .map(|c| c.key.clone())
                    .unwrap_or_else(|| "id".to_string());
                let entity = (kind.clone(), name.clone());
                let table = next.records.entry(entity.clone()).or_default();

                let mut keys = Vec::new();
                for record in records {
                    let Some(key) = record_key_string(record.get(&key_field)) else {
                        continue;
                    };
                    // Field-narrowed responses merge over what is already
                    // stored instead of clobbering it.
                    let merged = match (table.get(&key), record) {
                        (Some(Value::Object(existing)), Value::Object(incoming)) => {
                            let mut merged = existing.clone();
                            for (k, v) in incoming {
                                merged.insert(k.clone(), v.clone());
                            }
                            Value::Object(merged)
                        }
                        _ => record.clone(),
                    };
                    table.insert(key.clone(), merged);
                    keys.push(key);
                }

                if let Some(query) = query {
                    let entries = next.queried.entry(entity).or_default();
                    match entries.iter_mut().find(|(q, _)| q == query) {
                        Some((_, existing)) => *existing = keys,
                        None => entries.push((query.clone(), keys)),
                    }
                }
            }

            EntityAction::RemoveItems { kind, name, keys, .. } => {
                let entity = (kind.clone(), name.clone());
                if let Some(table) = next.records.get_mut(&entity) {
                    for key in keys {
                        table.remove(key);
                    }
                    if table.is_empty() {
                        next.records.remove(&entity);
                    }
                }
                if let Some(entries) = next.queried.get_mut(&entity) {
                    for (_, queried_keys) in entries.iter_mut() {
                        queried_keys.retain(|k| !keys.contains(k));
                    }
                }
            }

            EntityAction::ReceivePermission { key, allowed } => {
                next.permissions.insert(key.clone(), *allowed);
            }
        }
        next
    }
}
