//! Pure read functions over [`EntitiesState`], registered as the named
//! selectors of the entities store.

use serde_json::Value;

use hente_core::SelectorArgs;

use crate::query::EntityQuery;
use crate::state::EntitiesState;

pub(crate) fn arg_str<'a>(args: &'a SelectorArgs, index: usize) -> Option<&'a str> {
    args.get(index).and_then(Value::as_str)
}

/// Record keys may be passed as JSON strings or numbers.
pub(crate) fn arg_key(args: &SelectorArgs, index: usize) -> Option<String> {
    match args.get(index)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn permission_key(action: &str, resource: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{action}/{resource}/{id}"),
        None => format!("{action}/{resource}"),
    }
}

pub fn get_entity_configs(state: &EntitiesState, args: &SelectorArgs) -> Value {
    let Some(kind) = arg_str(args, 0) else {
        return Value::Null;
    };
    let configs: Vec<_> = state.configs.iter().filter(|c| c.kind == kind).collect();
    serde_json::to_value(configs).unwrap_or(Value::Null)
}

pub fn get_entity_config(state: &EntitiesState, args: &SelectorArgs) -> Value {
    let (Some(kind), Some(name)) = (arg_str(args, 0), arg_str(args, 1)) else {
        return Value::Null;
    };
    state
        .config(kind, name)
        .and_then(|c| serde_json::to_value(c).ok())
        .unwrap_or(Value::Null)
}

pub fn get_entity_record(state: &EntitiesState, args: &SelectorArgs) -> Value {
    let (Some(kind), Some(name), Some(key)) =
        (arg_str(args, 0), arg_str(args, 1), arg_key(args, 2))
    else {
        return Value::Null;
    };
    let Some(record) = state.record(kind, name, &key) else {
        return Value::Null;
    };

    // A fields-restricted query narrows the returned record to the
    // requested top-level fields.
    let fields = args
        .get(3)
        .and_then(EntityQuery::from_value)
        .and_then(|q| q.fields());
    match (fields, record) {
        (Some(fields), Value::Object(map)) => Value::Object(
            map.iter()
                .filter(|(k, _)| fields.iter().any(|f| f == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        _ => record.clone(),
    }
}

pub fn get_entity_records(state: &EntitiesState, args: &SelectorArgs) -> Value {
    let (Some(kind), Some(name)) = (arg_str(args, 0), arg_str(args, 1)) else {
        return Value::Null;
    };
    let query = args
        .get(2)
        .and_then(EntityQuery::from_value)
        .unwrap_or_default();
    // Provenance is recorded under the query as fetched, which forces the
    // primary key into any `_fields` restriction. Normalize the same way
    // here or a fields-restricted lookup misses its own fetch.
    let query = match state.config(kind, name) {
        Some(config) => query.with_key_field(&config.key),
        None => query,
    };

    if let Some(keys) = state.queried_keys(kind, name, &query) {
        let records: Vec<Value> = keys
            .iter()
            .filter_map(|key| state.record(kind, name, key).cloned())
            .collect();
        return Value::Array(records);
    }

    // The whole collection answers a trivial query that has not been
    // tracked yet; a specific un-queried query is simply unknown.
    if query.is_trivial() {
        if let Some(table) = state.records.get(&(kind.to_string(), name.to_string())) {
            let mut keys: Vec<&String> = table.keys().collect();
            // Numeric keys order numerically; "10" must not sort before "2".
            keys.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            });
            return Value::Array(keys.iter().filter_map(|k| table.get(*k).cloned()).collect());
        }
    }
    Value::Null
}

pub fn can_user(state: &EntitiesState, args: &SelectorArgs) -> Value {
    let (Some(action), Some(resource)) = (arg_str(args, 0), arg_str(args, 1)) else {
        return Value::Null;
    };
    let id = arg_key(args, 2);
    let key = permission_key(action, resource, id.as_deref());
    state
        .permissions
        .get(&key)
        .map(|allowed| Value::Bool(*allowed))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::EntityAction;
    use crate::config::EntityConfig;
    use crate::state::EntitiesReducer;
    use hente_core::Reducer;
    use serde_json::json;

    fn populated() -> EntitiesState {
        let reducer = EntitiesReducer;
        let state = reducer.reduce(
            &EntitiesState::default(),
            &EntityAction::ReceiveEntityConfigs(vec![EntityConfig::new(
                "postType",
                "post",
                "/v2/posts",
            )]),
        );
        reducer.reduce(
            &state,
            &EntityAction::ReceiveItems {
                kind: "postType".into(),
                name: "post".into(),
                records: vec![
                    json!({"id": 1, "title": "one", "status": "draft"}),
                    json!({"id": 2, "title": "two", "status": "publish"}),
                ],
                query: Some(EntityQuery::new().set("status", "any")),
                invalidate_cache: false,
            },
        )
    }

    #[test]
    fn test_get_entity_record_by_key() {
        let state = populated();
        let record = get_entity_record(
            &state,
            &vec![json!("postType"), json!("post"), json!(1)],
        );
        assert_eq!(record["title"], json!("one"));

        let missing = get_entity_record(
            &state,
            &vec![json!("postType"), json!("post"), json!(9)],
        );
        assert_eq!(missing, Value::Null);
    }

    #[test]
    fn test_get_entity_record_narrows_fields() {
        let state = populated();
        let record = get_entity_record(
            &state,
            &vec![
                json!("postType"),
                json!("post"),
                json!(1),
                json!({"_fields": "id,title"}),
            ],
        );
        assert_eq!(record, json!({"id": 1, "title": "one"}));
    }

    #[test]
    fn test_get_entity_records_by_query() {
        let state = populated();
        let records = get_entity_records(
            &state,
            &vec![json!("postType"), json!("post"), json!({"status": "any"})],
        );
        assert_eq!(records.as_array().map(Vec::len), Some(2));

        let unknown = get_entity_records(
            &state,
            &vec![json!("postType"), json!("post"), json!({"status": "draft"})],
        );
        assert_eq!(unknown, Value::Null);
    }

    #[test]
    fn test_get_entity_records_fields_query_without_key_finds_provenance() {
        // Receives were recorded under the key-normalized query; a caller
        // asking with the raw fields restriction must still find them.
        let reducer = EntitiesReducer;
        let state = reducer.reduce(
            &populated(),
            &EntityAction::ReceiveItems {
                kind: "postType".into(),
                name: "post".into(),
                records: vec![json!({"id": 1, "title": "one"})],
                query: Some(
                    EntityQuery::new()
                        .set("_fields", "title")
                        .with_key_field("id"),
                ),
                invalidate_cache: false,
            },
        );

        let records = get_entity_records(
            &state,
            &vec![json!("postType"), json!("post"), json!({"_fields": "title"})],
        );
        assert_eq!(records, json!([{"id": 1, "title": "one", "status": "draft"}]));
    }

    #[test]
    fn test_get_entity_records_orders_numeric_keys_numerically() {
        let reducer = EntitiesReducer;
        let state = reducer.reduce(
            &populated(),
            &EntityAction::ReceiveItems {
                kind: "postType".into(),
                name: "post".into(),
                records: vec![json!({"id": 10, "title": "ten"})],
                query: None,
                invalidate_cache: false,
            },
        );

        let records = get_entity_records(&state, &vec![json!("postType"), json!("post")]);
        let ids: Vec<&Value> = records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| &r["id"])
            .collect();
        assert_eq!(ids, vec![&json!(1), &json!(2), &json!(10)]);
    }

    #[test]
    fn test_get_entity_records_trivial_query_returns_collection() {
        let state = populated();
        let records = get_entity_records(&state, &vec![json!("postType"), json!("post")]);
        assert_eq!(records.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_can_user_lookup() {
        let reducer = EntitiesReducer;
        let state = reducer.reduce(
            &EntitiesState::default(),
            &EntityAction::ReceivePermission {
                key: "create/media".into(),
                allowed: true,
            },
        );

        assert_eq!(
            can_user(&state, &vec![json!("create"), json!("media")]),
            json!(true)
        );
        assert_eq!(
            can_user(&state, &vec![json!("delete"), json!("media")]),
            Value::Null
        );
    }

    #[test]
    fn test_get_entity_config() {
        let state = populated();
        let config = get_entity_config(&state, &vec![json!("postType"), json!("post")]);
        assert_eq!(config["base_path"], json!("/v2/posts"));
    }
}
