//! Resolvers for the entities store.
//!
//! Each record resolver follows the same shape: resolve the entity
//! config (itself a nested resolution), take a shared advisory lock on
//! the record path, fetch, dispatch a receive-action. The lock guard
//! releases on every exit path; fetch failures are logged and swallowed
//! so a failing endpoint is not hammered on every selector access.

use std::sync::Arc;

use serde_json::{json, Value};

use hente_core::{ResolveError, Resolver, ResolverContext, SelectorArgs, StoreDescriptor};

use crate::actions::EntityAction;
use crate::client::{ApiClient, ProbeMethod};
use crate::config::EntityConfig;
use crate::query::EntityQuery;
use crate::selectors;
use crate::state::{EntitiesReducer, EntitiesState};

/// Namespace the entities store registers under.
pub const ENTITIES_STORE: &str = "entities";

/// Build the entities store descriptor: selectors, resolvers, reducer.
///
/// `configs` is the set of known entities; the `get_entity_configs`
/// resolver loads them into state lazily, per kind, which is the nested
/// resolution the record resolvers await before building request paths.
pub fn entities_store<C: ApiClient>(
    client: Arc<C>,
    configs: Vec<EntityConfig>,
) -> StoreDescriptor<EntitiesReducer> {
    let configs = Arc::new(configs);
    StoreDescriptor::new(ENTITIES_STORE, EntitiesReducer)
        .selector("get_entity_configs", selectors::get_entity_configs)
        .selector("get_entity_config", selectors::get_entity_config)
        .selector("get_entity_record", selectors::get_entity_record)
        .selector("get_entity_records", selectors::get_entity_records)
        .selector("can_user", selectors::can_user)
        .resolver("get_entity_configs", get_entity_configs_resolver(configs))
        .resolver("get_entity_record", get_entity_record_resolver(Arc::clone(&client)))
        .resolver(
            "get_entity_records",
            get_entity_records_resolver(Arc::clone(&client)),
        )
        .resolver("can_user", can_user_resolver(client))
}

fn require_str(args: &SelectorArgs, index: usize, what: &str) -> Result<String, ResolveError> {
    args.get(index)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            ResolveError::InvalidArgs(format!("argument {index} ({what}) must be a string"))
        })
}

fn require_key(args: &SelectorArgs, index: usize) -> Result<String, ResolveError> {
    selectors::arg_key(args, index).ok_or_else(|| {
        ResolveError::InvalidArgs(format!(
            "argument {index} (record key) must be a string or number"
        ))
    })
}

/// Await the nested config resolution, then read the config from state.
async fn resolve_config(
    ctx: &ResolverContext<EntitiesReducer>,
    kind: &str,
    name: &str,
) -> Result<EntityConfig, ResolveError> {
    ctx.resolve_select("get_entity_configs", vec![json!(kind)])
        .await?;
    ctx.state()
        .config(kind, name)
        .cloned()
        .ok_or_else(|| ResolveError::InvalidArgs(format!("unknown entity: {kind}/{name}")))
}

/// True exactly for receive/remove actions on the same `(kind, name)`
/// that were flagged to invalidate caches.
fn invalidates_collection(action: &EntityAction, args: &SelectorArgs) -> bool {
    let (kind, name, flagged) = match action {
        EntityAction::ReceiveItems {
            kind,
            name,
            invalidate_cache,
            ..
        }
        | EntityAction::RemoveItems {
            kind,
            name,
            invalidate_cache,
            ..
        } => (kind, name, *invalidate_cache),
        _ => return false,
    };
    flagged
        && args.first().and_then(Value::as_str) == Some(kind.as_str())
        && args.get(1).and_then(Value::as_str) == Some(name.as_str())
}

fn get_entity_configs_resolver(configs: Arc<Vec<EntityConfig>>) -> Resolver<EntitiesReducer> {
    Resolver::new(move |ctx, args: SelectorArgs| {
        let configs = Arc::clone(&configs);
        async move {
            let kind = require_str(&args, 0, "kind")?;
            let matched: Vec<EntityConfig> =
                configs.iter().filter(|c| c.kind == kind).cloned().collect();
            ctx.dispatch(EntityAction::ReceiveEntityConfigs(matched));
            Ok(())
        }
    })
}

fn get_entity_record_resolver<C: ApiClient>(client: Arc<C>) -> Resolver<EntitiesReducer> {
    Resolver::new(move |ctx: ResolverContext<EntitiesReducer>, args: SelectorArgs| {
        let client = Arc::clone(&client);
        async move {
            let kind = require_str(&args, 0, "kind")?;
            let name = require_str(&args, 1, "name")?;
            let key = require_key(&args, 2)?;
            let query = args.get(3).and_then(EntityQuery::from_value);

            let config = resolve_config(&ctx, &kind, &name).await?;

            let _lock = ctx
                .locks()
                .acquire(
                    ctx.store_name(),
                    &["entities", "data", kind.as_str(), name.as_str(), key.as_str()],
                    false,
                )
                .await;

            let query = query.unwrap_or_default().with_key_field(&config.key);

            // An equivalent collection fetch may already have produced
            // this record; reuse it instead of refetching.
            if !query.is_trivial() {
                let state = ctx.state();
                let covered = state
                    .queried_keys(&kind, &name, &query)
                    .is_some_and(|keys| keys.iter().any(|k| k == &key))
                    && state.record(&kind, &name, &key).is_some();
                if covered {
                    return Ok(());
                }
            }

            let path = format!("{}/{}?{}", config.base_path, key, query.to_query_string());
            match client.get_json(&path).await {
                Ok(record) => {
                    let provenance = if query.is_trivial() { None } else { Some(query) };
                    ctx.dispatch(EntityAction::ReceiveItems {
                        kind,
                        name,
                        records: vec![record],
                        query: provenance,
                        invalidate_cache: false,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        kind = %kind,
                        name = %name,
                        key = %key,
                        error = %err,
                        "entity record fetch failed"
                    );
                }
            }
            Ok(())
        }
    })
    .with_should_invalidate(invalidates_collection)
}

fn get_entity_records_resolver<C: ApiClient>(client: Arc<C>) -> Resolver<EntitiesReducer> {
    Resolver::new(move |ctx: ResolverContext<EntitiesReducer>, args: SelectorArgs| {
        let client = Arc::clone(&client);
        async move {
            let kind = require_str(&args, 0, "kind")?;
            let name = require_str(&args, 1, "name")?;
            let query = args
                .get(2)
                .and_then(EntityQuery::from_value)
                .unwrap_or_default();

            let config = resolve_config(&ctx, &kind, &name).await?;

            let _lock = ctx
                .locks()
                .acquire(
                    ctx.store_name(),
                    &["entities", "data", kind.as_str(), name.as_str()],
                    false,
                )
                .await;

            let query = query.with_key_field(&config.key);
            let path = format!("{}?{}", config.base_path, query.to_query_string());
            let records = match client.get_json(&path).await {
                Ok(Value::Array(records)) => records,
                Ok(_) => {
                    tracing::warn!(kind = %kind, name = %name, "expected an array of records");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        kind = %kind,
                        name = %name,
                        error = %err,
                        "entity records fetch failed"
                    );
                    return Ok(());
                }
            };

            let unrestricted = query.fields().is_none();
            let record_keys: Vec<Value> = records
                .iter()
                .filter_map(|r| r.get(&config.key).cloned())
                .collect();

            ctx.dispatch(EntityAction::ReceiveItems {
                kind: kind.clone(),
                name: name.clone(),
                records,
                query: Some(query),
                invalidate_cache: false,
            });

            // Pre-seed single-record resolution for every fetched record,
            // so a later lookup by key does not fetch again. Only safe
            // when the response carried complete records.
            if unrestricted {
                for key in record_keys {
                    let record_args = vec![json!(kind), json!(name), key];
                    ctx.start_resolution("get_entity_record", record_args.clone());
                    ctx.finish_resolution("get_entity_record", record_args);
                }
            }
            Ok(())
        }
    })
    .with_should_invalidate(invalidates_collection)
}

fn can_user_resolver<C: ApiClient>(client: Arc<C>) -> Resolver<EntitiesReducer> {
    Resolver::new(move |ctx: ResolverContext<EntitiesReducer>, args: SelectorArgs| {
        let client = Arc::clone(&client);
        async move {
            let action = require_str(&args, 0, "action")?;
            let resource = require_str(&args, 1, "resource")?;
            let id = selectors::arg_key(&args, 2);

            let verb = match action.as_str() {
                "create" => "POST",
                "read" => "GET",
                "update" => "PUT",
                "delete" => "DELETE",
                other => {
                    return Err(ResolveError::InvalidArgs(format!(
                        "unknown permission action: {other}"
                    )))
                }
            };

            let (method, path) = match &id {
                Some(id) => (ProbeMethod::Get, format!("/{resource}/{id}")),
                None => (ProbeMethod::Options, format!("/{resource}")),
            };

            let response = match client.probe(method, &path).await {
                Ok(response) => response,
                Err(err) => {
                    // No dispatch: a previously cached permission, if any,
                    // stays in place.
                    tracing::warn!(
                        action = %action,
                        resource = %resource,
                        error = %err,
                        "permission probe failed"
                    );
                    return Ok(());
                }
            };

            ctx.dispatch(EntityAction::ReceivePermission {
                key: selectors::permission_key(&action, &resource, id.as_deref()),
                allowed: response.allows(verb),
            });
            Ok(())
        }
    })
    .with_is_fulfilled(|state: &EntitiesState, args: &SelectorArgs| {
        let (Some(action), Some(resource)) =
            (args.first().and_then(Value::as_str), args.get(1).and_then(Value::as_str))
        else {
            return false;
        };
        let id = selectors::arg_key(args, 2);
        state
            .permissions
            .contains_key(&selectors::permission_key(action, resource, id.as_deref()))
    })
}
