//! End-to-end resolution behavior: dedup, resolve_select, invalidation,
//! and subscription semantics over a small widget store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use hente_core::{
    Reducer, Registry, ReduxStore, ResolveError, Resolver, SelectorArgs, StoreDescriptor,
};

#[derive(Debug, Clone, PartialEq, Default)]
struct WidgetState {
    widgets: BTreeMap<i64, String>,
}

#[derive(Debug, Clone, PartialEq)]
enum WidgetAction {
    Receive {
        id: i64,
        label: String,
        invalidate: bool,
    },
    Noop,
}

struct WidgetReducer;

impl Reducer for WidgetReducer {
    type State = WidgetState;
    type Action = WidgetAction;

    fn initial_state(&self) -> WidgetState {
        WidgetState::default()
    }

    fn reduce(&self, state: &WidgetState, action: &WidgetAction) -> WidgetState {
        match action {
            WidgetAction::Receive { id, label, .. } => {
                let mut next = state.clone();
                next.widgets.insert(*id, label.clone());
                next
            }
            WidgetAction::Noop => state.clone(),
        }
    }
}

fn get_widget(state: &WidgetState, args: &SelectorArgs) -> Value {
    args.first()
        .and_then(Value::as_i64)
        .and_then(|id| state.widgets.get(&id))
        .map(|label| json!(label))
        .unwrap_or(Value::Null)
}

/// Store whose resolver "fetches" labels and counts how often it ran.
fn widget_store(fetches: Arc<AtomicUsize>) -> StoreDescriptor<WidgetReducer> {
    StoreDescriptor::new("widgets", WidgetReducer)
        .selector("get_widget", get_widget)
        .selector("count_widgets", |state: &WidgetState, _args| {
            json!(state.widgets.len())
        })
        .resolver(
            "get_widget",
            Resolver::new(move |ctx, args: SelectorArgs| {
                let fetches = Arc::clone(&fetches);
                async move {
                    let id = args
                        .first()
                        .and_then(Value::as_i64)
                        .ok_or_else(|| ResolveError::InvalidArgs("id must be a number".into()))?;
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    ctx.dispatch(WidgetAction::Receive {
                        id,
                        label: format!("widget-{id}"),
                        invalidate: false,
                    });
                    Ok(())
                }
            })
            .with_should_invalidate(|action, args| match action {
                WidgetAction::Receive {
                    id,
                    invalidate: true,
                    ..
                } => args.first().and_then(Value::as_i64) == Some(*id),
                _ => false,
            }),
        )
}

fn setup() -> (Arc<Registry>, ReduxStore<WidgetReducer>, Arc<AtomicUsize>) {
    let fetches = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let store = registry.register(widget_store(Arc::clone(&fetches))).unwrap();
    (registry, store, fetches)
}

#[tokio::test]
async fn test_duplicate_selects_resolve_once() {
    let (_registry, store, fetches) = setup();

    // Two synchronous calls with structurally equal args, before the
    // deferred resolver task has run at all.
    assert_eq!(store.select("get_widget", vec![json!(1)]).unwrap(), Value::Null);
    assert_eq!(store.select("get_widget", vec![json!(1)]).unwrap(), Value::Null);

    let value = store.resolve_select("get_widget", vec![json!(1)]).await.unwrap();
    assert_eq!(value, json!("widget-1"));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // Later calls hit the finished resolution entry.
    assert_eq!(store.select("get_widget", vec![json!(1)]).unwrap(), json!("widget-1"));
    tokio::task::yield_now().await;
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resolve_select_starts_resolution() {
    let (_registry, store, fetches) = setup();

    let value = store.resolve_select("get_widget", vec![json!(7)]).await.unwrap();
    assert_eq!(value, json!("widget-7"));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(store.has_finished_resolution("get_widget", &vec![json!(7)]));
}

#[tokio::test]
async fn test_distinct_args_resolve_separately() {
    let (_registry, store, fetches) = setup();

    store.resolve_select("get_widget", vec![json!(1)]).await.unwrap();
    store.resolve_select("get_widget", vec![json!(2)]).await.unwrap();

    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_resolve_select_without_resolver_is_immediate() {
    let (_registry, store, fetches) = setup();

    let value = store.resolve_select("count_widgets", vec![]).await.unwrap();
    assert_eq!(value, json!(0));
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalidation_forces_refetch() {
    let (_registry, store, fetches) = setup();

    store.resolve_select("get_widget", vec![json!(1)]).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // A receive flagged for invalidation clears the matching entry only.
    store.resolve_select("get_widget", vec![json!(2)]).await.unwrap();
    store.dispatch(WidgetAction::Receive {
        id: 1,
        label: "stale".into(),
        invalidate: true,
    });
    assert!(!store.has_started_resolution("get_widget", &vec![json!(1)]));
    assert!(store.has_finished_resolution("get_widget", &vec![json!(2)]));

    store.resolve_select("get_widget", vec![json!(1)]).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_subscribe_fires_once_per_change() {
    let (_registry, store, _fetches) = setup();

    let notifications = Arc::new(AtomicUsize::new(0));
    let subscription = {
        let notifications = Arc::clone(&notifications);
        store.subscribe(move || {
            notifications.fetch_add(1, Ordering::SeqCst);
        })
    };

    // No-op dispatch: reducer returns an equal state.
    store.dispatch(WidgetAction::Noop);
    assert_eq!(notifications.load(Ordering::SeqCst), 0);

    store.dispatch(WidgetAction::Receive {
        id: 1,
        label: "a".into(),
        invalidate: false,
    });
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    // Receiving the same label again changes nothing.
    store.dispatch(WidgetAction::Receive {
        id: 1,
        label: "a".into(),
        invalidate: false,
    });
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    store.dispatch(WidgetAction::Receive {
        id: 2,
        label: "b".into(),
        invalidate: false,
    });
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_manual_resolution_lifecycle() {
    let (_registry, store, _fetches) = setup();

    store.start_resolution("get_widget", vec![json!(1)]);
    assert!(store.has_started_resolution("get_widget", &vec![json!(1)]));
    assert!(!store.has_finished_resolution("get_widget", &vec![json!(1)]));

    store.finish_resolution("get_widget", vec![json!(1)]);
    assert!(store.has_finished_resolution("get_widget", &vec![json!(1)]));
    assert!(!store.has_finished_resolution("get_widget", &vec![json!(2)]));
}

#[tokio::test]
async fn test_pre_seeded_resolution_skips_fetch() {
    let (_registry, store, fetches) = setup();

    store.start_resolution("get_widget", vec![json!(5)]);
    store.finish_resolution("get_widget", vec![json!(5)]);
    store.dispatch(WidgetAction::Receive {
        id: 5,
        label: "seeded".into(),
        invalidate: false,
    });

    let value = store.resolve_select("get_widget", vec![json!(5)]).await.unwrap();
    assert_eq!(value, json!("seeded"));
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_resolver_still_finishes() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new();
    let store = registry
        .register(
            StoreDescriptor::new("widgets", WidgetReducer)
                .selector("get_widget", get_widget)
                .resolver("get_widget", {
                    let fetches = Arc::clone(&fetches);
                    Resolver::new(move |_ctx, _args: SelectorArgs| {
                        let fetches = Arc::clone(&fetches);
                        async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            Err(ResolveError::Fetch("boom".into()))
                        }
                    })
                }),
        )
        .unwrap();

    let value = store.resolve_select("get_widget", vec![json!(1)]).await.unwrap();
    assert_eq!(value, Value::Null);
    assert!(store.has_finished_resolution("get_widget", &vec![json!(1)]));

    // The failure is not retried on later access.
    store.select("get_widget", vec![json!(1)]).unwrap();
    tokio::task::yield_now().await;
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_has_resolver_flags() {
    let (_registry, store, _fetches) = setup();
    assert!(store.has_resolver("get_widget"));
    assert!(!store.has_resolver("count_widgets"));
    assert_eq!(
        store.selector_names(),
        vec!["count_widgets".to_string(), "get_widget".to_string()]
    );
}

#[tokio::test]
async fn test_thunk_receives_context() {
    let (_registry, store, _fetches) = setup();

    let label = store
        .dispatch_thunk(|ctx| async move {
            ctx.dispatch(WidgetAction::Receive {
                id: 3,
                label: "thunked".into(),
                invalidate: false,
            });
            ctx.select("get_widget", vec![json!(3)])
        })
        .await
        .unwrap();
    assert_eq!(label, json!("thunked"));
}
