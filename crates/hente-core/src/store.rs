use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::registry::Registry;
use crate::resolution::{ResolutionState, ResolutionStatus, RunCache};
use crate::resolver::{Resolver, ResolverContext};
use crate::types::SelectorArgs;

/// Pure state transition for one store's root state.
///
/// The reducer never sees resolution metadata; the store combines the two
/// into one cell internally and exposes only the root to consumers.
pub trait Reducer: Send + Sync + 'static {
    type State: Clone + PartialEq + Send + Sync + 'static;
    type Action: Clone + Send + Sync + std::fmt::Debug + 'static;

    fn initial_state(&self) -> Self::State;

    /// Compute the next state. Returning a value equal to the input makes
    /// the dispatch a no-op: no version bump, no listener notification.
    fn reduce(&self, state: &Self::State, action: &Self::Action) -> Self::State;
}

pub type SelectorFn<S> = Arc<dyn Fn(&S, &SelectorArgs) -> Value + Send + Sync>;

type Listener = Arc<dyn Fn() + Send + Sync>;
pub type DispatchObserver = Arc<dyn Fn(&DispatchEvent) + Send + Sync>;

/// Snapshot of one dispatch, handed to registered observers.
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub store: String,
    pub action: String,
    pub changed: bool,
}

/// Everything needed to instantiate a store: namespace, reducer, named
/// selectors and their resolvers, and optional dispatch observers.
///
/// Resolvers are normalized at registration time into the single
/// [`Resolver`] shape; there is no dynamic function-or-object variance
/// past this point.
pub struct StoreDescriptor<R: Reducer> {
    name: String,
    reducer: R,
    selectors: HashMap<String, SelectorFn<R::State>>,
    resolvers: HashMap<String, Resolver<R>>,
    observers: Vec<DispatchObserver>,
}

impl<R: Reducer> StoreDescriptor<R> {
    pub fn new(name: impl Into<String>, reducer: R) -> Self {
        Self {
            name: name.into(),
            reducer,
            selectors: HashMap::new(),
            resolvers: HashMap::new(),
            observers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(
        mut self,
        name: impl Into<String>,
        selector: impl Fn(&R::State, &SelectorArgs) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.selectors.insert(name.into(), Arc::new(selector));
        self
    }

    pub fn resolver(mut self, name: impl Into<String>, resolver: Resolver<R>) -> Self {
        self.resolvers.insert(name.into(), resolver);
        self
    }

    /// Register an observer invoked after every dispatch. Observers are
    /// injected here by the caller; the store never sniffs its environment
    /// for debugging hooks.
    pub fn observer(mut self, observer: impl Fn(&DispatchEvent) + Send + Sync + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }
}

struct Inner<S> {
    root: S,
    metadata: ResolutionState,
    version: u64,
}

pub(crate) struct StoreCore<R: Reducer> {
    name: String,
    reducer: R,
    selectors: HashMap<String, SelectorFn<R::State>>,
    resolvers: HashMap<String, Resolver<R>>,
    observers: Vec<DispatchObserver>,
    inner: RwLock<Inner<R::State>>,
    listeners: Mutex<(u64, BTreeMap<u64, Listener>)>,
    changes: watch::Sender<u64>,
    run_cache: RunCache,
    registry: Weak<Registry>,
}

/// Facade over one registered store.
///
/// Cheap to clone; every clone shares the same underlying state cell.
pub struct ReduxStore<R: Reducer> {
    core: Arc<StoreCore<R>>,
}

impl<R: Reducer> Clone for ReduxStore<R> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<R: Reducer> ReduxStore<R> {
    pub(crate) fn new(descriptor: StoreDescriptor<R>, registry: Weak<Registry>) -> Self {
        let root = descriptor.reducer.initial_state();
        let (changes, _) = watch::channel(0);
        Self {
            core: Arc::new(StoreCore {
                name: descriptor.name,
                reducer: descriptor.reducer,
                selectors: descriptor.selectors,
                resolvers: descriptor.resolvers,
                observers: descriptor.observers,
                inner: RwLock::new(Inner {
                    root,
                    metadata: ResolutionState::new(),
                    version: 0,
                }),
                listeners: Mutex::new((0, BTreeMap::new())),
                changes,
                run_cache: RunCache::new(),
                registry,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Clone of the current root state. Resolution metadata stays private.
    pub fn state(&self) -> R::State {
        self.core.inner.read().unwrap().root.clone()
    }

    pub fn selector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.core.selectors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_resolver(&self, selector: &str) -> bool {
        self.core.resolvers.contains_key(selector)
    }

    /// Dispatch a root action through the reduce pipeline.
    pub fn dispatch(&self, action: R::Action) {
        self.core.apply_root(action);
    }

    /// Run an async thunk with typed store access and the registry.
    pub async fn dispatch_thunk<F, Fut, T>(&self, thunk: F) -> Result<T, StoreError>
    where
        F: FnOnce(ResolverContext<R>) -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let registry = self.core.registry.upgrade().ok_or(StoreError::RegistryGone)?;
        thunk(ResolverContext::new(self.clone(), registry)).await
    }

    /// Call a selector by name.
    ///
    /// Always returns the current value synchronously. When the selector
    /// has a resolver, resolution is considered on a deferred task; the
    /// call itself never waits for it.
    pub fn select(&self, selector: &str, args: SelectorArgs) -> Result<Value, StoreError> {
        let value = self.core.select_raw(selector, &args)?;
        if self.core.resolvers.contains_key(selector) {
            self.maybe_resolve(selector, args);
        }
        Ok(value)
    }

    /// Trigger the selector and wait until its resolution has finished,
    /// then return a fresh value. Resolves immediately for selectors
    /// without a resolver or with an already-finished resolution.
    pub async fn resolve_select(
        &self,
        selector: &str,
        args: SelectorArgs,
    ) -> Result<Value, StoreError> {
        // Subscribe before triggering so a fast resolver cannot finish
        // between the check and the wait.
        let mut rx = self.core.changes.subscribe();
        let value = self.select(selector, args.clone())?;
        if !self.core.resolvers.contains_key(selector) {
            return Ok(value);
        }
        loop {
            if self.has_finished_resolution(selector, &args) {
                return self.core.select_raw(selector, &args);
            }
            rx.changed().await.map_err(|_| StoreError::RegistryGone)?;
        }
    }

    /// Register a change listener. Listeners fire once per state-changing
    /// dispatch, in subscription order, and never for no-op dispatches.
    /// Dropping the returned subscription unsubscribes.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut listeners = self.core.listeners.lock().unwrap();
            let id = listeners.0;
            listeners.0 += 1;
            listeners.1.insert(id, Arc::new(listener));
            id
        };
        let core = Arc::downgrade(&self.core);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(core) = core.upgrade() {
                    core.listeners.lock().unwrap().1.remove(&id);
                }
            })),
        }
    }

    pub fn resolution_status(
        &self,
        selector: &str,
        args: &SelectorArgs,
    ) -> Option<ResolutionStatus> {
        self.core.inner.read().unwrap().metadata.status(selector, args)
    }

    pub fn has_started_resolution(&self, selector: &str, args: &SelectorArgs) -> bool {
        self.resolution_status(selector, args).is_some()
    }

    pub fn has_finished_resolution(&self, selector: &str, args: &SelectorArgs) -> bool {
        self.resolution_status(selector, args) == Some(ResolutionStatus::Finished)
    }

    /// Record the start of resolution without running the resolver.
    /// Used by resolvers that pre-seed resolution state for other
    /// selectors after a bulk fetch.
    pub fn start_resolution(&self, selector: &str, args: SelectorArgs) {
        self.core.begin_resolution(selector, &args);
    }

    pub fn finish_resolution(&self, selector: &str, args: SelectorArgs) {
        self.core.finish_resolution(selector, &args);
    }

    /// Drop the resolution entry for the key so the next selector call
    /// re-resolves.
    pub fn invalidate_resolution(&self, selector: &str, args: &SelectorArgs) {
        self.core.invalidate_resolution(selector, args);
    }

    /// Decide whether the resolver for `selector` must run, and schedule
    /// it if so. The checks mirror the dedup contract: run-cache first,
    /// then the resolver's own fulfillment predicate, then existing
    /// resolution state.
    fn maybe_resolve(&self, selector: &str, args: SelectorArgs) {
        let core = &self.core;
        let Some(resolver) = core.resolvers.get(selector) else {
            return;
        };

        {
            let inner = core.inner.read().unwrap();
            if let Some(is_fulfilled) = &resolver.is_fulfilled {
                if is_fulfilled(&inner.root, &args) {
                    return;
                }
            }
            if inner.metadata.has_started(selector, &args) {
                return;
            }
        }

        if !core.run_cache.mark(selector, &args) {
            return;
        }

        let Some(registry) = core.registry.upgrade() else {
            core.run_cache.clear(selector, &args);
            return;
        };

        let resolver = resolver.clone();
        let store = self.clone();
        let selector = selector.to_string();
        tokio::spawn(async move {
            let core = &store.core;
            core.run_cache.clear(&selector, &args);
            // Another trigger (or a pre-seeded entry) may have won the
            // race; begin_resolution is the arbiter.
            if !core.begin_resolution(&selector, &args) {
                return;
            }

            let ctx = ResolverContext::new(store.clone(), registry);
            if let Err(err) = (resolver.fulfill)(ctx, args.clone()).await {
                tracing::warn!(
                    store = %core.name,
                    selector = %selector,
                    error = %err,
                    "resolver fulfill failed"
                );
            }
            // Finish unconditionally; a failed fulfill must not leave the
            // entry stuck at Started.
            core.finish_resolution(&selector, &args);
        });
    }
}

impl<R: Reducer> StoreCore<R> {
    fn select_raw(&self, selector: &str, args: &SelectorArgs) -> Result<Value, StoreError> {
        let f = self
            .selectors
            .get(selector)
            .ok_or_else(|| StoreError::UnknownSelector(selector.to_string()))?;
        let inner = self.inner.read().unwrap();
        Ok(f(&inner.root, args))
    }

    fn apply_root(&self, action: R::Action) {
        let changed = {
            let mut inner = self.inner.write().unwrap();

            // Resolver-cache invalidation: clear resolution entries whose
            // resolver asks for it, so future selector calls re-resolve.
            let mut invalidated = 0;
            for (name, resolver) in &self.resolvers {
                if let Some(predicate) = &resolver.should_invalidate {
                    invalidated +=
                        inner.metadata.invalidate_matching(name, |args| predicate(&action, args));
                }
            }

            let next = self.reducer.reduce(&inner.root, &action);
            let root_changed = next != inner.root;
            if root_changed {
                inner.root = next;
            }

            let changed = root_changed || invalidated > 0;
            if changed {
                inner.version += 1;
            }
            changed
        };

        self.after_dispatch(|| format!("{action:?}"), changed);
    }

    fn begin_resolution(&self, selector: &str, args: &SelectorArgs) -> bool {
        let began = {
            let mut inner = self.inner.write().unwrap();
            let began = inner.metadata.begin(selector, args);
            if began {
                inner.version += 1;
            }
            began
        };
        if began {
            tracing::debug!(store = %self.name, selector = %selector, "resolution started");
            self.after_dispatch(|| format!("start_resolution {selector} {args:?}"), true);
        }
        began
    }

    fn finish_resolution(&self, selector: &str, args: &SelectorArgs) {
        let changed = {
            let mut inner = self.inner.write().unwrap();
            let changed = inner.metadata.finish(selector, args);
            if changed {
                inner.version += 1;
            }
            changed
        };
        if changed {
            tracing::debug!(store = %self.name, selector = %selector, "resolution finished");
        }
        self.after_dispatch(|| format!("finish_resolution {selector} {args:?}"), changed);
    }

    fn invalidate_resolution(&self, selector: &str, args: &SelectorArgs) {
        let changed = {
            let mut inner = self.inner.write().unwrap();
            let changed = inner.metadata.invalidate(selector, args);
            if changed {
                inner.version += 1;
            }
            changed
        };
        self.after_dispatch(|| format!("invalidate_resolution {selector} {args:?}"), changed);
    }

    /// Notify after the state lock is released: listeners and the version
    /// channel only when something changed, observers always.
    fn after_dispatch(&self, describe: impl FnOnce() -> String, changed: bool) {
        if changed {
            let version = self.inner.read().unwrap().version;
            let _ = self.changes.send(version);
            let listeners: Vec<Listener> =
                self.listeners.lock().unwrap().1.values().cloned().collect();
            for listener in listeners {
                listener();
            }
        }
        if !self.observers.is_empty() {
            let event = DispatchEvent {
                store: self.name.clone(),
                action: describe(),
                changed,
            };
            for observer in &self.observers {
                observer(&event);
            }
        }
    }
}

/// Handle for a registered change listener; unsubscribes exactly once,
/// on drop.
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}
