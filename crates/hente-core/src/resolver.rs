use std::sync::Arc;

use serde_json::Value;

use crate::error::{ResolveError, StoreError};
use crate::locks::LockManager;
use crate::registry::Registry;
use crate::store::{Reducer, ReduxStore};
use crate::types::{BoxFuture, SelectorArgs};

pub type FulfillFn<R> = Arc<
    dyn Fn(ResolverContext<R>, SelectorArgs) -> BoxFuture<Result<(), ResolveError>> + Send + Sync,
>;
pub type IsFulfilledFn<S> = Arc<dyn Fn(&S, &SelectorArgs) -> bool + Send + Sync>;
pub type ShouldInvalidateFn<A> = Arc<dyn Fn(&A, &SelectorArgs) -> bool + Send + Sync>;

/// Async data resolver bound to a selector.
///
/// `fulfill` runs at most once per distinct argument list (until the
/// resolution entry is invalidated) and populates the store by
/// dispatching actions. The optional predicates refine when it runs:
/// `is_fulfilled` short-circuits resolution when the state already holds
/// the data, `should_invalidate` clears finished resolutions in response
/// to matching dispatched actions.
pub struct Resolver<R: Reducer> {
    pub(crate) fulfill: FulfillFn<R>,
    pub(crate) is_fulfilled: Option<IsFulfilledFn<R::State>>,
    pub(crate) should_invalidate: Option<ShouldInvalidateFn<R::Action>>,
}

impl<R: Reducer> Clone for Resolver<R> {
    fn clone(&self) -> Self {
        Self {
            fulfill: Arc::clone(&self.fulfill),
            is_fulfilled: self.is_fulfilled.clone(),
            should_invalidate: self.should_invalidate.clone(),
        }
    }
}

impl<R: Reducer> Resolver<R> {
    pub fn new<F, Fut>(fulfill: F) -> Self
    where
        F: Fn(ResolverContext<R>, SelectorArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ResolveError>> + Send + 'static,
    {
        Self {
            fulfill: Arc::new(move |ctx, args| Box::pin(fulfill(ctx, args))),
            is_fulfilled: None,
            should_invalidate: None,
        }
    }

    pub fn with_is_fulfilled(
        mut self,
        predicate: impl Fn(&R::State, &SelectorArgs) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_fulfilled = Some(Arc::new(predicate));
        self
    }

    pub fn with_should_invalidate(
        mut self,
        predicate: impl Fn(&R::Action, &SelectorArgs) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_invalidate = Some(Arc::new(predicate));
        self
    }
}

/// Explicit context handed to resolver fulfill effects and thunks.
///
/// Carries typed access to the owning store plus the registry for
/// cross-store reads and the advisory lock manager. Nothing here is
/// injected dynamically; resolvers receive everything they may touch as
/// this one parameter.
pub struct ResolverContext<R: Reducer> {
    store: ReduxStore<R>,
    registry: Arc<Registry>,
}

impl<R: Reducer> Clone for ResolverContext<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: Reducer> ResolverContext<R> {
    pub(crate) fn new(store: ReduxStore<R>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &ReduxStore<R> {
        &self.store
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn locks(&self) -> &LockManager {
        self.registry.locks()
    }

    pub fn dispatch(&self, action: R::Action) {
        self.store.dispatch(action);
    }

    pub fn state(&self) -> R::State {
        self.store.state()
    }

    pub fn select(&self, selector: &str, args: SelectorArgs) -> Result<Value, StoreError> {
        self.store.select(selector, args)
    }

    pub async fn resolve_select(
        &self,
        selector: &str,
        args: SelectorArgs,
    ) -> Result<Value, StoreError> {
        self.store.resolve_select(selector, args).await
    }

    /// Pre-seed resolution state for another selector, typically after a
    /// bulk fetch already produced the data that selector would resolve.
    pub fn start_resolution(&self, selector: &str, args: SelectorArgs) {
        self.store.start_resolution(selector, args);
    }

    pub fn finish_resolution(&self, selector: &str, args: SelectorArgs) {
        self.store.finish_resolution(selector, args);
    }
}
