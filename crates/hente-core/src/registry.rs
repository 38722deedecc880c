use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::StoreError;
use crate::locks::LockManager;
use crate::store::{Reducer, ReduxStore, StoreDescriptor};
use crate::types::{BoxFuture, SelectorArgs};

/// Namespace-erased view of a registered store, for cross-store access.
pub trait AnyStore: Send + Sync {
    fn name(&self) -> &str;

    fn select_value(&self, selector: &str, args: SelectorArgs) -> Result<Value, StoreError>;

    fn resolve_select_value(
        &self,
        selector: &str,
        args: SelectorArgs,
    ) -> BoxFuture<Result<Value, StoreError>>;

    fn has_finished_resolution(&self, selector: &str, args: &SelectorArgs) -> bool;
}

impl<R: Reducer> AnyStore for ReduxStore<R> {
    fn name(&self) -> &str {
        ReduxStore::name(self)
    }

    fn select_value(&self, selector: &str, args: SelectorArgs) -> Result<Value, StoreError> {
        self.select(selector, args)
    }

    fn resolve_select_value(
        &self,
        selector: &str,
        args: SelectorArgs,
    ) -> BoxFuture<Result<Value, StoreError>> {
        let store = self.clone();
        let selector = selector.to_string();
        Box::pin(async move { store.resolve_select(&selector, args).await })
    }

    fn has_finished_resolution(&self, selector: &str, args: &SelectorArgs) -> bool {
        ReduxStore::has_finished_resolution(self, selector, args)
    }
}

/// Owns every registered store, keyed by namespace, plus the advisory
/// lock manager shared between their resolvers.
pub struct Registry {
    stores: RwLock<HashMap<String, Arc<dyn AnyStore>>>,
    locks: LockManager,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stores: RwLock::new(HashMap::new()),
            locks: LockManager::new(),
        })
    }

    /// Instantiate a store from its descriptor and register it under its
    /// namespace. The returned facade is the typed public surface; other
    /// stores reach it through [`Registry::store`].
    pub fn register<R: Reducer>(
        self: &Arc<Self>,
        descriptor: StoreDescriptor<R>,
    ) -> Result<ReduxStore<R>, StoreError> {
        let name = descriptor.name().to_string();
        let mut stores = self.stores.write().unwrap();
        if stores.contains_key(&name) {
            return Err(StoreError::DuplicateStore(name));
        }
        let store = ReduxStore::new(descriptor, Arc::downgrade(self));
        stores.insert(name, Arc::new(store.clone()));
        Ok(store)
    }

    pub fn store(&self, namespace: &str) -> Result<Arc<dyn AnyStore>, StoreError> {
        self.stores
            .read()
            .unwrap()
            .get(namespace)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStore(namespace.to_string()))
    }

    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }
}
