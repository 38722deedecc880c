//! Hente Core - Namespaced reactive stores with on-demand data resolution.
//!
//! A store pairs a caller-supplied reducer with named selectors. A selector
//! may carry a resolver: an async procedure that fetches the data the
//! selector reads. Selector calls stay synchronous and non-blocking; the
//! resolver is scheduled on a deferred task at most once per distinct
//! argument list, tracked by the resolution-state machinery in this crate.
//!
//! Stores live inside a [`Registry`], which also owns the advisory lock
//! manager resolvers use to serialize fetches against shared paths.

pub mod error;
pub mod locks;
pub mod registry;
pub mod resolution;
pub mod resolver;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use error::{ResolveError, StoreError};
pub use locks::{LockGuard, LockManager};
pub use registry::{AnyStore, Registry};
pub use resolution::{ResolutionState, ResolutionStatus, RunCache};
pub use resolver::{Resolver, ResolverContext};
pub use store::{DispatchEvent, Reducer, ReduxStore, StoreDescriptor, Subscription};
pub use types::{BoxFuture, SelectorArgs};
