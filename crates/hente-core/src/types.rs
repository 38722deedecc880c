use std::future::Future;
use std::pin::Pin;

/// Ordered selector arguments.
///
/// Argument lists are compared structurally: two lists that are equal
/// value-by-value identify the same resolution key, regardless of where
/// they were allocated.
pub type SelectorArgs = Vec<serde_json::Value>;

/// Boxed future used at trait-object seams.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
