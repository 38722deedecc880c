//! Hente Entities - REST-backed entity records on top of the hente store.
//!
//! Registers an `entities` store whose resolvers fetch records from a
//! REST API on first selector access, serialize concurrent fetches with
//! the registry's advisory locks, and cache permission probes.

pub mod actions;
pub mod client;
pub mod config;
pub mod query;
pub mod resolvers;
pub mod selectors;
pub mod state;

// Re-exports for convenience
pub use actions::EntityAction;
pub use client::{ApiClient, ApiError, HttpApiClient, ProbeMethod, ProbeResponse};
pub use config::{ApiConfig, ConfigError, EntityConfig};
pub use query::EntityQuery;
pub use resolvers::{entities_store, ENTITIES_STORE};
pub use state::{EntitiesReducer, EntitiesState, EntityKey};
