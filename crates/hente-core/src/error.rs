use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown selector: {0}")]
    UnknownSelector(String),

    #[error("Unknown store: {0}")]
    UnknownStore(String),

    #[error("Store already registered: {0}")]
    DuplicateStore(String),

    #[error("Registry dropped before the operation completed")]
    RegistryGone,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid resolver arguments: {0}")]
    InvalidArgs(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
