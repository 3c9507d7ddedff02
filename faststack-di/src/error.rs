use crate::instance_provider::ErrorPtr;
use thiserror::Error;

/// Errors related to resolving instances from providers.
#[derive(Error, Clone, Debug)]
pub enum ResolveError {
    #[error("Cannot resolve context resource '{0}' outside of an active container context.")]
    NoActiveContext(&'static str),
    #[error("Cannot find named provider: {0}")]
    NoNamedProvider(String),
    #[error("Tried to downcast provider '{name}' to incompatible type: {target_type}")]
    IncompatibleProvider {
        name: String,
        target_type: &'static str,
    },
    #[error("Cannot find context item: {0}")]
    MissingContextItem(String),
    #[error("Tried to downcast context item '{key}' to incompatible type: {target_type}")]
    IncompatibleContextItem {
        key: String,
        target_type: &'static str,
    },
    #[error("Error constructing instance of '{type_name}': {source}")]
    ConstructionError {
        type_name: &'static str,
        #[source]
        source: ErrorPtr,
    },
}

/// Errors related to registering providers in containers.
#[derive(Error, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ContainerError {
    #[error("Attempted to register a duplicated provider with name: {0}")]
    DuplicateProviderName(String),
}
