//! Dependency injection container for async applications.
//!
//! Instances are created by [providers](provider), each of which carries a sharing policy: a
//! process-wide [Singleton](provider::Singleton), a per-call [Factory](provider::Factory) or a
//! [ContextResource](provider::ContextResource) bound to the currently active
//! [ContainerContext](context::ContainerContext). Providers are grouped into
//! [containers](container), which can be connected together and torn down as a whole.
//!
//! ```
//! use faststack_di::context::ContainerContext;
//! use faststack_di::provider::{ContextResource, Provider, Singleton};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let greeting = Singleton::new(|| async { Ok("hello".to_string()) });
//! let counter = ContextResource::new(|| async { Ok(0u32) });
//!
//! assert_eq!(*greeting.resolve().await.unwrap(), "hello");
//!
//! // context resources are only available inside an active context
//! assert!(counter.resolve().await.is_err());
//! ContainerContext::new()
//!     .scope(async { assert!(counter.resolve().await.is_ok()) })
//!     .await;
//! # });
//! ```

pub mod container;
pub mod context;
mod error;
pub mod future;
pub mod instance_provider;
pub mod provider;
pub mod scope;

pub use error::{ContainerError, ResolveError};
