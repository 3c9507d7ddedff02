//! Pointer types shared by all providers.

use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// Shared pointer to a resolved instance.
pub type ComponentInstancePtr<T> = Arc<T>;

/// Type-erased instance pointer, used by scopes and named resolution.
pub type ComponentInstanceAnyPtr = ComponentInstancePtr<dyn Any + Send + Sync + 'static>;

/// Type-erased error returned by user-supplied constructors and finalizers.
pub type ErrorPtr = Arc<dyn Error + Send + Sync>;

/// Wraps any error in an [ErrorPtr].
pub fn convert_error<E: Error + Send + Sync + 'static>(error: E) -> ErrorPtr {
    Arc::new(error) as ErrorPtr
}
