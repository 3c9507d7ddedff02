//! Handler extractors resolving container dependencies.

use crate::app::context::HttpConnection;
use crate::db::DbSession;
use crate::ioc::current_container;
use crate::settings::FaststackSettings;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use faststack_di::container::TypedContainer;
use faststack_di::future::{BoxFuture, FutureExt};
use faststack_di::instance_provider::ComponentInstancePtr;
use faststack_di::ResolveError;
use std::any::type_name;
use std::ops::Deref;
use tracing::error;

/// Names a dependency which can be resolved by the [Depends] extractor.
pub trait ProviderKey: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn resolve() -> BoxFuture<'static, Result<ComponentInstancePtr<Self::Output>, ResolveError>>;
}

/// Resolves a named provider from the container serving the current request.
pub fn resolve_from_app_container<T: Send + Sync + 'static>(
    name: &'static str,
) -> BoxFuture<'static, Result<ComponentInstancePtr<T>, ResolveError>> {
    async move { current_container().resolve_typed::<T>(name).await }.boxed()
}

/// Extractor resolving the provider named by `K`. Resolution happens inside the request context,
/// so context resources are shared by all extractors of a single request.
///
/// ```no_run
/// use faststack::app::extract::{ContextRequest, Depends};
///
/// async fn handler(Depends(connection): Depends<ContextRequest>) -> String {
///     connection.user_agent().unwrap_or_default().to_string()
/// }
/// ```
pub struct Depends<K: ProviderKey>(pub ComponentInstancePtr<K::Output>);

impl<K: ProviderKey> Deref for Depends<K> {
    type Target = K::Output;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S: Send + Sync, K: ProviderKey> FromRequestParts<S> for Depends<K> {
    type Rejection = DependencyRejection;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        K::resolve()
            .await
            .map(Depends)
            .map_err(|error| DependencyRejection {
                type_name: type_name::<K::Output>(),
                error,
            })
    }
}

/// Rejection returned when a dependency cannot be resolved. Responds with 500.
#[derive(Debug)]
pub struct DependencyRejection {
    type_name: &'static str,
    error: ResolveError,
}

impl DependencyRejection {
    #[inline]
    pub fn error(&self) -> &ResolveError {
        &self.error
    }
}

impl IntoResponse for DependencyRejection {
    fn into_response(self) -> Response {
        error!(type_name = self.type_name, error = %self.error, "Cannot resolve dependency.");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Current [HttpConnection], published by the application.
pub struct ContextRequest;

impl ProviderKey for ContextRequest {
    type Output = HttpConnection;

    fn resolve() -> BoxFuture<'static, Result<ComponentInstancePtr<HttpConnection>, ResolveError>> {
        resolve_from_app_container("context_request")
    }
}

/// Request [DbSession] from the `db_session` provider of the application container.
pub struct Session;

impl ProviderKey for Session {
    type Output = DbSession;

    fn resolve() -> BoxFuture<'static, Result<ComponentInstancePtr<DbSession>, ResolveError>> {
        resolve_from_app_container("db_session")
    }
}

/// [FaststackSettings] from the `settings` provider of the application container.
pub struct Settings;

impl ProviderKey for Settings {
    type Output = FaststackSettings;

    fn resolve() -> BoxFuture<'static, Result<ComponentInstancePtr<FaststackSettings>, ResolveError>>
    {
        resolve_from_app_container("settings")
    }
}
