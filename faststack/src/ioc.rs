//! Default container declaring framework resources.
//!
//! [FaststackContainer] knows how to construct settings, the database engine, sessions and the
//! current request handle. Settings and the engine are shared for the container lifetime, while a
//! [DbSession] is created once per request context and released when the context exits.

use crate::app::context::HttpConnection;
use crate::db::{DbEngine, DbSession, SessionMaker};
use crate::settings::FaststackSettings;
use config::Map;
use faststack_di::container::{BaseContainer, ConnectedContainers, ContainerPtr};
use faststack_di::context::fetch_context_item;
use faststack_di::instance_provider::{convert_error, ComponentInstancePtr};
use faststack_di::provider::{AnyProvider, ContextResource, Factory, Provider, Singleton};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Key under which the current [HttpConnection] is published in the request context.
pub const REQUEST_CONTEXT_KEY: &str = "http_request";

/// Key under which the container serving the current request is published in the request context.
pub const APP_CONTAINER_KEY: &str = "app_container";

static GLOBAL_CONTAINER: Lazy<Arc<FaststackContainer>> =
    Lazy::new(|| Arc::new(FaststackContainer::new()));

pub struct FaststackContainer {
    pub settings: Singleton<FaststackSettings>,
    pub db_engine: Singleton<DbEngine>,
    pub db_session_maker: Factory<SessionMaker>,
    pub db_session: ContextResource<DbSession>,
    pub context_request: Factory<HttpConnection>,
    connected: ConnectedContainers,
}

impl FaststackContainer {
    /// Creates a container reading settings from the process environment.
    pub fn new() -> Self {
        Self::with_settings(Singleton::new(|| async {
            FaststackSettings::from_env().map_err(convert_error)
        }))
    }

    /// Creates a container reading settings from given key/value pairs instead of the process
    /// environment.
    pub fn with_settings_source(values: Map<String, String>) -> Self {
        Self::with_settings(Singleton::new(move || {
            let values = values.clone();
            async move { FaststackSettings::from_map(values).map_err(convert_error) }
        }))
    }

    /// Creates a container using given settings provider.
    pub fn with_settings(settings: Singleton<FaststackSettings>) -> Self {
        let db_engine = Singleton::with_finalizer(
            {
                let settings = settings.clone();
                move || {
                    let settings = settings.clone();
                    async move {
                        let settings = settings.resolve().await.map_err(convert_error)?;
                        DbEngine::new(settings.db_dsn()).map_err(convert_error)
                    }
                }
            },
            |engine: ComponentInstancePtr<DbEngine>| async move {
                engine.close().await;
                Ok(())
            },
        );

        let db_session_maker = Factory::new({
            let db_engine = db_engine.clone();
            move || {
                let db_engine = db_engine.clone();
                async move {
                    let engine = db_engine.resolve().await.map_err(convert_error)?;
                    Ok(SessionMaker::new(engine))
                }
            }
        });

        let db_session = ContextResource::new({
            let db_session_maker = db_session_maker.clone();
            move || {
                let db_session_maker = db_session_maker.clone();
                async move {
                    let maker = db_session_maker.resolve().await.map_err(convert_error)?;
                    maker.session().await.map_err(convert_error)
                }
            }
        });

        let context_request = Factory::new(|| async {
            fetch_context_item::<HttpConnection>(REQUEST_CONTEXT_KEY)
                .map(|connection| connection.as_ref().clone())
                .map_err(convert_error)
        });

        Self {
            settings,
            db_engine,
            db_session_maker,
            db_session,
            context_request,
            connected: Default::default(),
        }
    }

    /// Process-wide container, created on first access.
    pub fn global() -> &'static Arc<FaststackContainer> {
        &GLOBAL_CONTAINER
    }
}

/// Container serving the current request, or the [global](FaststackContainer::global) one when
/// none is published.
pub fn current_container() -> ContainerPtr {
    fetch_context_item::<ContainerPtr>(APP_CONTAINER_KEY)
        .map(|container| container.as_ref().clone())
        .unwrap_or_else(|_| FaststackContainer::global().clone() as ContainerPtr)
}

impl Default for FaststackContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseContainer for FaststackContainer {
    fn name(&self) -> &str {
        "FaststackContainer"
    }

    fn providers(&self) -> Vec<(&str, &dyn AnyProvider)> {
        vec![
            ("settings", &self.settings as &dyn AnyProvider),
            ("db_engine", &self.db_engine as &dyn AnyProvider),
            ("db_session_maker", &self.db_session_maker as &dyn AnyProvider),
            ("db_session", &self.db_session as &dyn AnyProvider),
            ("context_request", &self.context_request as &dyn AnyProvider),
        ]
    }

    fn connected_containers(&self) -> &ConnectedContainers {
        &self.connected
    }
}
