//! Application lifespan: custom startup/shutdown hooks around the server, followed by mandatory
//! container teardown.

use derive_more::Constructor;
use faststack_di::container::ContainerPtr;
use faststack_di::future::BoxFuture;
use faststack_di::instance_provider::ErrorPtr;
#[cfg(test)]
use mockall::automock;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Error, Debug)]
pub enum LifespanError {
    #[error("Startup error: {0}")]
    StartupError(#[source] ErrorPtr),
    #[error("Shutdown error: {0}")]
    ShutdownError(#[source] ErrorPtr),
}

/// Custom hooks run when the application starts and stops.
#[cfg_attr(test, automock)]
pub trait Lifespan: Send + Sync {
    /// Runs before the server starts accepting connections.
    fn startup(&self) -> BoxFuture<'_, Result<(), ErrorPtr>>;

    /// Runs after the server stops.
    fn shutdown(&self) -> BoxFuture<'_, Result<(), ErrorPtr>>;
}

pub type LifespanPtr = Arc<dyn Lifespan>;

/// Runs a server future inside the application lifespan.
#[derive(Constructor)]
pub struct LifespanManager {
    custom: Option<LifespanPtr>,
    container: ContainerPtr,
}

impl LifespanManager {
    #[inline]
    pub fn container(&self) -> &ContainerPtr {
        &self.container
    }

    /// Runs custom startup, `serve`, custom shutdown and container teardown, in that order.
    /// Teardown runs exactly once, also when a custom hook fails.
    pub async fn run<F: Future>(&self, serve: F) -> Result<F::Output, LifespanError> {
        if let Some(custom) = &self.custom {
            info!("Running startup hooks...");

            if let Err(error) = custom.startup().await {
                self.tear_down().await;
                return Err(LifespanError::StartupError(error));
            }
        }

        let output = serve.await;

        let shutdown = match &self.custom {
            Some(custom) => {
                info!("Running shutdown hooks...");
                custom
                    .shutdown()
                    .await
                    .map_err(LifespanError::ShutdownError)
            }
            None => Ok(()),
        };

        self.tear_down().await;
        shutdown.map(|_| output)
    }

    async fn tear_down(&self) {
        debug!(container = self.container.name(), "Tearing down application container.");
        self.container.tear_down().await;
    }
}

#[cfg(test)]
mod tests {
    use crate::app::lifespan::{LifespanError, LifespanManager, LifespanPtr, MockLifespan};
    use faststack_di::container::{Container, ContainerPtr};
    use faststack_di::future::FutureExt;
    use faststack_di::instance_provider::{convert_error, ComponentInstancePtr};
    use faststack_di::provider::{Provider, Singleton};
    use faststack_di::ResolveError;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn record(log: &Log, entry: &'static str) {
        log.lock().unwrap().push(entry);
    }

    async fn recording_container(log: &Log) -> ContainerPtr {
        let resource = Singleton::with_finalizer(|| async { Ok(1u8) }, {
            let log = log.clone();
            move |_: ComponentInstancePtr<u8>| {
                let log = log.clone();
                async move {
                    record(&log, "teardown");
                    Ok(())
                }
            }
        });
        resource.resolve().await.unwrap();

        Arc::new(
            Container::builder("recording")
                .with_provider("resource", resource)
                .build()
                .unwrap(),
        )
    }

    fn recording_lifespan(log: &Log, fail_startup: bool, fail_shutdown: bool) -> LifespanPtr {
        let mut lifespan = MockLifespan::new();

        let startup_log = log.clone();
        lifespan.expect_startup().times(1).returning(move || {
            record(&startup_log, "startup");
            async move {
                if fail_startup {
                    Err(convert_error(ResolveError::MissingContextItem(
                        "startup".to_string(),
                    )))
                } else {
                    Ok(())
                }
            }
            .boxed()
        });

        let shutdown_log = log.clone();
        lifespan
            .expect_shutdown()
            .times(if fail_startup { 0 } else { 1 })
            .returning(move || {
                record(&shutdown_log, "shutdown");
                async move {
                    if fail_shutdown {
                        Err(convert_error(ResolveError::MissingContextItem(
                            "shutdown".to_string(),
                        )))
                    } else {
                        Ok(())
                    }
                }
                .boxed()
            });

        Arc::new(lifespan)
    }

    #[tokio::test]
    async fn should_tear_down_without_custom_lifespan() {
        let log = Log::default();
        let manager = LifespanManager::new(None, recording_container(&log).await);

        let output = manager.run(async { record(&log, "serve") }).await;

        assert!(output.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["serve", "teardown"]);
    }

    #[tokio::test]
    async fn should_tear_down_after_custom_shutdown() {
        let log = Log::default();
        let manager = LifespanManager::new(
            Some(recording_lifespan(&log, false, false)),
            recording_container(&log).await,
        );

        let output = manager
            .run(async {
                record(&log, "serve");
                5
            })
            .await;

        assert_eq!(output.unwrap(), 5);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["startup", "serve", "shutdown", "teardown"]
        );
    }

    #[tokio::test]
    async fn should_tear_down_when_startup_fails() {
        let log = Log::default();
        let manager = LifespanManager::new(
            Some(recording_lifespan(&log, true, false)),
            recording_container(&log).await,
        );

        let output = manager.run(async { record(&log, "serve") }).await;

        assert!(matches!(output, Err(LifespanError::StartupError(_))));
        assert_eq!(*log.lock().unwrap(), vec!["startup", "teardown"]);
    }

    #[tokio::test]
    async fn should_tear_down_when_shutdown_fails() {
        let log = Log::default();
        let manager = LifespanManager::new(
            Some(recording_lifespan(&log, false, true)),
            recording_container(&log).await,
        );

        let output = manager.run(async { record(&log, "serve") }).await;

        assert!(matches!(output, Err(LifespanError::ShutdownError(_))));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["startup", "serve", "shutdown", "teardown"]
        );
    }
}
