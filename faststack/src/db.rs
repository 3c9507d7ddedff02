//! Database engine and sessions on top of the [sqlx] `Any` driver.

use crate::orm::OrmError;
use crate::settings::{DatabaseBackend, DatabaseDsn};
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Connection pool for the configured database. Connections are opened lazily, on first session.
#[derive(Clone, Debug)]
pub struct DbEngine {
    pool: AnyPool,
    backend: DatabaseBackend,
}

impl DbEngine {
    pub fn new(dsn: &DatabaseDsn) -> Result<Self, OrmError> {
        install_default_drivers();

        let options = if dsn.is_in_memory() {
            // every connection would see a different in-memory database
            AnyPoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new()
        };

        debug!(backend = ?dsn.backend(), "Creating database engine.");

        Ok(Self {
            pool: options.connect_lazy(dsn.to_driver_url())?,
            backend: dsn.backend(),
        })
    }

    #[inline]
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    #[inline]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Closes the pool, waiting for checked out connections to be returned.
    pub async fn close(&self) {
        debug!(backend = ?self.backend, "Closing database engine.");
        self.pool.close().await;
    }
}

/// Creates [DbSession]s bound to an engine.
#[derive(Clone, Debug)]
pub struct SessionMaker {
    engine: Arc<DbEngine>,
}

impl SessionMaker {
    pub fn new(engine: Arc<DbEngine>) -> Self {
        Self { engine }
    }

    /// Acquires a connection from the pool and wraps it in a new session.
    pub async fn session(&self) -> Result<DbSession, OrmError> {
        let connection = self.engine.pool.acquire().await?;

        Ok(DbSession {
            connection: Mutex::new(connection),
            backend: self.engine.backend,
        })
    }
}

/// Single database connection, returned to the pool when the session is dropped.
#[derive(Debug)]
pub struct DbSession {
    connection: Mutex<PoolConnection<Any>>,
    backend: DatabaseBackend,
}

impl DbSession {
    #[inline]
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Locks the underlying connection for running custom queries.
    pub async fn connection(&self) -> MutexGuard<'_, PoolConnection<Any>> {
        self.connection.lock().await
    }

    /// Executes a statement without parameters, returning the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64, OrmError> {
        let mut connection = self.connection().await;
        let result = sqlx::query(sql).execute(&mut **connection).await?;
        Ok(result.rows_affected())
    }

    /// Placeholder for the parameter at given 1-based position.
    pub fn placeholder(&self, position: usize) -> String {
        match self.backend {
            DatabaseBackend::Postgres => format!("${position}"),
            DatabaseBackend::MySql | DatabaseBackend::Sqlite => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{DbEngine, SessionMaker};
    use crate::settings::DatabaseDsn;
    use std::sync::Arc;

    fn memory_engine() -> Arc<DbEngine> {
        Arc::new(DbEngine::new(&DatabaseDsn::parse("sqlite:///:memory:").unwrap()).unwrap())
    }

    #[tokio::test]
    async fn should_share_in_memory_database_between_sessions() {
        let maker = SessionMaker::new(memory_engine());

        {
            let session = maker.session().await.unwrap();
            session
                .execute("CREATE TABLE items (id INTEGER PRIMARY KEY)")
                .await
                .unwrap();
        }

        let session = maker.session().await.unwrap();
        assert_eq!(
            session
                .execute("INSERT INTO items (id) VALUES (1), (2)")
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn should_not_connect_eagerly() {
        let dsn = DatabaseDsn::parse("postgresql://user@unreachable.invalid/db").unwrap();

        let engine = DbEngine::new(&dsn).unwrap();

        assert_eq!(engine.pool().size(), 0);
        engine.close().await;
    }

    #[tokio::test]
    async fn should_use_backend_placeholders() {
        let session = SessionMaker::new(memory_engine())
            .session()
            .await
            .unwrap();

        assert_eq!(session.placeholder(1), "?");
    }
}
