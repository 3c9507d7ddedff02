//! Generic repositories for persisted entities.
//!
//! A repository is a struct whose first field is a [SqlRepository] of the managed [Entity]. The
//! [Repository](derive@Repository) derive resolves the entity type from that field declaration
//! and dereferences to it, so every repository gets [SqlRepository::get] for free:
//!
//! ```ignore
//! #[derive(sqlx::FromRow)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     const TABLE: &'static str = "users";
//! }
//!
//! #[derive(Repository)]
//! struct UserRepository {
//!     base: SqlRepository<User>,
//! }
//!
//! let user = repository.get(1i64).await?;
//! ```

use crate::db::DbSession;
use sqlx::any::AnyRow;
use sqlx::{Any, Encode, FromRow, Type};
use std::any::{type_name, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "derive")]
pub use faststack_derive::Repository;

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Entity persisted in a single table.
pub trait Entity: for<'r> FromRow<'r, AnyRow> + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;

    const PRIMARY_KEY: &'static str = "id";
}

/// Repository managing a single [Entity] type, fixed at declaration time.
pub trait Repository {
    type Model: Entity;
}

/// Runtime description of a managed type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelType {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl ModelType {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// Returns the entity type managed by given repository.
pub fn resolve_generic_type<R: Repository + ?Sized>() -> ModelType {
    ModelType::of::<R::Model>()
}

/// Base repository bound to a single session.
pub struct SqlRepository<M> {
    session: Arc<DbSession>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Entity> SqlRepository<M> {
    pub fn new(session: Arc<DbSession>) -> Self {
        Self {
            session,
            _model: PhantomData,
        }
    }

    #[inline]
    pub fn session(&self) -> &Arc<DbSession> {
        &self.session
    }

    /// Fetches an entity by its primary key.
    pub async fn get<K>(&self, pk: K) -> Result<Option<M>, OrmError>
    where
        K: for<'q> Encode<'q, Any> + Type<Any> + Send + 'static,
    {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = {}",
            M::TABLE,
            M::PRIMARY_KEY,
            self.session.placeholder(1)
        );

        debug!(table = M::TABLE, "Fetching entity by primary key.");

        let mut connection = self.session.connection().await;
        sqlx::query_as::<_, M>(&sql)
            .bind(pk)
            .fetch_optional(&mut **connection)
            .await
            .map_err(OrmError::from)
    }
}

impl<M: Entity> Repository for SqlRepository<M> {
    type Model = M;
}

impl<M> Clone for SqlRepository<M> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            _model: PhantomData,
        }
    }
}
