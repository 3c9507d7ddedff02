use axum::body::{to_bytes, Body};
use axum::extract::Path;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use faststack::app::extract::{Depends, Session};
use faststack::app::AppBuilder;
use faststack::db::DbSession;
use faststack::di::container::ContainerPtr;
use faststack::di::context::ContainerContext;
use faststack::di::provider::Provider;
use faststack::ioc::FaststackContainer;
use faststack::orm::{resolve_generic_type, Entity, ModelType, Repository, SqlRepository};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(sqlx::FromRow, Debug, PartialEq, Eq)]
struct User {
    id: i64,
    name: String,
}

impl Entity for User {
    const TABLE: &'static str = "users";
}

#[derive(sqlx::FromRow, Debug, PartialEq, Eq)]
struct Article {
    slug: String,
    title: String,
}

impl Entity for Article {
    const TABLE: &'static str = "articles";
    const PRIMARY_KEY: &'static str = "slug";
}

#[derive(Repository)]
struct UserRepository {
    base: SqlRepository<User>,
}

#[derive(Repository)]
struct ArticleRepository(SqlRepository<Article>);

fn memory_container() -> FaststackContainer {
    FaststackContainer::with_settings_source(
        [
            ("DB_DSN".to_string(), "sqlite:///:memory:".to_string()),
            ("SECRET_KEY".to_string(), "test-secret".to_string()),
        ]
        .into_iter()
        .collect(),
    )
}

async fn create_schema(session: &DbSession) {
    for statement in [
        "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "INSERT OR REPLACE INTO users (id, name) VALUES (1, 'alice'), (2, 'bob')",
        "CREATE TABLE IF NOT EXISTS articles (slug TEXT PRIMARY KEY, title TEXT NOT NULL)",
        "INSERT OR REPLACE INTO articles (slug, title) VALUES ('hello', 'Hello world')",
    ] {
        session.execute(statement).await.unwrap();
    }
}

async fn user_name(Path(id): Path<i64>, Depends(session): Depends<Session>) -> Response {
    let repository = UserRepository {
        base: SqlRepository::new(session),
    };

    match repository.get(id).await {
        Ok(Some(user)) => user.name.into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response(),
    }
}

#[test]
fn should_resolve_managed_type() {
    assert_eq!(
        resolve_generic_type::<UserRepository>(),
        ModelType::of::<User>()
    );
    assert_eq!(
        resolve_generic_type::<ArticleRepository>(),
        ModelType::of::<Article>()
    );
    assert_ne!(
        resolve_generic_type::<UserRepository>(),
        resolve_generic_type::<ArticleRepository>()
    );
    assert_eq!(
        resolve_generic_type::<SqlRepository<User>>().type_name,
        std::any::type_name::<User>()
    );
}

#[tokio::test]
async fn should_get_by_primary_key() {
    let container = memory_container();

    ContainerContext::new()
        .scope(async {
            let session = container.db_session.resolve().await.unwrap();
            create_schema(&session).await;

            let users = UserRepository {
                base: SqlRepository::new(session.clone()),
            };
            assert_eq!(
                users.get(1i64).await.unwrap(),
                Some(User {
                    id: 1,
                    name: "alice".to_string()
                })
            );
            assert_eq!(users.get(42i64).await.unwrap(), None);

            let articles = ArticleRepository(SqlRepository::new(session));
            assert_eq!(
                articles.get("hello".to_string()).await.unwrap(),
                Some(Article {
                    slug: "hello".to_string(),
                    title: "Hello world".to_string()
                })
            );
        })
        .await;
}

#[tokio::test]
async fn should_use_app_container_session_in_handlers() {
    let container = Arc::new(memory_container());
    let engine = container.db_engine.resolve().await.unwrap();
    ContainerContext::new()
        .scope(async {
            create_schema(&container.db_session.resolve().await.unwrap()).await;
        })
        .await;

    let app = AppBuilder::new()
        .with_container(container.clone() as ContainerPtr)
        .build()
        .route("/users/:id", get(user_name));

    let (found, missing) = app
        .run_with(|router| async move {
            let found = router
                .clone()
                .oneshot(Request::get("/users/2").body(Body::empty()).unwrap())
                .await
                .unwrap();
            let missing = router
                .oneshot(Request::get("/users/3").body(Body::empty()).unwrap())
                .await
                .unwrap();
            (found, missing)
        })
        .await
        .unwrap();

    assert_eq!(found.status(), StatusCode::OK);
    let body = to_bytes(found.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"bob");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    // the engine serving requests belongs to the app container and is closed with it
    assert!(engine.pool().is_closed());
    assert!(!container.db_engine.is_initialized());
}
