#![cfg(feature = "pg-tests")]

use registry::config::PostgresConfig;
use registry::model::{ListParams, Sort, UserCreate, UserFilter};
use registry::store::postgres::PostgresStore;
use registry::store::{StoreError, UserStore};
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

async fn truncate_users(url: &str) -> Result<(), sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .connect(url)
        .await?;
    sqlx::query("TRUNCATE users").execute(&pool).await.map(|_| ())
}

async fn pg_store() -> Option<PostgresStore> {
    let url = match std::env::var("DC_REGISTRY_TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping pg-tests: set DC_REGISTRY_TEST_DATABASE_URL or DATABASE_URL");
            return None;
        }
    };
    let pg_cfg = PostgresConfig {
        url: url.clone(),
        max_connections: 5,
        connect_timeout_ms: 5_000,
        acquire_timeout_ms: 5_000,
    };
    let store = match PostgresStore::connect(&pg_cfg).await {
        Ok(store) => store,
        Err(err) => {
            eprintln!("skipping pg-tests: connect postgres store failed: {err}");
            return None;
        }
    };
    if let Err(err) = truncate_users(&url).await {
        eprintln!("skipping pg-tests: cannot reset users table: {err}");
        return None;
    }
    Some(store)
}

fn user(sub: &str, name: &str) -> UserCreate {
    UserCreate {
        sub: sub.to_string(),
        name: name.to_string(),
        email: format!("{sub}@example.org"),
        issuer: "https://iam.example.org/".to_string(),
    }
}

fn params(filter: UserFilter, sort: &str, page: u32, size: u32) -> ListParams {
    ListParams {
        filter,
        sort: Sort::parse(sort).expect("sort"),
        page,
        size,
    }
}

#[tokio::test]
#[serial]
async fn pg_user_lifecycle() {
    let Some(store) = pg_store().await else {
        return;
    };
    assert!(store.is_durable());
    store.health_check().await.expect("health");

    let created = store.create_user(user("alice", "Alice")).await.expect("create");
    assert_eq!(store.get_user(created.id).await.expect("get"), created);

    let err = store
        .create_user(user("alice", "Alice Again"))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, StoreError::Conflict(_)));

    let updated = store
        .update_user(created.id, user("alice", "Alice Liddell"))
        .await
        .expect("update");
    assert_eq!(updated.name, "Alice Liddell");
    assert_eq!(updated.created_at, created.created_at);

    store.delete_user(created.id).await.expect("delete");
    assert!(matches!(
        store.get_user(created.id).await,
        Err(StoreError::NotFound(_))
    ));
    store.delete_user(created.id).await.expect("delete is idempotent");
}

#[tokio::test]
#[serial]
async fn pg_list_filters_sorts_and_pages() {
    let Some(store) = pg_store().await else {
        return;
    };
    for (sub, name) in [("u1", "Carol"), ("u2", "alice"), ("u3", "Bob"), ("u4", "Alina")] {
        store.create_user(user(sub, name)).await.expect("create");
    }

    let page = store
        .list_users(&params(UserFilter::default(), "sub", 2, 3))
        .await
        .expect("page 2");
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].sub, "u4");

    let filter = UserFilter {
        name: Some("ALI".to_string()),
        ..UserFilter::default()
    };
    let page = store
        .list_users(&params(filter, "-sub", 1, 10))
        .await
        .expect("filtered");
    assert_eq!(page.total, 2);
    let subs: Vec<&str> = page.items.iter().map(|user| user.sub.as_str()).collect();
    assert_eq!(subs, vec!["u4", "u2"]);
}
