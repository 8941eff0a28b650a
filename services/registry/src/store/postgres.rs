//! Postgres-backed implementation of the user store.
//!
//! # Purpose
//! Durable storage for users. Connection management uses a bounded `sqlx`
//! pool and the schema is applied at startup via embedded migrations.
//!
//! # Key invariants
//! - The `unique_sub_issuer_couple` constraint enforces `(sub, issuer)`
//!   uniqueness; unique violations map to [`StoreError::Conflict`].
//! - Sort columns come from the [`SortKey`](crate::model::SortKey) allowlist and
//!   are never taken from user input verbatim.
//! - Filter values are always bound parameters.
//!
//! # Security notes
//! - Database URLs may include credentials; avoid logging them.
use super::{
    StoreError, StoreResult, UserPage, UserStore, duplicate_user_message, missing_user_message,
};
use crate::config::PostgresConfig;
use crate::model::{ListParams, User, UserCreate, UserFilter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, sub, name, email, issuer, created_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    sub: String,
    name: String,
    email: String,
    issuer: String,
    created_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(row: DbUser) -> Self {
        User {
            id: row.id,
            sub: row.sub,
            name: row.name,
            email: row.email,
            issuer: row.issuer,
            created_at: row.created_at,
        }
    }
}

impl PostgresStore {
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without applying migrations. Intended for tests that manage the
    /// schema themselves.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        // Fail fast on pool exhaustion and unreachable databases rather than
        // hanging request handlers.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), pool)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow::anyhow!("postgres connect timed out")))??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    let mut separator = " WHERE ";
    let substrings = [
        ("sub", &filter.sub),
        ("name", &filter.name),
        ("email", &filter.email),
        ("issuer", &filter.issuer),
    ];
    for (column, needle) in substrings {
        if let Some(needle) = needle {
            // strpos avoids LIKE wildcard escaping for user-supplied needles.
            builder
                .push(separator)
                .push("strpos(lower(")
                .push(column)
                .push("), lower(")
                .push_bind(needle.clone())
                .push(")) > 0");
            separator = " AND ";
        }
    }
    if let Some(limit) = filter.created_before {
        builder
            .push(separator)
            .push("created_at <= ")
            .push_bind(limit);
        separator = " AND ";
    }
    if let Some(limit) = filter.created_after {
        builder
            .push(separator)
            .push("created_at >= ")
            .push_bind(limit);
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::from)
            .ok_or_else(|| StoreError::NotFound(missing_user_message(id)))
    }

    async fn list_users(&self, params: &ListParams) -> StoreResult<UserPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, &params.filter);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filters(&mut select, &params.filter);
        let direction = if params.sort.descending { "DESC" } else { "ASC" };
        select
            .push(" ORDER BY ")
            .push(params.sort.key.column())
            .push(" ")
            .push(direction)
            .push(", id ASC LIMIT ")
            .push_bind(i64::from(params.size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(params.offset()).unwrap_or(i64::MAX));
        let rows = select
            .build_query_as::<DbUser>()
            .fetch_all(&self.pool)
            .await?;

        Ok(UserPage {
            items: rows.into_iter().map(User::from).collect(),
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn create_user(&self, user: UserCreate) -> StoreResult<User> {
        let inserted = sqlx::query_as::<_, DbUser>(&format!(
            "INSERT INTO users (id, sub, name, email, issuer) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.sub)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.issuer)
        .fetch_one(&self.pool)
        .await;
        match inserted {
            Ok(row) => {
                metrics::counter!("datacloud_registry_user_changes_total", "op" => "created")
                    .increment(1);
                Ok(row.into())
            }
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(
                duplicate_user_message(&user.sub, &user.issuer),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_user(&self, id: Uuid, update: UserCreate) -> StoreResult<User> {
        let updated = sqlx::query_as::<_, DbUser>(&format!(
            "UPDATE users SET sub = $2, name = $3, email = $4, issuer = $5 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&update.sub)
        .bind(&update.name)
        .bind(&update.email)
        .bind(&update.issuer)
        .fetch_optional(&self.pool)
        .await;
        match updated {
            Ok(Some(row)) => {
                metrics::counter!("datacloud_registry_user_changes_total", "op" => "updated")
                    .increment(1);
                Ok(row.into())
            }
            Ok(None) => Err(StoreError::NotFound(missing_user_message(id))),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(
                duplicate_user_message(&update.sub, &update.issuer),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            metrics::counter!("datacloud_registry_user_changes_total", "op" => "deleted")
                .increment(1);
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
