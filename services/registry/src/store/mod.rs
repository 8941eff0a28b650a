//! User storage backends.
//!
//! # Purpose
//! Defines the [`UserStore`] trait used by the HTTP handlers and the error
//! type shared by the in-memory and Postgres implementations.
//!
//! # Key invariants
//! - `(sub, issuer)` is unique across users; violations are `Conflict`.
//! - `delete_user` is idempotent.
use crate::model::{ListParams, User, UserCreate};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// One page of users plus the number of users matching the filter.
#[derive(Debug, Clone)]
pub struct UserPage {
    pub items: Vec<User>,
    pub total: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn duplicate_user_message(sub: &str, issuer: &str) -> String {
    format!("User with sub '{sub}' and belonging to issuer '{issuer}' already exists")
}

pub(crate) fn missing_user_message(id: Uuid) -> String {
    format!("User with ID '{id}' does not exist")
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<User>;
    async fn list_users(&self, params: &ListParams) -> StoreResult<UserPage>;
    async fn create_user(&self, user: UserCreate) -> StoreResult<User>;
    async fn update_user(&self, id: Uuid, update: UserCreate) -> StoreResult<User>;
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
