//! In-memory implementation of the user store.
//!
//! # Purpose
//! Keeps users in a `HashMap` guarded by `tokio::sync::RwLock`. It is the
//! default backend for local development and tests.
//!
//! # Durability and consistency
//! - **Not durable**: all users are lost on process restart.
//! - Mutations take the write lock, so the `(sub, issuer)` uniqueness check and
//!   the insert are atomic within one process.
//! - Listing filters, sorts and pages a snapshot taken under the read lock.
use super::{
    StoreError, StoreResult, UserPage, UserStore, duplicate_user_message, missing_user_message,
};
use crate::model::{ListParams, User, UserCreate};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_duplicate<'a>(
    users: &'a HashMap<Uuid, User>,
    sub: &str,
    issuer: &str,
    except: Option<Uuid>,
) -> Option<&'a User> {
    users
        .values()
        .find(|user| user.sub == sub && user.issuer == issuer && Some(user.id) != except)
}

fn record_change(op: &'static str, users: &HashMap<Uuid, User>) {
    metrics::counter!("datacloud_registry_user_changes_total", "op" => op).increment(1);
    metrics::gauge!("datacloud_registry_users_total").set(users.len() as f64);
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(missing_user_message(id)))
    }

    async fn list_users(&self, params: &ListParams) -> StoreResult<UserPage> {
        let mut matching: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|user| params.filter.matches(user))
            .cloned()
            .collect();
        matching.sort_by(|a, b| params.sort.compare(a, b));
        let total = matching.len() as u64;
        let offset = usize::try_from(params.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(params.size as usize)
            .collect();
        Ok(UserPage { items, total })
    }

    async fn create_user(&self, user: UserCreate) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if find_duplicate(&users, &user.sub, &user.issuer, None).is_some() {
            return Err(StoreError::Conflict(duplicate_user_message(
                &user.sub,
                &user.issuer,
            )));
        }
        let user = User::new(user);
        users.insert(user.id, user.clone());
        record_change("created", &users);
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, update: UserCreate) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&id) {
            return Err(StoreError::NotFound(missing_user_message(id)));
        }
        if find_duplicate(&users, &update.sub, &update.issuer, Some(id)).is_some() {
            return Err(StoreError::Conflict(duplicate_user_message(
                &update.sub,
                &update.issuer,
            )));
        }
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(missing_user_message(id)))?;
        user.apply(update);
        let updated = user.clone();
        record_change("updated", &users);
        Ok(updated)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users.remove(&id).is_some() {
            record_change("deleted", &users);
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
