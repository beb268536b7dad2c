//! User directory trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Answers whether a user exists.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, SagaError>;
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, SagaError> {
        (**self).user_exists(user_id).await
    }
}

/// In-memory user directory backed by a set of registered ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashSet<UserId>>>,
}

impl InMemoryUserDirectory {
    /// Creates a directory with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory with the given users registered.
    pub fn with_users(users: impl IntoIterator<Item = i32>) -> Self {
        Self {
            users: Arc::new(RwLock::new(users.into_iter().map(UserId::new).collect())),
        }
    }

    /// Registers a user. Returns false if it was already registered.
    pub async fn register(&self, user_id: UserId) -> bool {
        self.users.write().await.insert(user_id)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, SagaError> {
        Ok(self.users.read().await.contains(&user_id))
    }
}
