//! User service - Handles user-related use cases.
//!
//! This is the only surface the HTTP facade and the credential layer call.

use async_trait::async_trait;
use std::sync::Arc;

use common::AppResult;
use domain::{NewUser, User};

use crate::repository::UserRepository;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    /// Create a new user (internal use - password already hashed)
    async fn create_user(&self, new_user: NewUser) -> AppResult<User>;

    /// List all users
    async fn list_users(&self) -> AppResult<Vec<User>>;

    /// Get user by raw identifier
    async fn get_user(&self, id: &str) -> AppResult<User>;

    /// Get user by username
    async fn get_user_by_username(&self, username: &str) -> AppResult<User>;

    /// Check the storage backend is reachable
    async fn ping(&self) -> AppResult<()>;

    /// Name of the active storage backend
    fn backend(&self) -> &'static str;
}

/// Concrete implementation of UserService using repository.
pub struct UserManager {
    repo: Arc<dyn UserRepository>,
}

impl UserManager {
    /// Create new user service instance with repository
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl UserService for UserManager {
    async fn create_user(&self, new_user: NewUser) -> AppResult<User> {
        self.repo.create(new_user).await
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repo.get_all().await
    }

    async fn get_user(&self, id: &str) -> AppResult<User> {
        self.repo.find_by_id(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> AppResult<User> {
        self.repo.find_by_username(username).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.repo.ping().await
    }

    fn backend(&self) -> &'static str {
        self.repo.backend()
    }
}
