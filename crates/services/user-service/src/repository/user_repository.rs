//! User repository over a record store driver.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use common::{AppError, AppResult};
use domain::{NewUser, User, FIELD_ID, FIELD_USERNAME};

use crate::store::{Filter, RecordStore};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// User repository trait for dependency injection.
///
/// Lookups fail with `NotFound` when nothing matches; `get_all` on an empty
/// store is an empty vector.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// All users, in backend order
    async fn get_all(&self) -> AppResult<Vec<User>>;

    /// Create a user whose username is not taken yet
    async fn create(&self, new_user: NewUser) -> AppResult<User>;

    /// Find user by raw identifier (`InvalidId` if it does not parse)
    async fn find_by_id(&self, id: &str) -> AppResult<User>;

    /// Find user by exact username
    async fn find_by_username(&self, username: &str) -> AppResult<User>;

    /// Check the backend is reachable
    async fn ping(&self) -> AppResult<()>;

    /// Name of the active backend
    fn backend(&self) -> &'static str;
}

/// Concrete implementation of UserRepository on top of one record store.
pub struct UserStore {
    store: Arc<dyn RecordStore<User>>,
    create_lock: Mutex<()>,
}

impl UserStore {
    /// Create new repository instance
    pub fn new(store: Arc<dyn RecordStore<User>>) -> Self {
        Self {
            store,
            create_lock: Mutex::new(()),
        }
    }

    async fn first(&self, filter: Filter) -> AppResult<User> {
        self.store
            .read(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }
}

#[async_trait]
impl UserRepository for UserStore {
    async fn get_all(&self) -> AppResult<Vec<User>> {
        self.store.read(&Filter::all()).await
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        // Held across check and write so creates in this process never interleave
        let _guard = self.create_lock.lock().await;

        match self.find_by_username(&new_user.username).await {
            Ok(_) => {
                warn!(username = %new_user.username, "Username already taken");
                return Err(AppError::already_exists("username"));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let user = User::from_new(self.store.new_id(), new_user);
        self.store.create(&user).await?;

        debug!(id = %user.id, backend = self.store.backend(), "User created");
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<User> {
        let id = self.store.parse_id(id)?;
        self.first(Filter::by(FIELD_ID, id)).await
    }

    async fn find_by_username(&self, username: &str) -> AppResult<User> {
        self.first(Filter::by(FIELD_USERNAME, username)).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    fn backend(&self) -> &'static str {
        self.store.backend()
    }
}
