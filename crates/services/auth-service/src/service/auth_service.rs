//! Authentication service - Registration and login.
//!
//! Uses the domain Password value object for hashing. Hashing and verification
//! run on the blocking thread pool.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{debug, warn};

use common::{AppError, AppResult};
use domain::{validate_username, NewUser, Password, User};
use user_service_lib::service::UserService;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Hash verified when the username is unknown, so both failure paths cost
/// one Argon2 verification.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    Password::new("dummy-password-for-unknown-users")
        .map(Password::into_string)
        .unwrap_or_default()
});

/// Authentication service trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new user, storing only the password hash
    async fn register(&self, username: String, password: String) -> AppResult<User>;

    /// Verify credentials and return the authenticated user
    async fn login(&self, username: String, password: String) -> AppResult<User>;
}

/// Concrete implementation of AuthService on top of the user service.
pub struct Authenticator {
    users: Arc<dyn UserService>,
}

impl Authenticator {
    /// Create new auth service instance
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self { users }
    }
}

async fn hash_password(password: String) -> AppResult<Password> {
    let password = tokio::task::spawn_blocking(move || Password::new(&password))
        .await
        .map_err(|e| AppError::internal(format!("Hashing task failed: {}", e)))??;
    Ok(password)
}

async fn verify_password(hash: String, password: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || Password::from_hash(hash).verify(&password))
        .await
        .map_err(|e| AppError::internal(format!("Verification task failed: {}", e)))
}

#[async_trait]
impl AuthService for Authenticator {
    async fn register(&self, username: String, password: String) -> AppResult<User> {
        validate_username(&username)?;

        let password_hash = hash_password(password).await?.into_string();
        let user = self
            .users
            .create_user(NewUser::new(username, password_hash))
            .await?;

        debug!(id = %user.id, "User registered");
        Ok(user)
    }

    async fn login(&self, username: String, password: String) -> AppResult<User> {
        let user = match self.users.get_user_by_username(&username).await {
            Ok(user) => Some(user),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        // Verify even for unknown users so timing does not reveal which exist
        let hash = match &user {
            Some(user) => user.password.clone(),
            None => DUMMY_HASH.clone(),
        };
        let password_valid = verify_password(hash, password).await?;

        match user {
            Some(user) if password_valid => Ok(user),
            Some(_) => {
                warn!(%username, "Login failed: wrong password");
                Err(AppError::InvalidCredentials)
            }
            None => {
                warn!(%username, "Login failed: unknown username");
                Err(AppError::InvalidCredentials)
            }
        }
    }
}
