//! User domain entity and related types.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH};
use crate::error::{DomainError, DomainResult};

/// User domain entity, exactly as persisted by every storage backend.
///
/// `password` always holds an Argon2 PHC hash string, never plaintext.
/// The identifier is assigned by the storage backend at creation and is
/// opaque to everything above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: String,
}

impl User {
    /// Assemble a stored user from a backend-assigned id and a new user.
    pub fn from_new(id: String, new_user: NewUser) -> Self {
        Self {
            id,
            username: new_user.username,
            password: new_user.password_hash,
        }
    }
}

/// User creation data (password already hashed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

/// Check a username's length, counted in characters.
pub fn validate_username(username: &str) -> DomainResult<()> {
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(DomainError::validation(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }
    Ok(())
}

/// User response (safe to return to client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserResponse {
    /// Backend-assigned user identifier
    pub id: String,
    /// Unique username
    pub username: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_new_keeps_hash_and_id() {
        let user = User::from_new("abc".to_string(), NewUser::new("alice", "$argon2id$hash"));

        assert_eq!(user.id, "abc");
        assert_eq!(user.username, "alice");
        assert_eq!(user.password, "$argon2id$hash");
    }

    #[test]
    fn test_persisted_layout() {
        let user = User::from_new("abc".to_string(), NewUser::new("alice", "hash"));
        let value = serde_json::to_value(&user).unwrap();

        assert_eq!(
            value,
            serde_json::json!({"id": "abc", "username": "alice", "password": "hash"})
        );
    }

    #[test]
    fn test_validate_username_bounds() {
        assert!(validate_username("a").is_ok());
        assert!(validate_username(&"é".repeat(MAX_USERNAME_LENGTH)).is_ok());

        assert!(matches!(validate_username(""), Err(DomainError::Validation(_))));
        assert!(matches!(
            validate_username(&"a".repeat(MAX_USERNAME_LENGTH + 1)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_response_hides_password() {
        let user = User::from_new("abc".to_string(), NewUser::new("alice", "hash"));
        let value = serde_json::to_value(UserResponse::from(&user)).unwrap();

        assert!(value.get("password").is_none());
        assert_eq!(value["username"], "alice");
    }
}
