//! Domain-level constants.
//!
//! These constants define business rules and validation requirements.

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Minimum username length requirement
pub const MIN_USERNAME_LENGTH: usize = 1;

/// Maximum username length (fits the relational `VARCHAR(255)` column with room to spare)
pub const MAX_USERNAME_LENGTH: usize = 64;

// =============================================================================
// Record layout
// =============================================================================

/// Identifier field of a stored user
pub const FIELD_ID: &str = "id";

/// Username field of a stored user
pub const FIELD_USERNAME: &str = "username";

/// Password hash field of a stored user
pub const FIELD_PASSWORD: &str = "password";

/// Collection / table name holding users
pub const USERS_COLLECTION: &str = "users";

// =============================================================================
// Authentication
// =============================================================================

/// Message returned on a successful login
pub const LOGIN_SUCCESS_MESSAGE: &str = "login success";
