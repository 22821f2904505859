//! Storage layout of the `User` entity.

use domain::{User, FIELD_ID, FIELD_PASSWORD, FIELD_USERNAME, USERS_COLLECTION};

use super::Record;

impl Record for User {
    const COLLECTION: &'static str = USERS_COLLECTION;
    const FIELDS: &'static [&'static str] = &[FIELD_ID, FIELD_USERNAME, FIELD_PASSWORD];
    const ID_FIELD: &'static str = FIELD_ID;
    const UNIQUE_FIELDS: &'static [&'static str] = &[FIELD_USERNAME];
}
