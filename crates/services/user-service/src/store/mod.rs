//! Record store drivers.
//!
//! A [`RecordStore`] is the backend-specific CRUD capability the repository
//! depends on. Exactly one driver is instantiated at startup; everything above
//! it talks to `Arc<dyn RecordStore<R>>` and never inspects the concrete type.

mod json;
mod mongo;
mod mysql;
mod record;

pub use json::JsonFileStore;
pub use mongo::MongoStore;
pub use mysql::MySqlStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use common::{AppResult, StoreError};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A type that can be persisted by any record store.
///
/// Serde is the materializer: drivers decode every matching record into a
/// fresh value through `Deserialize`.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection, table or file-level name
    const COLLECTION: &'static str;

    /// Field names in positional (column) order
    const FIELDS: &'static [&'static str];

    /// Identifier field, mapped to the backend's native key
    const ID_FIELD: &'static str;

    /// Fields whose values must be unique across the store
    const UNIQUE_FIELDS: &'static [&'static str] = &[];

    /// Check that `field` belongs to this record.
    fn check_field(field: &str) -> Result<(), StoreError> {
        if Self::FIELDS.contains(&field) {
            Ok(())
        } else {
            Err(StoreError::UnknownField(field.to_string()))
        }
    }
}

/// Equality predicate over record fields, combined with AND.
///
/// The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<(String, String)>,
}

impl Filter {
    /// Filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching records whose `field` equals `value`.
    pub fn by(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::all().and(field, value)
    }

    /// Add another equality condition.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.conditions.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Reject conditions on fields `R` does not have.
    pub fn validate<R: Record>(&self) -> Result<(), StoreError> {
        self.conditions().try_for_each(|(field, _)| R::check_field(field))
    }
}

/// Field assignments applied by [`RecordStore::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    assignments: Vec<(String, String)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `field`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.assignments.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.assignments.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    /// Reject assignments to unknown fields and to the identifier.
    pub fn validate<R: Record>(&self) -> Result<(), StoreError> {
        self.assignments().try_for_each(|(field, _)| {
            R::check_field(field)?;
            if field == R::ID_FIELD {
                return Err(StoreError::NotImplemented("changing a record identifier"));
            }
            Ok(())
        })
    }
}

/// Backend-specific CRUD capability.
///
/// `read` returns an empty vector (not an error) when nothing matches.
/// Violations of a backend unique constraint surface as `AlreadyExists`.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Short backend name ("json", "mongodb", "mysql")
    fn backend(&self) -> &'static str;

    /// Generate a fresh backend-native identifier
    fn new_id(&self) -> String;

    /// Parse a raw identifier into the backend's canonical key form.
    /// Never performs I/O.
    fn parse_id(&self, raw: &str) -> AppResult<String>;

    /// Persist one record
    async fn create(&self, record: &R) -> AppResult<()>;

    /// All records matching `filter`, in backend order
    async fn read(&self, filter: &Filter) -> AppResult<Vec<R>>;

    /// Apply `patch` to every matching record, returning the affected count
    async fn update(&self, filter: &Filter, patch: &Patch) -> AppResult<u64>;

    /// Remove every matching record, returning the affected count
    async fn delete(&self, filter: &Filter) -> AppResult<u64>;

    /// Check backend connectivity
    async fn ping(&self) -> AppResult<()>;
}
