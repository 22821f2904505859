//! Flat JSON file driver.
//!
//! The whole dataset lives in memory, owned by the driver and guarded by one
//! async mutex. Every mutation is applied to a copy, written to a temporary
//! sibling file, renamed over the original and only then swapped in, so a
//! failed write leaves both the file and memory untouched.

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use common::{AppError, AppResult, StoreError};

use super::{Filter, Patch, Record, RecordStore};

type Document = Map<String, Value>;

/// Record store backed by a single JSON array file.
pub struct JsonFileStore<R> {
    path: PathBuf,
    documents: Mutex<Vec<Document>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> JsonFileStore<R> {
    /// Load the file at `path`. A missing or blank file holds zero records.
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let documents = load(&path).await?;
        info!(path = %path.display(), records = documents.len(), "JSON store opened");

        Ok(Self {
            path,
            documents: Mutex::new(documents),
            _record: PhantomData,
        })
    }

    async fn persist(&self, documents: &[Document]) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let encoded = serde_json::to_vec_pretty(documents)?;
        let tmp = self.temp_path();
        fs::write(&tmp, &encoded).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), records = documents.len(), "JSON store persisted");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| R::COLLECTION.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn unique_fields() -> impl Iterator<Item = &'static str> {
        std::iter::once(R::ID_FIELD).chain(R::UNIQUE_FIELDS.iter().copied())
    }

    /// First of `fields` on which a changed document collides with another one.
    ///
    /// Only the documents at `changed` are checked, so duplicates already
    /// present in a loaded file never block unrelated writes.
    fn find_conflict(
        documents: &[Document],
        changed: &[usize],
        fields: &[&'static str],
    ) -> Option<&'static str> {
        fields.iter().copied().find(|field| {
            changed.iter().any(|&index| {
                let Some(value) = documents[index].get(*field) else {
                    return false;
                };
                documents
                    .iter()
                    .enumerate()
                    .any(|(other, doc)| other != index && doc.get(*field) == Some(value))
            })
        })
    }
}

async fn load(path: &Path) -> AppResult<Vec<Document>> {
    match fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Files written by earlier deployments carry 20-character xid identifiers
/// (base32hex, lowercase).
const XID_LENGTH: usize = 20;

fn is_xid(raw: &str) -> bool {
    raw.len() == XID_LENGTH && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'v'))
}

fn to_document<R: Record>(record: &R) -> AppResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Codec(format!("record encoded as non-object: {}", other)).into()),
    }
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    filter
        .conditions()
        .all(|(field, value)| doc.get(field).and_then(Value::as_str) == Some(value))
}

#[async_trait]
impl<R: Record> RecordStore<R> for JsonFileStore<R> {
    fn backend(&self) -> &'static str {
        "json"
    }

    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn parse_id(&self, raw: &str) -> AppResult<String> {
        if let Ok(id) = Uuid::parse_str(raw) {
            return Ok(id.to_string());
        }
        if is_xid(raw) {
            return Ok(raw.to_string());
        }
        Err(AppError::invalid_id(raw))
    }

    async fn create(&self, record: &R) -> AppResult<()> {
        let document = to_document(record)?;

        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        next.push(document);
        let fields: Vec<&'static str> = Self::unique_fields().collect();
        if let Some(field) = Self::find_conflict(&next, &[next.len() - 1], &fields) {
            debug!(field, "JSON store rejected duplicate");
            return Err(AppError::already_exists(field));
        }

        self.persist(&next).await?;
        *documents = next;
        Ok(())
    }

    async fn read(&self, filter: &Filter) -> AppResult<Vec<R>> {
        filter.validate::<R>()?;

        let documents = self.documents.lock().await;
        documents
            .iter()
            .filter(|doc| matches(doc, filter))
            .map(|doc| serde_json::from_value::<R>(Value::Object(doc.clone())).map_err(AppError::from))
            .collect()
    }

    async fn update(&self, filter: &Filter, patch: &Patch) -> AppResult<u64> {
        filter.validate::<R>()?;
        patch.validate::<R>()?;

        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        let mut changed = Vec::new();
        for (index, doc) in next.iter_mut().enumerate() {
            if !matches(doc, filter) {
                continue;
            }
            for (field, value) in patch.assignments() {
                doc.insert(field.to_string(), Value::String(value.to_string()));
            }
            changed.push(index);
        }

        if changed.is_empty() {
            return Ok(0);
        }
        let patched: Vec<&'static str> = Self::unique_fields()
            .filter(|field| patch.assignments().any(|(f, _)| f == *field))
            .collect();
        if let Some(field) = Self::find_conflict(&next, &changed, &patched) {
            return Err(AppError::already_exists(field));
        }

        self.persist(&next).await?;
        *documents = next;
        Ok(changed.len() as u64)
    }

    async fn delete(&self, filter: &Filter) -> AppResult<u64> {
        filter.validate::<R>()?;

        let mut documents = self.documents.lock().await;
        let next: Vec<Document> = documents
            .iter()
            .filter(|doc| !matches(doc, filter))
            .cloned()
            .collect();
        let affected = (documents.len() - next.len()) as u64;

        if affected > 0 {
            self.persist(&next).await?;
            *documents = next;
        }
        Ok(affected)
    }

    async fn ping(&self) -> AppResult<()> {
        match fs::metadata(&self.path).await {
            Ok(_) => Ok(()),
            // Not written yet; the first create will make it
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NewUser, User};

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("json-store-{}", Uuid::new_v4()))
            .join("users.json")
    }

    fn user(store: &JsonFileStore<User>, username: &str) -> User {
        User::from_new(store.new_id(), NewUser::new(username, "hash"))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let store = JsonFileStore::<User>::open(temp_path()).await.unwrap();

        assert!(store.read(&Filter::all()).await.unwrap().is_empty());
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_blank_file_is_empty() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "  \n").unwrap();

        let store = JsonFileStore::<User>::open(&path).await.unwrap();
        assert!(store.read(&Filter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_to_open() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let result = JsonFileStore::<User>::open(&path).await;
        assert!(matches!(result, Err(AppError::Store(StoreError::Json(_)))));
    }

    #[tokio::test]
    async fn test_create_persists_json_array() {
        let path = temp_path();
        let store = JsonFileStore::<User>::open(&path).await.unwrap();
        let alice = user(&store, "alice");

        store.create(&alice).await.unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!([{"id": alice.id, "username": "alice", "password": "hash"}])
        );
        assert!(!store.temp_path().exists());

        let reopened = JsonFileStore::<User>::open(&path).await.unwrap();
        assert_eq!(reopened.read(&Filter::all()).await.unwrap(), vec![alice]);
    }

    #[tokio::test]
    async fn test_read_by_field() {
        let store = JsonFileStore::<User>::open(temp_path()).await.unwrap();
        let alice = user(&store, "alice");
        let bob = user(&store, "bob");
        store.create(&alice).await.unwrap();
        store.create(&bob).await.unwrap();

        let found = store.read(&Filter::by("username", "bob")).await.unwrap();
        assert_eq!(found, vec![bob.clone()]);

        let found = store.read(&Filter::by("id", alice.id.clone())).await.unwrap();
        assert_eq!(found, vec![alice]);

        let none = store.read(&Filter::by("username", "carol")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected_and_file_unchanged() {
        let path = temp_path();
        let store = JsonFileStore::<User>::open(&path).await.unwrap();
        store.create(&user(&store, "alice")).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let result = store.create(&user(&store, "alice")).await;

        assert!(matches!(result, Err(AppError::AlreadyExists(_))));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(store.read(&Filter::all()).await.unwrap().len(), 1);
    }

    fn write_file(path: &Path, documents: Value) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, documents.to_string()).unwrap();
    }

    fn legacy_users() -> Value {
        serde_json::json!([
            {"id": "9m4e2mr0ui3e8a215n4g", "username": "alice", "password": "hash"},
            {"id": "9m4e2mr0ui3e8a215n50", "username": "alice", "password": "hash"}
        ])
    }

    #[tokio::test]
    async fn test_existing_duplicates_do_not_block_new_usernames() {
        let path = temp_path();
        write_file(&path, legacy_users());
        let store = JsonFileStore::<User>::open(&path).await.unwrap();

        store.create(&user(&store, "bob")).await.unwrap();

        let clash = store.create(&user(&store, "alice")).await;
        assert!(matches!(clash, Err(AppError::AlreadyExists(_))));
        assert_eq!(store.read(&Filter::all()).await.unwrap().len(), 3);

        let updated = store
            .update(&Filter::by("username", "bob"), &Patch::new().set("password", "new"))
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let renamed = store
            .update(&Filter::by("username", "bob"), &Patch::new().set("username", "carol"))
            .await
            .unwrap();
        assert_eq!(renamed, 1);
    }

    #[tokio::test]
    async fn test_legacy_xid_identifiers_resolve() {
        let path = temp_path();
        write_file(&path, legacy_users());
        let store = JsonFileStore::<User>::open(&path).await.unwrap();

        let id = store.parse_id("9m4e2mr0ui3e8a215n4g").unwrap();
        let found = store.read(&Filter::by("id", id)).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "9m4e2mr0ui3e8a215n4g");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = JsonFileStore::<User>::open(temp_path()).await.unwrap();
        store.create(&user(&store, "alice")).await.unwrap();
        store.create(&user(&store, "bob")).await.unwrap();

        let updated = store
            .update(&Filter::by("username", "alice"), &Patch::new().set("password", "new"))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        let alice = store.read(&Filter::by("username", "alice")).await.unwrap();
        assert_eq!(alice[0].password, "new");

        let clash = store
            .update(&Filter::by("username", "bob"), &Patch::new().set("username", "alice"))
            .await;
        assert!(matches!(clash, Err(AppError::AlreadyExists(_))));

        let deleted = store.delete(&Filter::by("username", "bob")).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.delete(&Filter::by("username", "bob")).await.unwrap(), 0);
        assert_eq!(store.read(&Filter::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let store = JsonFileStore::<User>::open(temp_path()).await.unwrap();

        let result = store.read(&Filter::by("email", "a@b.c")).await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::UnknownField(_)))
        ));
    }

    #[tokio::test]
    async fn test_parse_id() {
        let store = JsonFileStore::<User>::open(temp_path()).await.unwrap();
        let id = store.new_id();

        assert_eq!(store.parse_id(&id).unwrap(), id);
        assert!(matches!(
            store.parse_id("not-a-valid-id"),
            Err(AppError::InvalidId(_))
        ));
        // right length, but `w` is outside the xid alphabet
        assert!(matches!(
            store.parse_id("9m4e2mr0ui3e8a215n4w"),
            Err(AppError::InvalidId(_))
        ));
        assert!(store.parse_id("9m4e2mr0ui3e8a215n4g").is_ok());
    }
}
