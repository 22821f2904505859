//! MongoDB document-store driver.
//!
//! Records are stored as BSON documents. The record identifier lives in the
//! native `_id` field as an `ObjectId` and is handed back as its hex string.

use std::marker::PhantomData;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info};

use common::{AppError, AppResult, StoreError};

use super::{Filter, Patch, Record, RecordStore};

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// Native identifier field of every MongoDB document
const MONGO_ID: &str = "_id";

/// Record store backed by one MongoDB collection.
pub struct MongoStore<R> {
    client: Client,
    database: String,
    collection: Collection<Document>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> MongoStore<R> {
    /// Connect, verify the server answers a ping and ensure unique indexes.
    pub async fn connect(uri: &str, database: &str) -> AppResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(connection_error)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(connection_error)?;

        let store = Self {
            collection: db.collection::<Document>(R::COLLECTION),
            client,
            database: database.to_string(),
            _record: PhantomData,
        };
        store.ensure_unique_indexes().await?;

        info!(database, collection = R::COLLECTION, "Connected to MongoDB");
        Ok(store)
    }

    async fn ensure_unique_indexes(&self) -> AppResult<()> {
        for field in R::UNIQUE_FIELDS {
            let mut keys = Document::new();
            keys.insert(*field, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build();
            self.collection.create_index(index).await?;
            debug!(field, "Unique index ensured");
        }
        Ok(())
    }
}

fn object_id(raw: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(raw).map_err(|_| AppError::invalid_id(raw))
}

/// Translate an equality filter into a query document.
fn filter_document<R: Record>(filter: &Filter) -> AppResult<Document> {
    filter.validate::<R>()?;

    let clauses = filter
        .conditions()
        .map(|(field, value)| -> AppResult<Document> {
            let mut clause = Document::new();
            if field == R::ID_FIELD {
                clause.insert(MONGO_ID, object_id(value)?);
            } else {
                clause.insert(field, value);
            }
            Ok(clause)
        })
        .collect::<AppResult<Vec<Document>>>()?;

    Ok(match clauses.len() {
        0 => Document::new(),
        1 => clauses.into_iter().next().unwrap_or_default(),
        _ => doc! { "$and": clauses },
    })
}

/// Translate a patch into a `$set` update document.
fn update_document<R: Record>(patch: &Patch) -> AppResult<Document> {
    patch.validate::<R>()?;

    let mut set = Document::new();
    for (field, value) in patch.assignments() {
        set.insert(field, value);
    }
    Ok(doc! { "$set": set })
}

/// Encode a record, moving its identifier into `_id`.
fn to_stored<R: Record>(record: &R) -> AppResult<Document> {
    let mut document = bson::to_document(record).map_err(StoreError::from)?;
    match document.remove(R::ID_FIELD) {
        Some(Bson::String(id)) => {
            document.insert(MONGO_ID, object_id(&id)?);
        }
        Some(other) => {
            document.insert(MONGO_ID, other);
        }
        None => {}
    }
    Ok(document)
}

/// Decode a stored document, moving `_id` back into the identifier field.
fn from_stored<R: Record>(mut document: Document) -> AppResult<R> {
    match document.remove(MONGO_ID) {
        Some(Bson::ObjectId(id)) => {
            document.insert(R::ID_FIELD, id.to_hex());
        }
        Some(other) => {
            document.insert(R::ID_FIELD, other);
        }
        None => {}
    }
    Ok(bson::from_document(document).map_err(StoreError::from)?)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

fn connection_error(err: mongodb::error::Error) -> AppError {
    AppError::from(StoreError::Connection(err.to_string()))
}

fn map_write_error<R: Record>(err: mongodb::error::Error) -> AppError {
    if is_duplicate_key(&err) {
        AppError::already_exists(R::UNIQUE_FIELDS.first().copied().unwrap_or(R::ID_FIELD))
    } else {
        AppError::from(err)
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MongoStore<R> {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    fn new_id(&self) -> String {
        ObjectId::new().to_hex()
    }

    fn parse_id(&self, raw: &str) -> AppResult<String> {
        object_id(raw).map(|id| id.to_hex())
    }

    async fn create(&self, record: &R) -> AppResult<()> {
        let document = to_stored(record)?;
        self.collection
            .insert_one(document)
            .await
            .map_err(map_write_error::<R>)?;
        Ok(())
    }

    async fn read(&self, filter: &Filter) -> AppResult<Vec<R>> {
        let query = filter_document::<R>(filter)?;
        let cursor = self.collection.find(query).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        debug!(matched = documents.len(), "MongoDB read");
        documents.into_iter().map(from_stored::<R>).collect()
    }

    async fn update(&self, filter: &Filter, patch: &Patch) -> AppResult<u64> {
        let query = filter_document::<R>(filter)?;
        let update = update_document::<R>(patch)?;
        let result = self
            .collection
            .update_many(query, update)
            .await
            .map_err(map_write_error::<R>)?;
        Ok(result.matched_count)
    }

    async fn delete(&self, filter: &Filter) -> AppResult<u64> {
        let query = filter_document::<R>(filter)?;
        let result = self.collection.delete_many(query).await?;
        Ok(result.deleted_count)
    }

    async fn ping(&self) -> AppResult<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }
}
