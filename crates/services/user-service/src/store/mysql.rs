//! MySQL relational driver.
//!
//! Statements are assembled with the `sea_query` builder re-exported by
//! SeaORM: identifiers come from the record layout and are quoted, values are
//! always bound parameters. Rows are scanned positionally in `FIELDS` order.

use std::marker::PhantomData;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, ColumnDef, DeleteStatement, Expr, Index, InsertStatement, Query, SelectStatement,
    SimpleExpr, Table, TableCreateStatement, UpdateStatement,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, QueryResult, SqlErr};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use common::{AppError, AppResult, StoreError};

use super::{Filter, Patch, Record, RecordStore};

/// Width of every text column
const COLUMN_LENGTH: u32 = 255;
const CHARACTER_SET: &str = "utf8mb4";
const COLLATION: &str = "utf8mb4_bin";

/// Record store backed by one MySQL table.
pub struct MySqlStore<R> {
    db: DatabaseConnection,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> MySqlStore<R> {
    /// Connect, ping and create the table if it does not exist yet.
    pub async fn connect(uri: &str) -> AppResult<Self> {
        let db = Database::connect(uri).await.map_err(connection_error)?;
        db.ping().await.map_err(connection_error)?;

        let store = Self::from_connection(db);
        store.ensure_table().await?;

        info!(table = R::COLLECTION, "Connected to MySQL");
        Ok(store)
    }

    /// Wrap an existing connection without touching the schema.
    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self {
            db,
            _record: PhantomData,
        }
    }

    async fn ensure_table(&self) -> AppResult<()> {
        let backend = self.db.get_database_backend();
        self.db.execute(backend.build(&create_table::<R>())).await?;
        Ok(())
    }
}

fn table<R: Record>() -> Alias {
    Alias::new(R::COLLECTION)
}

fn columns<R: Record>() -> impl Iterator<Item = Alias> {
    R::FIELDS.iter().map(|field| Alias::new(*field))
}

fn condition(field: &str, value: &str) -> SimpleExpr {
    Expr::col(Alias::new(field)).eq(value)
}

/// `CREATE TABLE IF NOT EXISTS` with a primary key on the id field and a
/// unique index per unique field.
///
/// The binary collation keeps comparisons and unique keys case- and
/// accent-sensitive, so `Alice` and `alice` are different usernames.
fn create_table<R: Record>() -> TableCreateStatement {
    let mut statement = Table::create();
    statement
        .table(table::<R>())
        .if_not_exists()
        .character_set(CHARACTER_SET)
        .collate(COLLATION);

    for field in R::FIELDS {
        let mut column = ColumnDef::new(Alias::new(*field));
        column.string_len(COLUMN_LENGTH).not_null();
        if *field == R::ID_FIELD {
            column.primary_key();
        }
        statement.col(&mut column);
    }

    for field in R::UNIQUE_FIELDS {
        statement.index(
            Index::create()
                .name(format!("uq_{}_{}", R::COLLECTION, field))
                .col(Alias::new(*field))
                .unique(),
        );
    }

    statement.to_owned()
}

fn select<R: Record>(filter: &Filter) -> AppResult<SelectStatement> {
    filter.validate::<R>()?;

    let mut statement = Query::select();
    statement.columns(columns::<R>()).from(table::<R>());
    for (field, value) in filter.conditions() {
        statement.and_where(condition(field, value));
    }
    Ok(statement.to_owned())
}

fn insert<R: Record>(record: &R) -> AppResult<InsertStatement> {
    let values = record_values(record)?;

    let mut statement = Query::insert();
    statement.into_table(table::<R>()).columns(columns::<R>());
    statement
        .values(values.into_iter().map(SimpleExpr::from))
        .map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(statement.to_owned())
}

fn update<R: Record>(filter: &Filter, patch: &Patch) -> AppResult<UpdateStatement> {
    filter.validate::<R>()?;
    patch.validate::<R>()?;

    let mut statement = Query::update();
    statement.table(table::<R>()).values(
        patch
            .assignments()
            .map(|(field, value)| (Alias::new(field), SimpleExpr::from(value))),
    );
    for (field, value) in filter.conditions() {
        statement.and_where(condition(field, value));
    }
    Ok(statement.to_owned())
}

fn delete<R: Record>(filter: &Filter) -> AppResult<DeleteStatement> {
    filter.validate::<R>()?;

    let mut statement = Query::delete();
    statement.from_table(table::<R>());
    for (field, value) in filter.conditions() {
        statement.and_where(condition(field, value));
    }
    Ok(statement.to_owned())
}

/// Column values of a record in `FIELDS` order.
fn record_values<R: Record>(record: &R) -> AppResult<Vec<String>> {
    let object = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        other => {
            return Err(AppError::from(StoreError::Codec(format!(
                "record encoded as non-object: {}",
                other
            ))))
        }
    };

    R::FIELDS
        .iter()
        .map(|field| match object.get(*field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => {
                Err(AppError::from(StoreError::Codec(format!("missing column value: {}", field))))
            }
            Some(other) => Ok(other.to_string()),
        })
        .collect()
}

/// Scan one row positionally into a fresh record.
fn from_row<R: Record>(row: &QueryResult) -> AppResult<R> {
    let mut object = Map::new();
    for (index, field) in R::FIELDS.iter().enumerate() {
        let value: String = row.try_get_by_index(index)?;
        object.insert(field.to_string(), Value::String(value));
    }
    Ok(serde_json::from_value(Value::Object(object))?)
}

fn connection_error(err: DbErr) -> AppError {
    AppError::from(StoreError::Connection(err.to_string()))
}

fn map_write_error<R: Record>(err: DbErr) -> AppError {
    let kind = err.sql_err();
    classify_write_error::<R>(err, kind)
}

fn classify_write_error<R: Record>(err: DbErr, kind: Option<SqlErr>) -> AppError {
    match kind {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            debug!(%detail, "MySQL unique constraint violated");
            AppError::already_exists(R::UNIQUE_FIELDS.first().copied().unwrap_or(R::ID_FIELD))
        }
        _ => AppError::from(err),
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MySqlStore<R> {
    fn backend(&self) -> &'static str {
        "mysql"
    }

    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn parse_id(&self, raw: &str) -> AppResult<String> {
        Uuid::parse_str(raw)
            .map(|id| id.to_string())
            .map_err(|_| AppError::invalid_id(raw))
    }

    async fn create(&self, record: &R) -> AppResult<()> {
        let statement = self.db.get_database_backend().build(&insert(record)?);
        self.db
            .execute(statement)
            .await
            .map_err(map_write_error::<R>)?;
        Ok(())
    }

    async fn read(&self, filter: &Filter) -> AppResult<Vec<R>> {
        let statement = self.db.get_database_backend().build(&select::<R>(filter)?);
        let rows = self.db.query_all(statement).await?;

        debug!(matched = rows.len(), "MySQL read");
        rows.iter().map(from_row::<R>).collect()
    }

    async fn update(&self, filter: &Filter, patch: &Patch) -> AppResult<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let statement = self
            .db
            .get_database_backend()
            .build(&update::<R>(filter, patch)?);
        let result = self
            .db
            .execute(statement)
            .await
            .map_err(map_write_error::<R>)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, filter: &Filter) -> AppResult<u64> {
        let statement = self.db.get_database_backend().build(&delete::<R>(filter)?);
        let result = self.db.execute(statement).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AppResult<()> {
        self.db.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NewUser, User};
    use sea_orm::{DbBackend, Value as SqlValue};

    #[test]
    fn test_select_all_has_no_where() {
        let statement = DbBackend::MySql.build(&select::<User>(&Filter::all()).unwrap());

        assert_eq!(
            statement.sql,
            "SELECT `id`, `username`, `password` FROM `users`"
        );
    }

    #[test]
    fn test_select_binds_values() {
        let hostile = "x' OR '1'='1";
        let statement =
            DbBackend::MySql.build(&select::<User>(&Filter::by("username", hostile)).unwrap());

        assert_eq!(
            statement.sql,
            "SELECT `id`, `username`, `password` FROM `users` WHERE `username` = ?"
        );
        let values = statement.values.unwrap().0;
        assert_eq!(values, vec![SqlValue::from(hostile)]);
    }

    #[test]
    fn test_insert_binds_columns_in_order() {
        let user = User::from_new("u-1".to_string(), NewUser::new("alice", "hash"));
        let statement = DbBackend::MySql.build(&insert(&user).unwrap());

        assert_eq!(
            statement.sql,
            "INSERT INTO `users` (`id`, `username`, `password`) VALUES (?, ?, ?)"
        );
        let values = statement.values.unwrap().0;
        assert_eq!(
            values,
            vec![
                SqlValue::from("u-1"),
                SqlValue::from("alice"),
                SqlValue::from("hash")
            ]
        );
    }

    #[test]
    fn test_unknown_field_never_reaches_sql() {
        let result = select::<User>(&Filter::by("1=1; DROP TABLE users; --", "x"));
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::UnknownField(_)))
        ));
    }

    #[test]
    fn test_update_and_delete_statements() {
        let filter = Filter::by("username", "alice");
        let statement = DbBackend::MySql
            .build(&update::<User>(&filter, &Patch::new().set("password", "new")).unwrap());
        assert_eq!(
            statement.sql,
            "UPDATE `users` SET `password` = ? WHERE `username` = ?"
        );

        let statement = DbBackend::MySql.build(&delete::<User>(&filter).unwrap());
        assert_eq!(statement.sql, "DELETE FROM `users` WHERE `username` = ?");
    }

    #[test]
    fn test_create_table_has_unique_username() {
        let statement = DbBackend::MySql.build(&create_table::<User>());

        assert!(statement.sql.starts_with("CREATE TABLE IF NOT EXISTS `users`"));
        assert!(statement.sql.contains("PRIMARY KEY"));
        assert!(statement.sql.contains("UNIQUE"));
        assert!(statement.sql.contains("`uq_users_username`"));
        assert!(statement.sql.contains("utf8mb4_bin"));
    }

    #[test]
    fn test_unique_violation_maps_to_already_exists() {
        let err = DbErr::Custom("Duplicate entry 'alice' for key 'uq_users_username'".into());
        let kind = Some(SqlErr::UniqueConstraintViolation(
            "Duplicate entry 'alice' for key 'uq_users_username'".into(),
        ));

        let mapped = classify_write_error::<User>(err, kind);

        assert!(matches!(mapped, AppError::AlreadyExists(ref field) if field == "username"));
    }

    #[test]
    fn test_other_write_errors_stay_store_errors() {
        let mapped = classify_write_error::<User>(DbErr::Custom("disk full".into()), None);

        assert!(matches!(mapped, AppError::Store(StoreError::Database(_))));
    }
}
