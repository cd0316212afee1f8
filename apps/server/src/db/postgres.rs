//! PostgreSQL content store

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Row, Transaction};
use std::time::Duration;

use super::traits::{ContentStore, StoreTransaction};
use crate::{
    config::StorageConfig,
    error::classify_database_error,
    models::{Acl, ContentObject},
    Error, Result,
};

const OBJECT_COLUMNS: &str = "path, parent_path, id, uid, type_name, title, data, acl, registry, \
                              version, creation_date, modification_date";

/// PostgreSQL backend for one database id; the pool is shared between databases.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    database_id: String,
}

impl PostgresStore {
    pub fn new(pool: PgPool, database_id: impl Into<String>) -> Self {
        Self {
            pool,
            database_id: database_id.into(),
        }
    }

    /// Open the connection pool and apply embedded migrations when configured.
    pub async fn connect(config: &StorageConfig) -> Result<PgPool> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| Error::Configuration("storage.url is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min_size)
            .max_connections(config.pool_max_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .connect(url)
            .await?;

        if config.run_migrations {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| Error::Configuration(format!("Migration failed: {e}")))?;
        }

        Ok(pool)
    }
}

#[async_trait]
impl ContentStore for PostgresStore {
    fn database_id(&self) -> &str {
        &self.database_id
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PostgresTransaction {
            database_id: self.database_id.clone(),
            tx: Some(tx),
            dirty: false,
        }))
    }
}

/// PostgreSQL transaction; sqlx rolls back on drop if never committed.
struct PostgresTransaction {
    database_id: String,
    tx: Option<Transaction<'static, Postgres>>,
    dirty: bool,
}

impl PostgresTransaction {
    fn tx_mut(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx.as_mut().ok_or_else(|| {
            Error::Internal("Transaction already committed or rolled back".to_string())
        })
    }

    fn row_to_object(row: &sqlx::postgres::PgRow) -> Result<ContentObject> {
        let type_name: String = row.try_get("type_name")?;
        let data: JsonValue = row.try_get("data")?;
        let acl: JsonValue = row.try_get("acl")?;
        let registry: JsonValue = row.try_get("registry")?;

        Ok(ContentObject {
            id: row.try_get("id")?,
            uid: row.try_get("uid")?,
            type_name: type_name.parse()?,
            path: row.try_get("path")?,
            parent_path: row.try_get("parent_path")?,
            title: row.try_get("title")?,
            data: into_object(data),
            acl: serde_json::from_value::<Acl>(acl)
                .map_err(|e| Error::Internal(format!("Corrupt ACL: {e}")))?,
            registry: into_object(registry),
            version: row.try_get("version")?,
            creation_date: row.try_get("creation_date")?,
            modification_date: row.try_get("modification_date")?,
            inherited: Vec::new(),
        })
    }

    async fn exists(&mut self, path: &str) -> Result<bool> {
        let database_id = self.database_id.clone();
        let tx = self.tx_mut()?;
        let row = sqlx::query("SELECT 1 FROM objects WHERE db = $1 AND path = $2")
            .bind(&database_id)
            .bind(path)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| classify_database_error(e, path))?;
        Ok(row.is_some())
    }
}

fn into_object(value: JsonValue) -> serde_json::Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn acl_json(acl: &Acl) -> Result<JsonValue> {
    serde_json::to_value(acl).map_err(|e| Error::Internal(format!("Cannot encode ACL: {e}")))
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn read(&mut self, path: &str) -> Result<Option<ContentObject>> {
        let database_id = self.database_id.clone();
        let tx = self.tx_mut()?;

        let row = sqlx::query(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE db = $1 AND path = $2"
        ))
        .bind(&database_id)
        .bind(path)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| classify_database_error(e, path))?;

        row.as_ref().map(Self::row_to_object).transpose()
    }

    async fn children(&mut self, path: &str) -> Result<Vec<ContentObject>> {
        let database_id = self.database_id.clone();
        let tx = self.tx_mut()?;

        let rows = sqlx::query(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects
             WHERE db = $1 AND parent_path = $2
             ORDER BY path"
        ))
        .bind(&database_id)
        .bind(path)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| classify_database_error(e, path))?;

        rows.iter().map(Self::row_to_object).collect()
    }

    async fn insert(&mut self, mut object: ContentObject) -> Result<ContentObject> {
        let database_id = self.database_id.clone();
        let acl = acl_json(&object.acl)?;
        let tx = self.tx_mut()?;

        sqlx::query(
            "INSERT INTO objects (db, path, parent_path, id, uid, type_name, title, data, acl,
                                  registry, version, creation_date, modification_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11, $12)",
        )
        .bind(&database_id)
        .bind(&object.path)
        .bind(&object.parent_path)
        .bind(&object.id)
        .bind(object.uid)
        .bind(object.type_name.as_str())
        .bind(&object.title)
        .bind(JsonValue::Object(object.data.clone()))
        .bind(acl)
        .bind(JsonValue::Object(object.registry.clone()))
        .bind(object.creation_date)
        .bind(object.modification_date)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify_database_error(e, &object.id))?;

        self.dirty = true;
        object.version = 1;
        Ok(object)
    }

    async fn update(&mut self, mut object: ContentObject) -> Result<ContentObject> {
        let database_id = self.database_id.clone();
        let acl = acl_json(&object.acl)?;
        let tx = self.tx_mut()?;

        let updated = sqlx::query(
            "UPDATE objects
             SET title = $4, data = $5, acl = $6, registry = $7,
                 modification_date = $8, version = version + 1
             WHERE db = $1 AND path = $2 AND version = $3",
        )
        .bind(&database_id)
        .bind(&object.path)
        .bind(object.version)
        .bind(&object.title)
        .bind(JsonValue::Object(object.data.clone()))
        .bind(acl)
        .bind(JsonValue::Object(object.registry.clone()))
        .bind(object.modification_date)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify_database_error(e, &object.path))?
        .rows_affected();

        if updated == 0 {
            return if self.exists(&object.path).await? {
                Err(Error::WriteConflict(format!(
                    "{} was modified by a concurrent transaction",
                    object.path
                )))
            } else {
                Err(Error::NotFound(object.path.clone()))
            };
        }

        self.dirty = true;
        object.version += 1;
        Ok(object)
    }

    async fn delete(&mut self, path: &str) -> Result<()> {
        let database_id = self.database_id.clone();
        let tx = self.tx_mut()?;

        let deleted = sqlx::query(
            "DELETE FROM objects
             WHERE db = $1
               AND (path = $2 OR left(path, length($2) + 1) = $2 || '/')",
        )
        .bind(&database_id)
        .bind(path)
        .execute(&mut **tx)
        .await
        .map_err(|e| classify_database_error(e, path))?
        .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound(path.to_string()));
        }

        self.dirty = true;
        Ok(())
    }

    fn has_writes(&self) -> bool {
        self.dirty
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already committed".to_string()))?;

        tx.commit()
            .await
            .map_err(|e| classify_database_error(e, "commit"))
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already rolled back".to_string()))?;

        tx.rollback().await.map_err(Error::Database)
    }
}
