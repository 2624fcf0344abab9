use std::path::Path;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use store_api::{
    apply_increment, Document, Fields, Filter, Patch, Query, RemoteStore, Result, StoreError,
    Subscription,
};
use tracing::debug;
use uuid::Uuid;

use crate::clock::ServerClock;
use crate::subscribers::Subscribers;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
  collection TEXT NOT NULL,
  id TEXT NOT NULL,
  body TEXT NOT NULL,
  PRIMARY KEY (collection, id)
);
"#;

/// Document store persisted in a single SQLite table. Each document body is
/// kept as JSON; filtering and ordering happen after the collection scan.
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    clock: ServerClock,
    subscribers: Subscribers,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(StoreError::backend)?;
        }
        let manager = SqliteConnectionManager::file(path)
            .with_init(|c| c.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::new(manager).map_err(StoreError::backend)?;
        debug!(path = %path.display(), "opened document store");
        Self::from_pool(pool)
    }

    /// Private in-memory database. A single pooled connection keeps every
    /// caller on the same database.
    pub fn in_memory() -> Result<Self> {
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .map_err(StoreError::backend)?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        pool.get()
            .map_err(StoreError::backend)?
            .execute_batch(SCHEMA)
            .map_err(StoreError::backend)?;
        Ok(Self {
            pool,
            clock: ServerClock::new(),
            subscribers: Subscribers::new(),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(StoreError::backend)?;
            f(&mut conn)
        })
        .await
        .map_err(StoreError::backend)?
    }

    async fn modify<F>(&self, collection: &str, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Fields) -> Result<()> + Send + 'static,
    {
        let (c, i) = (collection.to_string(), id.to_string());
        let (before, after) = self
            .blocking(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(StoreError::backend)?;
                let before = load(&tx, &c, &i)?.ok_or_else(|| StoreError::not_found(&c, &i))?;
                let mut after = before.clone();
                f(&mut after)?;
                save(&tx, &c, &i, &after)?;
                tx.commit().map_err(StoreError::backend)?;
                Ok((before, after))
            })
            .await?;
        self.subscribers.publish(
            collection,
            Some(&Document::new(id, before)),
            &Document::new(id, after),
        );
        Ok(())
    }

    async fn insert(&self, collection: &str, id: &str, patch: Patch) -> Result<bool> {
        let mut fields = Fields::new();
        patch.apply(&mut fields, self.clock.now_ms());
        let (c, i, body) = (collection.to_string(), id.to_string(), fields.clone());
        let inserted = self
            .blocking(move |conn| {
                let tx = conn
                    .transaction_with_behavior(TransactionBehavior::Immediate)
                    .map_err(StoreError::backend)?;
                if load(&tx, &c, &i)?.is_some() {
                    return Ok(false);
                }
                save(&tx, &c, &i, &body)?;
                tx.commit().map_err(StoreError::backend)?;
                Ok(true)
            })
            .await?;
        if inserted {
            self.subscribers
                .publish(collection, None, &Document::new(id, fields));
        }
        Ok(inserted)
    }
}

fn load(conn: &Connection, collection: &str, id: &str) -> Result<Option<Fields>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::backend)?;
    Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
}

fn save(conn: &Connection, collection: &str, id: &str, fields: &Fields) -> Result<()> {
    let body = serde_json::to_string(fields)?;
    conn.execute(
        "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3) \
         ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
        params![collection, id, body],
    )
    .map_err(StoreError::backend)?;
    Ok(())
}

fn scan(conn: &Connection, collection: &str) -> Result<Vec<Document>> {
    let mut stmt = conn
        .prepare("SELECT id, body FROM documents WHERE collection = ?1")
        .map_err(StoreError::backend)?;
    let rows = stmt
        .query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(StoreError::backend)?;
    let mut docs = Vec::new();
    for row in rows {
        let (id, body) = row.map_err(StoreError::backend)?;
        docs.push(Document::new(id, serde_json::from_str(&body)?));
    }
    Ok(docs)
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let c = collection.to_string();
        let docs = self.blocking(move |conn| scan(conn, &c)).await?;
        Ok(query.apply(docs))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let (c, i) = (collection.to_string(), id.to_string());
        let fields = self.blocking(move |conn| load(conn, &c, &i)).await?;
        Ok(fields.map(|f| Document::new(id, f)))
    }

    async fn add(&self, collection: &str, patch: Patch) -> Result<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.insert(collection, &id, patch).await?;
        Ok(id)
    }

    async fn create(&self, collection: &str, id: &str, patch: Patch) -> Result<bool> {
        self.insert(collection, id, patch).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Patch) -> Result<()> {
        let now = self.clock.now_ms();
        self.modify(collection, id, move |fields| {
            patch.apply(fields, now);
            Ok(())
        })
        .await
    }

    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()> {
        let (c, i, f) = (collection.to_string(), id.to_string(), field.to_string());
        self.modify(collection, id, move |fields| {
            if apply_increment(fields, &f, delta) {
                Ok(())
            } else {
                Err(StoreError::NotNumeric {
                    collection: c,
                    id: i,
                    field: f,
                })
            }
        })
        .await
    }

    fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Subscription {
        self.subscribers.subscribe(collection, filters)
    }
}
