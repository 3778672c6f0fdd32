//! SQLite-backed vector collections.
//!
//! Every collection lives in one SQLite file:
//!
//! | Table             | Unit                                                        |
//! |-------------------|-------------------------------------------------------------|
//! | `rag_collections` | One row per collection: embedding dimension + distance metric |
//! | `rag_documents`   | One row per passage: text, JSON metadata, f32-LE embedding  |
//!
//! Dedup: passages are keyed by `chunk_hash` (SHA-256 hex of the text) per
//! collection. Re-adding the same text is skipped.
//!
//! The corpus is fixed while the service runs, so opening a collection loads
//! an immutable [`CollectionSnapshot`] that concurrent queries search without
//! locking.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::types::{DistanceMetric, Match, Metadata};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("collection not found: {0}")]
    NotFound(String),
    #[error("collection {name} holds {expected}-dim vectors, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("collection {name} already exists as {dimension}-dim {metric}")]
    Conflict {
        name: String,
        dimension: usize,
        metric: DistanceMetric,
    },
    #[error("invalid collection definition for {name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("search did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

/// Shape of a collection, fixed when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Passage count when the info was read
    pub documents: usize,
}

/// A passage to add to a collection.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

// ─── Seams ───────────────────────────────────────────────────────────────────

/// One named, searchable vector collection.
#[async_trait]
pub trait Collection: Send + Sync {
    fn info(&self) -> &CollectionInfo;

    fn name(&self) -> &str {
        &self.info().name
    }

    /// Up to `k` nearest passages, ascending by distance.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Match>, StoreError>;
}

/// Opens collections by name.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn open_collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Thin wrapper around a rusqlite Connection.
///
/// All methods are synchronous. Async callers go through
/// [`SqliteCollectionStore`], which runs them on the blocking pool.
pub struct VecStore {
    conn: rusqlite::Connection,
}

impl VecStore {
    /// Open (or create) the store at the given SQLite path.
    /// Use `":memory:"` for in-process test stores.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = if path == ":memory:" {
            rusqlite::Connection::open_in_memory()?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::Task(format!("create {}: {e}", parent.display())))?;
                }
            }
            rusqlite::Connection::open(path)?
        };

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rag_collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rag_documents (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL REFERENCES rag_collections(name),
                doc_id TEXT NOT NULL,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                chunk_hash TEXT NOT NULL,
                UNIQUE(collection, doc_id),
                UNIQUE(collection, chunk_hash)
            );
            CREATE INDEX IF NOT EXISTS idx_rag_documents_collection
                ON rag_documents(collection);
            "#,
        )?;

        Ok(VecStore { conn })
    }

    /// Create a collection. Re-creating with the same shape is a no-op;
    /// a different dimension or metric is a [`StoreError::Conflict`].
    pub fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<CollectionInfo, StoreError> {
        if name.trim().is_empty() || dimension == 0 {
            return Err(StoreError::Invalid {
                name: name.to_string(),
                reason: "name must be non-empty and dimension positive".to_string(),
            });
        }

        if let Some(existing) = self.collection_info(name)? {
            if existing.dimension != dimension || existing.metric != metric {
                return Err(StoreError::Conflict {
                    name: name.to_string(),
                    dimension: existing.dimension,
                    metric: existing.metric,
                });
            }
            return Ok(existing);
        }

        self.conn.execute(
            "INSERT INTO rag_collections(name, dimension, metric, created_at) VALUES (?, ?, ?, ?)",
            rusqlite::params![
                name,
                dimension as i64,
                metric.as_str(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimension,
            metric,
            documents: 0,
        })
    }

    pub fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let Some((dimension, metric)) = self.collection_shape(name)? else {
            return Ok(None);
        };
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            dimension,
            metric,
            documents: self.count(name)?,
        }))
    }

    /// Dimension and metric only; no document count.
    fn collection_shape(&self, name: &str) -> Result<Option<(usize, DistanceMetric)>, StoreError> {
        let row = self.conn.query_row(
            "SELECT dimension, metric FROM rag_collections WHERE name = ? LIMIT 1",
            rusqlite::params![name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );

        let (dimension, metric) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let metric = DistanceMetric::parse(&metric).ok_or_else(|| StoreError::Invalid {
            name: name.to_string(),
            reason: format!("unknown distance metric '{metric}'"),
        })?;
        Ok(Some((dimension as usize, metric)))
    }

    pub fn count(&self, name: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM rag_documents WHERE collection = ?",
            rusqlite::params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Check whether a passage with this `chunk_hash` already exists in `name`.
    pub fn hash_exists(&self, name: &str, chunk_hash: &str) -> Result<bool, StoreError> {
        match self.conn.query_row(
            "SELECT 1 FROM rag_documents WHERE collection = ? AND chunk_hash = ? LIMIT 1",
            rusqlite::params![name, chunk_hash],
            |_| Ok(()),
        ) {
            Ok(()) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Add one passage. Returns `false` when the text was already present.
    pub fn add(&self, name: &str, record: &DocumentRecord) -> Result<bool, StoreError> {
        let (dimension, _) = self
            .collection_shape(name)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if record.embedding.len() != dimension {
            return Err(StoreError::DimensionMismatch {
                name: name.to_string(),
                expected: dimension,
                actual: record.embedding.len(),
            });
        }

        let hash = chunk_hash(&record.document);
        if self.hash_exists(name, &hash)? {
            return Ok(false);
        }

        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| StoreError::Task(format!("metadata encode: {e}")))?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO rag_documents(collection, doc_id, document, metadata, embedding, chunk_hash)
             VALUES (?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                name,
                record.id,
                record.document,
                metadata,
                encode_embedding(&record.embedding),
                hash
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Load every passage of `name` into memory.
    pub fn load_snapshot(&self, name: &str) -> Result<CollectionSnapshot, StoreError> {
        let info = self
            .collection_info(name)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let mut stmt = self.conn.prepare(
            "SELECT doc_id, document, metadata, embedding FROM rag_documents
             WHERE collection = ? ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut passages = Vec::with_capacity(rows.len());
        for (id, document, metadata, blob) in rows {
            let embedding = match decode_embedding(&blob) {
                Some(v) if v.len() == info.dimension => v,
                _ => {
                    tracing::warn!(collection = %name, doc_id = %id, "Skipping passage with malformed embedding");
                    continue;
                }
            };
            let metadata = serde_json::from_str::<Metadata>(&metadata).unwrap_or_else(|e| {
                tracing::warn!(collection = %name, doc_id = %id, error = %e, "Unreadable passage metadata; using empty metadata");
                Metadata::new()
            });
            passages.push(StoredPassage {
                id,
                document,
                metadata,
                embedding,
            });
        }

        Ok(CollectionSnapshot {
            info: CollectionInfo {
                documents: passages.len(),
                ..info
            },
            passages,
        })
    }

    /// Exact k-NN over `name`, ascending by distance.
    pub fn search(&self, name: &str, vector: &[f32], k: usize) -> Result<Vec<Match>, StoreError> {
        self.load_snapshot(name)?.search(vector, k)
    }
}

#[derive(Debug, Clone)]
struct StoredPassage {
    id: String,
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// Immutable in-memory copy of one collection.
#[derive(Debug, Clone)]
pub struct CollectionSnapshot {
    info: CollectionInfo,
    passages: Vec<StoredPassage>,
}

impl CollectionSnapshot {
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// Brute-force nearest neighbors. Ties keep insertion order.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Match>, StoreError> {
        if vector.len() != self.info.dimension {
            return Err(StoreError::DimensionMismatch {
                name: self.info.name.clone(),
                expected: self.info.dimension,
                actual: vector.len(),
            });
        }

        let metric = self.info.metric;
        let mut scored: Vec<(f32, &StoredPassage)> = self
            .passages
            .iter()
            .map(|p| (metric.distance(vector, &p.embedding), p))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, p)| Match {
                id: p.id.clone(),
                collection: self.info.name.clone(),
                distance,
                document: p.document.clone(),
                metadata: p.metadata.clone(),
            })
            .collect())
    }
}

// ─── Async adapter ───────────────────────────────────────────────────────────

/// [`CollectionStore`] over a [`VecStore`] file.
#[derive(Clone)]
pub struct SqliteCollectionStore {
    inner: Arc<Mutex<VecStore>>,
}

impl SqliteCollectionStore {
    pub fn new(store: VecStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self::new(VecStore::open(path)?))
    }

    /// Run a closure against the store on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&VecStore) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| StoreError::Task("VecStore lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking panicked: {e}")))?
    }
}

#[async_trait]
impl CollectionStore for SqliteCollectionStore {
    async fn open_collection(&self, name: &str) -> Result<Arc<dyn Collection>, StoreError> {
        let name = name.to_string();
        let snapshot = self.with_store(move |store| store.load_snapshot(&name)).await?;
        Ok(Arc::new(SnapshotCollection::new(snapshot)))
    }
}

/// A [`Collection`] searched from a loaded snapshot.
pub struct SnapshotCollection {
    snapshot: Arc<CollectionSnapshot>,
}

impl SnapshotCollection {
    pub fn new(snapshot: CollectionSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }
}

#[async_trait]
impl Collection for SnapshotCollection {
    fn info(&self) -> &CollectionInfo {
        self.snapshot.info()
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<Match>, StoreError> {
        let snapshot = Arc::clone(&self.snapshot);
        let vector = vector.to_vec();
        tokio::task::spawn_blocking(move || snapshot.search(&vector, k))
            .await
            .map_err(|e| StoreError::Task(format!("search task panicked: {e}")))?
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Compute a hex SHA-256 hash for dedup keying.
pub fn chunk_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
