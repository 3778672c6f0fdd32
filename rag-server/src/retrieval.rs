//! Multi-collection retrieval: fan out, merge, globally re-rank.
//!
//! Collections are opened once at startup in configured order. A collection
//! that fails to open, or whose embedding space does not match the one the
//! index was opened for, stays not-ready for the life of the process.
//!
//! Per query every ready collection is searched for `k` passages, the pools
//! are concatenated in configured order, stable-sorted by ascending distance
//! and truncated to `k`. A collection whose search fails is logged and left
//! out of that query's merge, as is one that does not answer within the
//! index's search timeout.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::store::{Collection, CollectionInfo, CollectionStore, StoreError};
use crate::types::{DistanceMetric, Match, RankedResult};

/// Dimension and metric shared by every collection merged together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingSpace {
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// Startup outcome for one configured collection.
pub struct CollectionHandle {
    name: String,
    collection: Option<Arc<dyn Collection>>,
    /// Why the collection is not ready
    fault: Option<String>,
}

impl CollectionHandle {
    pub fn ready(collection: Arc<dyn Collection>) -> Self {
        Self {
            name: collection.name().to_string(),
            collection: Some(collection),
            fault: None,
        }
    }

    pub fn not_ready(name: impl Into<String>, fault: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            fault: Some(fault.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.collection.is_some()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn info(&self) -> Option<&CollectionInfo> {
        self.collection.as_ref().map(|c| c.info())
    }
}

impl std::fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .field("fault", &self.fault)
            .finish()
    }
}

pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// The set of collections queried together.
#[derive(Debug)]
pub struct VectorIndex {
    handles: Vec<CollectionHandle>,
    /// Per-collection bound on one search
    search_timeout: Duration,
}

impl VectorIndex {
    /// Open each named collection. Failures are recorded, not returned.
    ///
    /// With `space` set, collections built with another dimension or metric
    /// are excluded so distances stay comparable across the merge.
    pub async fn open(
        store: &dyn CollectionStore,
        names: &[String],
        space: Option<EmbeddingSpace>,
    ) -> Self {
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            let handle = match store.open_collection(name).await {
                Ok(collection) => match space.and_then(|s| space_mismatch(collection.info(), s)) {
                    Some(reason) => {
                        tracing::warn!(collection = %name, reason = %reason, "Collection excluded from retrieval");
                        CollectionHandle::not_ready(name.clone(), reason)
                    }
                    None => {
                        tracing::info!(
                            collection = %name,
                            documents = collection.info().documents,
                            dimension = collection.info().dimension,
                            metric = %collection.info().metric,
                            "Collection loaded"
                        );
                        CollectionHandle::ready(collection)
                    }
                },
                Err(e) => {
                    tracing::error!(collection = %name, error = %e, "Failed to load collection; it will be skipped");
                    CollectionHandle::not_ready(name.clone(), e.to_string())
                }
            };
            handles.push(handle);
        }

        let index = Self::from_handles(handles);
        if !index.is_ready() {
            tracing::error!(configured = names.len(), "No vector collection is ready");
        }
        index
    }

    /// Index over already-open collections, all ready, in the given order.
    pub fn from_collections(collections: Vec<Arc<dyn Collection>>) -> Self {
        Self::from_handles(collections.into_iter().map(CollectionHandle::ready).collect())
    }

    pub fn from_handles(handles: Vec<CollectionHandle>) -> Self {
        Self {
            handles,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    pub fn handles(&self) -> &[CollectionHandle] {
        &self.handles
    }

    pub fn ready_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_ready()).count()
    }

    /// True when at least one collection can be searched.
    pub fn is_ready(&self) -> bool {
        self.ready_count() > 0
    }

    /// Top-`k` passages across all ready collections.
    pub async fn query(&self, vector: &[f32], k: usize) -> RankedResult {
        if k == 0 {
            return RankedResult::empty();
        }

        let ready: Vec<&Arc<dyn Collection>> =
            self.handles.iter().filter_map(|h| h.collection.as_ref()).collect();
        if ready.is_empty() {
            return RankedResult::empty();
        }

        // join_all keeps the configured order regardless of completion order.
        let outcomes = join_all(ready.iter().map(|c| self.search_one(c, vector, k))).await;

        let mut pool = Vec::new();
        for (collection, outcome) in ready.iter().zip(outcomes) {
            match outcome {
                Ok(matches) => {
                    tracing::debug!(collection = %collection.name(), hits = matches.len(), "Collection searched");
                    pool.extend(matches);
                }
                Err(e) => log_search_failure(collection.name(), &e),
            }
        }

        RankedResult::rank(pool, k)
    }

    async fn search_one(
        &self,
        collection: &Arc<dyn Collection>,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<Match>, StoreError> {
        tokio::time::timeout(self.search_timeout, collection.search(vector, k))
            .await
            .unwrap_or(Err(StoreError::Timeout(self.search_timeout)))
    }
}

fn space_mismatch(info: &CollectionInfo, space: EmbeddingSpace) -> Option<String> {
    if info.dimension != space.dimension {
        return Some(format!(
            "dimension {} does not match embedder dimension {}",
            info.dimension, space.dimension
        ));
    }
    if info.metric != space.metric {
        return Some(format!(
            "distance metric {} does not match configured metric {}",
            info.metric, space.metric
        ));
    }
    None
}

fn log_search_failure(collection: &str, error: &StoreError) {
    tracing::warn!(collection = %collection, error = %error, "Collection search failed; merging remaining collections");
}
