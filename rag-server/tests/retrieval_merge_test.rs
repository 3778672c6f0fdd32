//! Multi-collection merge and re-rank tests

mod support;

use std::time::Duration;

use rag_server::retrieval::{CollectionHandle, EmbeddingSpace, VectorIndex, DEFAULT_SEARCH_TIMEOUT};
use rag_server::store::{DocumentRecord, SqliteCollectionStore, VecStore};
use rag_server::types::{DistanceMetric, Metadata};

use support::{FailingCollection, HangingCollection, ScriptedCollection, DIMS};

fn unit(axis: usize, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0; dims];
    v[axis] = 1.0;
    v
}

#[tokio::test]
async fn test_merge_interleaves_collections_by_distance() {
    let index = VectorIndex::from_collections(vec![
        ScriptedCollection::with_distances("first", &[0.1, 0.4]).shared(),
        ScriptedCollection::with_distances("second", &[0.2, 0.05]).shared(),
    ]);

    let ranked = index.query(&[0.0; DIMS], 3).await;

    assert_eq!(ranked.distances(), vec![0.05, 0.1, 0.2]);
    let sources: Vec<&str> = ranked.iter().map(|m| m.collection.as_str()).collect();
    assert_eq!(sources, vec!["second", "first", "second"]);
}

#[tokio::test]
async fn test_merge_length_is_min_of_k_and_total() {
    let index = VectorIndex::from_collections(vec![
        ScriptedCollection::with_distances("a", &[0.3]).shared(),
        ScriptedCollection::with_distances("b", &[0.2, 0.6, 0.9]).shared(),
    ]);

    assert_eq!(index.query(&[0.0; DIMS], 10).await.len(), 4);
    assert_eq!(index.query(&[0.0; DIMS], 2).await.len(), 2);
    assert!(index.query(&[0.0; DIMS], 0).await.is_empty());
}

#[tokio::test]
async fn test_merge_output_is_non_decreasing() {
    let index = VectorIndex::from_collections(vec![
        ScriptedCollection::with_distances("a", &[0.9, 0.3, 0.7]).shared(),
        ScriptedCollection::with_distances("b", &[0.5, 0.1]).shared(),
        ScriptedCollection::with_distances("c", &[0.4]).shared(),
    ]);

    let distances = index.query(&[0.0; DIMS], 5).await.distances();
    assert_eq!(distances.len(), 5);
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_ties_keep_configured_collection_order() {
    let index = VectorIndex::from_collections(vec![
        ScriptedCollection::with_distances("merged_collection", &[0.2]).shared(),
        ScriptedCollection::with_distances("langchain", &[0.2]).shared(),
    ]);

    let ranked = index.query(&[0.0; DIMS], 2).await;
    assert_eq!(ranked.matches()[0].collection, "merged_collection");
    assert_eq!(ranked.matches()[1].collection, "langchain");
}

#[tokio::test]
async fn test_zero_ready_collections_yields_empty_result() {
    let index = VectorIndex::from_handles(vec![
        CollectionHandle::not_ready("merged_collection", "missing"),
        CollectionHandle::not_ready("langchain", "missing"),
    ]);

    assert!(!index.is_ready());
    assert!(index.query(&[0.0; DIMS], 5).await.is_empty());
}

#[tokio::test]
async fn test_failing_collection_is_skipped() {
    let index = VectorIndex::from_collections(vec![
        FailingCollection::new("broken").shared(),
        ScriptedCollection::with_distances("healthy", &[0.3, 0.1]).shared(),
    ]);

    let ranked = index.query(&[0.0; DIMS], 5).await;
    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|m| m.collection == "healthy"));
}

#[tokio::test]
async fn test_slow_collection_is_skipped_after_search_timeout() {
    let index = VectorIndex::from_collections(vec![
        ScriptedCollection::with_distances("healthy", &[0.4, 0.2]).shared(),
        HangingCollection::new("stalled").shared(),
    ])
    .with_search_timeout(Duration::from_millis(50));
    assert_eq!(index.search_timeout(), Duration::from_millis(50));

    let ranked = tokio::time::timeout(Duration::from_secs(5), index.query(&[0.0; DIMS], 5))
        .await
        .expect("query should not wait on the stalled collection");

    assert_eq!(ranked.distances(), vec![0.2, 0.4]);
    assert!(ranked.iter().all(|m| m.collection == "healthy"));
}

#[test]
fn test_index_starts_with_default_search_timeout() {
    let index = VectorIndex::from_handles(Vec::new());
    assert_eq!(index.search_timeout(), DEFAULT_SEARCH_TIMEOUT);
}

#[tokio::test]
async fn test_open_excludes_missing_and_mismatched_collections() {
    let store = VecStore::open(":memory:").unwrap();
    store.create_collection("guides", DIMS, DistanceMetric::L2).unwrap();
    store.create_collection("wide", DIMS * 2, DistanceMetric::L2).unwrap();
    store.create_collection("angular", DIMS, DistanceMetric::Cosine).unwrap();
    for (name, dims) in [("guides", DIMS), ("wide", DIMS * 2), ("angular", DIMS)] {
        store
            .add(
                name,
                &DocumentRecord {
                    id: format!("{name}-1"),
                    document: format!("{name} passage"),
                    metadata: Metadata::new().with("title", name),
                    embedding: unit(0, dims),
                },
            )
            .unwrap();
    }
    let store = SqliteCollectionStore::new(store);

    let names: Vec<String> = ["guides", "wide", "angular", "absent"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let space = EmbeddingSpace {
        dimension: DIMS,
        metric: DistanceMetric::L2,
    };
    let index = VectorIndex::open(&store, &names, Some(space)).await;

    let ready: Vec<(&str, bool)> = index.handles().iter().map(|h| (h.name(), h.is_ready())).collect();
    assert_eq!(
        ready,
        vec![("guides", true), ("wide", false), ("angular", false), ("absent", false)]
    );
    assert!(index.handles()[1].fault().unwrap().contains("dimension"));
    assert!(index.handles()[2].fault().unwrap().contains("metric"));

    let ranked = index.query(&unit(0, DIMS), 5).await;
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked.matches()[0].collection, "guides");
    assert_eq!(ranked.matches()[0].distance, 0.0);
}

#[tokio::test]
async fn test_sqlite_collections_rank_nearest_first() {
    let store = VecStore::open(":memory:").unwrap();
    store.create_collection("a", DIMS, DistanceMetric::L2).unwrap();
    store.create_collection("b", DIMS, DistanceMetric::L2).unwrap();

    let add = |name: &str, id: &str, vector: Vec<f32>| {
        store
            .add(
                name,
                &DocumentRecord {
                    id: id.to_string(),
                    document: format!("passage {id}"),
                    metadata: Metadata::new(),
                    embedding: vector,
                },
            )
            .unwrap()
    };
    let mut near = unit(0, DIMS);
    near[1] = 0.1;
    assert!(add("a", "exact", unit(0, DIMS)));
    assert!(add("a", "far", unit(2, DIMS)));
    assert!(add("b", "near", near));

    let store = SqliteCollectionStore::new(store);
    let names = vec!["a".to_string(), "b".to_string()];
    let index = VectorIndex::open(&store, &names, None).await;

    let ranked = index.query(&unit(0, DIMS), 3).await;
    let ids: Vec<&str> = ranked.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["exact", "near", "far"]);
}
