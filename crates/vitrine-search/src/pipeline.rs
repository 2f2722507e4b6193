//! Catalog search pipeline.
//!
//! `SearchPipeline` runs a query through encode, normalize, index lookup,
//! and catalog materialization, producing a [`SearchOutcome`] or a typed
//! failure naming the stage that broke. Stages never retry; the caller
//! decides whether to ask again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use vitrine_core::config::SearchConfig;
use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::{CatalogItem, ResultSet, SearchOutcome};

use crate::catalog::{embedding_text, CatalogStore};
use crate::embedding::{DynEmbeddingService, EmbeddingService};
use crate::index::{l2_normalize, FlatIndex, VectorIndex};

/// Query-to-results pipeline over injected embedding and index backends.
///
/// Uses dynamic dispatch (`Box<dyn DynEmbeddingService>`) so that production
/// code can supply `OnnxEmbedder` while tests use `MockEmbedding`.
pub struct SearchPipeline {
    embedder: Box<dyn DynEmbeddingService>,
    index: Arc<dyn VectorIndex>,
    catalog: Arc<CatalogStore>,
    top_k: usize,
    embed_timeout: Duration,
    index_timeout: Duration,
}

impl SearchPipeline {
    /// Create a pipeline from a concrete embedding service.
    pub fn new(
        embedder: impl EmbeddingService + 'static,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<CatalogStore>,
        config: &SearchConfig,
    ) -> Self {
        Self::new_dyn(Box::new(embedder), index, catalog, config)
    }

    /// Create a pipeline from a pre-boxed dynamic embedding service.
    pub fn new_dyn(
        embedder: Box<dyn DynEmbeddingService>,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<CatalogStore>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            catalog,
            top_k: config.top_k,
            embed_timeout: Duration::from_millis(config.embed_timeout_ms),
            index_timeout: Duration::from_millis(config.index_timeout_ms),
        }
    }

    /// Run a query with the configured result count.
    pub async fn run(&self, query: &str) -> Result<SearchOutcome> {
        self.run_with_k(query, self.top_k).await
    }

    /// Run a query asking for a specific number of results.
    pub async fn run_with_k(&self, query: &str, k: usize) -> Result<SearchOutcome> {
        let started = Instant::now();

        // Encode the query, bounded by the embed timeout.
        let embed = self.embedder.embed_boxed(query);
        let mut embedding = match tokio::time::timeout(self.embed_timeout, embed).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!(error = %e, "Query encoding failed");
                return Err(e);
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.embed_timeout.as_millis() as u64,
                    "Query encoding timed out"
                );
                return Err(VitrineError::Encoding("Query encoding timed out".to_string()));
            }
        };

        // Unit-normalize so inner product equals cosine similarity.
        l2_normalize(&mut embedding);

        // Nearest-neighbour lookup on a blocking thread, bounded by the
        // index timeout.
        let index = Arc::clone(&self.index);
        let lookup = tokio::task::spawn_blocking(move || index.search(&embedding, k));
        let hits = match tokio::time::timeout(self.index_timeout, lookup).await {
            Ok(Ok(Ok(hits))) => hits,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Index lookup failed");
                return Err(e);
            }
            Ok(Err(e)) => {
                return Err(VitrineError::Index(format!("Index task panicked: {}", e)));
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.index_timeout.as_millis() as u64,
                    "Index lookup timed out"
                );
                return Err(VitrineError::Index("Index lookup timed out".to_string()));
            }
        };

        // Drop sentinel slots and positions outside the catalog, keeping
        // rank order.
        let items: Vec<CatalogItem> = hits
            .iter()
            .filter(|hit| hit.position >= 0)
            .filter_map(|hit| self.catalog.get(hit.position))
            .cloned()
            .collect();

        let latency_ms = started.elapsed().as_millis() as u64;

        match ResultSet::new(items) {
            Ok(results) => {
                info!(count = results.len(), latency_ms, "Search completed");
                Ok(SearchOutcome::Found(results))
            }
            Err(_) => {
                debug!(latency_ms, "Search completed with no results");
                Ok(SearchOutcome::NoResults)
            }
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The catalog this pipeline resolves positions against.
    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }
}

/// Encode every catalog item and build a flat index whose row positions
/// match catalog row positions.
pub async fn build_flat_index(
    embedder: &dyn DynEmbeddingService,
    catalog: &CatalogStore,
) -> Result<FlatIndex> {
    let mut index = FlatIndex::new(embedder.dimensions());
    for item in catalog.items() {
        let text = embedding_text(item);
        let embedding = if text.is_empty() {
            // Rows must stay aligned with catalog positions, so a blank
            // item gets a zero vector that matches nothing.
            vec![0.0; embedder.dimensions()]
        } else {
            embedder.embed_boxed(&text).await?
        };
        index.push(embedding)?;
    }
    info!(rows = index.len(), "Catalog index built");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedding;
    use crate::index::IndexHit;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(title: &str) -> CatalogItem {
        CatalogItem {
            title: title.to_string(),
            category: "Toys".to_string(),
            description: "A description".to_string(),
            price: Some("1200".to_string()),
            photos: vec![],
            url: None,
        }
    }

    fn make_catalog(n: usize) -> Arc<CatalogStore> {
        let items = (0..n).map(|i| item(&format!("item-{}", i))).collect();
        Arc::new(CatalogStore::from_items(items))
    }

    fn config() -> SearchConfig {
        SearchConfig {
            top_k: 5,
            embed_timeout_ms: 1_000,
            index_timeout_ms: 1_000,
        }
    }

    async fn make_pipeline(n: usize) -> SearchPipeline {
        let catalog = make_catalog(n);
        let embedder = MockEmbedding::new();
        let index = build_flat_index(&embedder, &catalog).await.unwrap();
        SearchPipeline::new(embedder, Arc::new(index), catalog, &config())
    }

    /// Embedder that always fails, counting how often it was asked.
    struct FailingEmbedder {
        calls: Arc<AtomicUsize>,
    }

    impl EmbeddingService for FailingEmbedder {
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, VitrineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(VitrineError::Encoding("model exploded".to_string()))
        }

        fn dimensions(&self) -> usize {
            384
        }
    }

    /// Embedder that never answers within a short timeout.
    struct SlowEmbedder;

    impl EmbeddingService for SlowEmbedder {
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, VitrineError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(vec![0.0; 384])
        }

        fn dimensions(&self) -> usize {
            384
        }
    }

    /// Index returning a scripted hit list, counting lookups.
    struct ScriptedIndex {
        hits: Vec<IndexHit>,
        calls: Arc<AtomicUsize>,
    }

    impl VectorIndex for ScriptedIndex {
        fn search(
            &self,
            _query: &[f32],
            _k: usize,
        ) -> std::result::Result<Vec<IndexHit>, VitrineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }

        fn len(&self) -> usize {
            self.hits.len()
        }
    }

    /// Index that always fails, counting lookups.
    struct FailingIndex {
        calls: Arc<AtomicUsize>,
    }

    impl VectorIndex for FailingIndex {
        fn search(
            &self,
            _query: &[f32],
            _k: usize,
        ) -> std::result::Result<Vec<IndexHit>, VitrineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(VitrineError::Index("index exploded".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    fn hit(position: i64) -> IndexHit {
        IndexHit {
            position,
            distance: 0.5,
        }
    }

    #[tokio::test]
    async fn test_search_finds_matching_item_first() {
        let pipeline = make_pipeline(3).await;

        // Query with the exact indexed text of item 1 so it must rank first.
        let query = embedding_text(&item("item-1"));
        let outcome = pipeline.run(&query).await.unwrap();

        match outcome {
            SearchOutcome::Found(results) => {
                assert_eq!(results.cursor(), 0);
                assert_eq!(results.current().title, "item-1");
            }
            SearchOutcome::NoResults => panic!("Expected results"),
        }
    }

    #[tokio::test]
    async fn test_search_returns_at_most_top_k() {
        let pipeline = make_pipeline(10).await;
        let outcome = pipeline.run("anything under the sun").await.unwrap();

        match outcome {
            SearchOutcome::Found(results) => assert_eq!(results.len(), 5),
            SearchOutcome::NoResults => panic!("Expected results"),
        }
    }

    #[tokio::test]
    async fn test_empty_index_yields_no_results() {
        let catalog = make_catalog(3);
        let index = FlatIndex::new(384);
        let pipeline =
            SearchPipeline::new(MockEmbedding::new(), Arc::new(index), catalog, &config());

        let outcome = pipeline.run("puzzles").await.unwrap();
        assert_eq!(outcome, SearchOutcome::NoResults);
    }

    #[tokio::test]
    async fn test_sentinel_and_out_of_range_hits_are_dropped() {
        let catalog = make_catalog(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let index = ScriptedIndex {
            hits: vec![hit(3), hit(7), hit(-1), hit(2), hit(9)],
            calls: Arc::clone(&calls),
        };
        let pipeline =
            SearchPipeline::new(MockEmbedding::new(), Arc::new(index), catalog, &config());

        let outcome = pipeline.run("query").await.unwrap();
        match outcome {
            SearchOutcome::Found(mut results) => {
                // Rank order of the surviving hits is preserved.
                assert_eq!(results.len(), 3);
                assert_eq!(results.cursor(), 0);
                assert_eq!(results.current().title, "item-3");
                results.advance();
                assert_eq!(results.current().title, "item-7");
                results.advance();
                assert_eq!(results.current().title, "item-2");
            }
            SearchOutcome::NoResults => panic!("Expected results"),
        }
    }

    #[tokio::test]
    async fn test_all_invalid_hits_yield_no_results() {
        let catalog = make_catalog(2);
        let index = ScriptedIndex {
            hits: vec![hit(-1), hit(-1), hit(50)],
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let pipeline =
            SearchPipeline::new(MockEmbedding::new(), Arc::new(index), catalog, &config());

        let outcome = pipeline.run("query").await.unwrap();
        assert_eq!(outcome, SearchOutcome::NoResults);
    }

    #[tokio::test]
    async fn test_embedding_failure_reports_encoding_stage() {
        let embed_calls = Arc::new(AtomicUsize::new(0));
        let index_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = SearchPipeline::new(
            FailingEmbedder {
                calls: Arc::clone(&embed_calls),
            },
            Arc::new(ScriptedIndex {
                hits: vec![hit(0)],
                calls: Arc::clone(&index_calls),
            }),
            make_catalog(1),
            &config(),
        );

        let err = pipeline.run("query").await.unwrap_err();
        assert!(matches!(err, VitrineError::Encoding(_)));

        // One attempt, no retry, and the index stage never ran.
        assert_eq!(embed_calls.load(Ordering::SeqCst), 1);
        assert_eq!(index_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_failure_reports_index_stage() {
        let index_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = SearchPipeline::new(
            MockEmbedding::new(),
            Arc::new(FailingIndex {
                calls: Arc::clone(&index_calls),
            }),
            make_catalog(1),
            &config(),
        );

        let err = pipeline.run("query").await.unwrap_err();
        assert!(matches!(err, VitrineError::Index(_)));
        assert_eq!(index_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_embed_timeout_reports_encoding_stage() {
        let catalog = make_catalog(1);
        let index = FlatIndex::new(384);
        let cfg = SearchConfig {
            top_k: 5,
            embed_timeout_ms: 20,
            index_timeout_ms: 1_000,
        };
        let pipeline = SearchPipeline::new(SlowEmbedder, Arc::new(index), catalog, &cfg);

        let err = pipeline.run("query").await.unwrap_err();
        match err {
            VitrineError::Encoding(msg) => assert!(msg.contains("timed out")),
            other => panic!("Expected encoding error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_with_k_zero_yields_no_results() {
        let pipeline = make_pipeline(3).await;
        let outcome = pipeline.run_with_k("query", 0).await.unwrap();
        assert_eq!(outcome, SearchOutcome::NoResults);
    }

    #[tokio::test]
    async fn test_build_flat_index_aligns_with_catalog_positions() {
        let catalog = make_catalog(4);
        let embedder = MockEmbedding::new();
        let index = build_flat_index(&embedder, &catalog).await.unwrap();
        assert_eq!(index.len(), 4);

        let mut query = embedder.embed(&embedding_text(&item("item-2"))).await.unwrap();
        l2_normalize(&mut query);
        let hits = index.search(&query, 1).unwrap();
        assert_eq!(hits[0].position, 2);
    }

    #[tokio::test]
    async fn test_top_k_accessor() {
        let pipeline = make_pipeline(1).await;
        assert_eq!(pipeline.top_k(), 5);
    }
}
