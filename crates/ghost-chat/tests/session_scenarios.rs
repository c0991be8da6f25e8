//! End-to-end turn handling against an in-memory index.
//!
//! Every scenario runs through encode -> KNN -> energy filter -> selection
//! -> generation with fixed, hand-placed vectors so distances are exact.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::Value;

use ghost_chat::{Generator, GhostSession, Selection, TurnOutcome};
use ghost_core::config::RetrievalConfig;
use ghost_core::error::GhostError;
use ghost_core::types::{Candidate, TextBlock};
use ghost_vector::embedding::EmbeddingService;
use ghost_vector::{parse_search_response, KnnSearch, MemoryIndex, ResponseFields};

// =============================================================================
// Helpers
// =============================================================================

/// Encoder backed by a lookup table of unit vectors in 3 dimensions.
struct TableEmbedding {
    table: HashMap<&'static str, [f32; 3]>,
}

impl TableEmbedding {
    fn new(entries: &[(&'static str, [f32; 3])]) -> Self {
        Self {
            table: entries.iter().copied().collect(),
        }
    }
}

impl EmbeddingService for TableEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GhostError> {
        self.table
            .get(text)
            .map(|v| v.to_vec())
            .ok_or_else(|| GhostError::Embedding(format!("no vector for {:?}", text)))
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// Generator that records how often it was called.
#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, anchor: &str, _query: &str) -> Result<String, GhostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(anchor.to_lowercase())
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _anchor: &str, _query: &str) -> Result<String, GhostError> {
        Err(GhostError::Generation("timed out after 60s".to_string()))
    }
}

/// Index that fails its first lookup with a transport error, then delegates.
struct FlakyIndex {
    inner: MemoryIndex,
    failures_left: AtomicUsize,
}

#[async_trait]
impl KnnSearch for FlakyIndex {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, GhostError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GhostError::Transport("connection reset by peer".to_string()));
        }
        self.inner.knn(vector, k).await
    }

    fn dimensions(&self) -> usize {
        KnnSearch::dimensions(&self.inner)
    }
}

/// Index that answers every lookup by decoding a canned search reply.
struct CannedReplyIndex {
    reply: Value,
}

#[async_trait]
impl KnnSearch for CannedReplyIndex {
    async fn knn(&self, _vector: &[f32], _k: usize) -> Result<Vec<Candidate>, GhostError> {
        parse_search_response(&self.reply, &ResponseFields::new("text", "vector_score"))
    }

    fn dimensions(&self) -> usize {
        3
    }
}

const LEAVING: [f32; 3] = [1.0, 0.0, 0.0];
const TOMORROW: [f32; 3] = [0.0, 1.0, 0.0];

fn corpus() -> MemoryIndex {
    MemoryIndex::from_blocks(vec![
        TextBlock {
            id: 0,
            text: "I'm leaving now".to_string(),
            vector: LEAVING.to_vec(),
        },
        TextBlock {
            id: 1,
            text: "See you tomorrow".to_string(),
            vector: TOMORROW.to_vec(),
        },
    ])
    .unwrap()
}

fn encoder() -> Arc<TableEmbedding> {
    Arc::new(TableEmbedding::new(&[
        ("I'm leaving now", LEAVING),
        ("are you heading out", [0.95, 0.3122499, 0.0]),
        ("what is the weather", [0.0, 0.0, 1.0]),
        ("hi", [0.0, 0.0, 1.0]),
    ]))
}

fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_exact_memory_yields_single_anchor_reply() {
    let generator = Arc::new(CountingGenerator::default());
    let session = GhostSession::new(
        encoder(),
        Arc::new(corpus()),
        generator.clone(),
        RetrievalConfig::default(),
    )
    .unwrap();

    let selection = session.retrieve("I'm leaving now").await.unwrap();
    match selection {
        Selection::Matched(result) => {
            assert_eq!(result.texts(), vec!["I'm leaving now"]);
            assert!(result.best_distance().unwrap() < 1e-6);
        }
        other => panic!("expected a match, got {:?}", other),
    }

    let outcome = session.handle_turn("I'm leaving now").await;
    assert_eq!(outcome.anchor(), Some("I'm leaving now"));
    assert_eq!(outcome.to_string(), "Ghost: i'm leaving now");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nearby_query_picks_closest_memory() {
    let session = GhostSession::new(
        encoder(),
        Arc::new(corpus()),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    // cos = 0.95 against LEAVING, ~0.31 against TOMORROW.
    let outcome = session.handle_turn("are you heading out").await;
    assert_eq!(outcome.anchor(), Some("I'm leaving now"));
}

#[tokio::test]
async fn test_unrelated_query_never_reaches_generator() {
    let generator = Arc::new(CountingGenerator::default());
    let session = GhostSession::new(
        encoder(),
        Arc::new(corpus()),
        generator.clone(),
        RetrievalConfig::default(),
    )
    .unwrap();

    // Orthogonal to every memory: distance 1.0 > 0.8.
    let outcome = session.handle_turn("what is the weather").await;
    match outcome {
        TurnOutcome::NoRelevantMemories { best_distance } => {
            assert!((best_distance - 1.0).abs() < 1e-6);
        }
        other => panic!("expected no relevant memories, got {:?}", other),
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_index_reports_no_memories() {
    let generator = Arc::new(CountingGenerator::default());
    let session = GhostSession::new(
        encoder(),
        Arc::new(MemoryIndex::new(3)),
        generator.clone(),
        RetrievalConfig::default(),
    )
    .unwrap();

    assert_eq!(session.handle_turn("hi").await, TurnOutcome::NoMemoriesFound);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transport_failure_does_not_end_the_session() {
    let index = FlakyIndex {
        inner: corpus(),
        failures_left: AtomicUsize::new(1),
    };
    let session = GhostSession::new(
        encoder(),
        Arc::new(index),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    let first = session.handle_turn("I'm leaving now").await;
    match &first {
        TurnOutcome::RetrievalFailed { reason } => assert!(reason.contains("connection reset")),
        other => panic!("expected retrieval failure, got {:?}", other),
    }

    let second = session.handle_turn("I'm leaving now").await;
    assert_eq!(second.anchor(), Some("I'm leaving now"));
}

#[tokio::test]
async fn test_generation_failure_keeps_anchor() {
    let session = GhostSession::new(
        encoder(),
        Arc::new(corpus()),
        Arc::new(FailingGenerator),
        RetrievalConfig::default(),
    )
    .unwrap();

    let outcome = session.handle_turn("I'm leaving now").await;
    assert_eq!(outcome.anchor(), Some("I'm leaving now"));
    assert_eq!(outcome.to_string(), "Ghost: [LLM Error: timed out after 60s]");
}

#[tokio::test]
async fn test_unknown_query_fails_only_that_turn() {
    let session = GhostSession::new(
        encoder(),
        Arc::new(corpus()),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    assert!(matches!(
        session.handle_turn("not in the table").await,
        TurnOutcome::RetrievalFailed { .. }
    ));
    assert!(session.handle_turn("I'm leaving now").await.is_match());
}

#[tokio::test]
async fn test_unscored_entry_counts_as_distance_one() {
    let reply = Value::Array(vec![
        Value::Int(1),
        bulk("block:0"),
        Value::Array(vec![bulk("text"), bulk("I'm leaving now")]),
    ]);
    let generator = Arc::new(CountingGenerator::default());
    let session = GhostSession::new(
        encoder(),
        Arc::new(CannedReplyIndex { reply }),
        generator.clone(),
        RetrievalConfig::default(),
    )
    .unwrap();

    assert_eq!(
        session.handle_turn("hi").await,
        TurnOutcome::NoRelevantMemories { best_distance: 1.0 }
    );
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_reply_is_treated_as_empty() {
    // Odd number of elements after the count.
    let reply = Value::Array(vec![Value::Int(1), bulk("block:0")]);
    let session = GhostSession::new(
        encoder(),
        Arc::new(CannedReplyIndex { reply }),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    assert_eq!(session.handle_turn("hi").await, TurnOutcome::NoMemoriesFound);
}

#[tokio::test]
async fn test_unscored_entry_does_not_mask_a_close_one() {
    let reply = Value::Array(vec![
        Value::Int(2),
        bulk("block:7"),
        Value::Array(vec![bulk("text"), bulk("See you tomorrow")]),
        bulk("block:0"),
        Value::Array(vec![
            bulk("vector_score"),
            bulk("0.3"),
            bulk("text"),
            bulk("I'm leaving now"),
        ]),
    ]);
    let session = GhostSession::new(
        encoder(),
        Arc::new(CannedReplyIndex { reply }),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    match session.retrieve("hi").await.unwrap() {
        Selection::Matched(result) => {
            assert_eq!(result.texts(), vec!["I'm leaving now"]);
            assert_eq!(result.best_distance(), Some(0.3));
        }
        other => panic!("expected a match, got {:?}", other),
    }
    assert_eq!(
        session.handle_turn("hi").await.anchor(),
        Some("I'm leaving now")
    );
}

#[tokio::test]
async fn test_energy_filter_picks_calmer_anchor() {
    // The shouted memory is closer, but its energy (35) is far from the
    // query's (4); the calm one (3) survives the filter and anchors the reply.
    let reply = Value::Array(vec![
        Value::Int(2),
        bulk("block:0"),
        Value::Array(vec![
            bulk("text"),
            bulk("WHY ARE YOU LEAVING SO EARLY!!!"),
            bulk("vector_score"),
            bulk("0.1"),
        ]),
        bulk("block:1"),
        Value::Array(vec![
            bulk("text"),
            bulk("ok leaving now"),
            bulk("vector_score"),
            bulk("0.3"),
        ]),
    ]);
    let session = GhostSession::new(
        encoder(),
        Arc::new(CannedReplyIndex { reply }),
        Arc::new(CountingGenerator::default()),
        RetrievalConfig::default(),
    )
    .unwrap();

    let outcome = session.handle_turn("are you heading out").await;
    assert_eq!(outcome.anchor(), Some("ok leaving now"));
    assert_eq!(outcome.to_string(), "Ghost: ok leaving now");
}

#[tokio::test]
async fn test_zero_margin_reports_no_memories() {
    let generator = Arc::new(CountingGenerator::default());
    let config = RetrievalConfig {
        margin: 0.0,
        ..RetrievalConfig::default()
    };
    let session =
        GhostSession::new(encoder(), Arc::new(corpus()), generator.clone(), config).unwrap();

    let outcome = session.handle_turn("I'm leaving now").await;
    assert_eq!(outcome, TurnOutcome::NoMemoriesFound);
    assert_eq!(outcome.to_string(), "Ghost: ... (No memories found)");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}
