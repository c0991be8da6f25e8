//! RediSearch-backed vector index.
//!
//! The index stores one hash per text block (`<prefix><id>`) holding the text
//! and the raw little-endian f32 vector, and answers KNN queries through
//! `FT.SEARCH`. Command construction is kept in free functions so it can be
//! checked without a server.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, Value};
use tracing::{debug, info, warn};

use ghost_core::config::IndexConfig;
use ghost_core::error::GhostError;
use ghost_core::types::{Candidate, DistanceMetric, TextBlock};

use crate::parser::{as_text, parse_search_response, value_kind, ResponseFields};

/// Nearest-neighbour lookup used by the retrieval pipeline.
#[async_trait]
pub trait KnnSearch: Send + Sync {
    /// Return up to `k` candidates closest to `vector`, in no guaranteed order.
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, GhostError>;

    /// Dimension of the indexed vectors.
    fn dimensions(&self) -> usize;
}

/// Vector attribute as reported by `FT.INFO`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorAttribute {
    pub field: String,
    pub dimensions: usize,
    pub metric: DistanceMetric,
}

/// The parts of an index schema the pipeline depends on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSchema {
    pub num_docs: Option<u64>,
    pub vector: Option<VectorAttribute>,
}

/// Encode a vector as raw little-endian f32 bytes (`D * 4` bytes).
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Build the hybrid KNN query: match-all pre-filter, rank by vector distance.
pub fn knn_command(config: &IndexConfig, vector: &[f32], k: usize) -> Cmd {
    let query = format!(
        "*=>[KNN {} @{} $vec AS {}]",
        k, config.vector_field, config.score_alias
    );
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(&config.index_name)
        .arg(query)
        .arg("PARAMS")
        .arg(2)
        .arg("vec")
        .arg(encode_vector(vector))
        .arg("RETURN")
        .arg(2)
        .arg(&config.text_field)
        .arg(&config.score_alias)
        // The default page is 10 results; ask for all k.
        .arg("LIMIT")
        .arg(0)
        .arg(k)
        .arg("DIALECT")
        .arg(config.dialect);
    cmd
}

/// Build the `FT.CREATE` command for a flat vector index over hashes.
pub fn create_index_command(config: &IndexConfig, dimensions: usize) -> Cmd {
    let mut cmd = redis::cmd("FT.CREATE");
    cmd.arg(&config.index_name)
        .arg("ON")
        .arg("HASH")
        .arg("PREFIX")
        .arg(1)
        .arg(&config.key_prefix)
        .arg("SCHEMA")
        .arg(&config.text_field)
        .arg("TEXT")
        .arg(&config.vector_field)
        .arg("VECTOR")
        .arg("FLAT")
        .arg(6)
        .arg("TYPE")
        .arg("FLOAT32")
        .arg("DIM")
        .arg(dimensions)
        .arg("DISTANCE_METRIC")
        .arg(config.distance_metric.as_redis_str());
    cmd
}

/// Build the `HSET` storing one block.
pub fn hset_command(config: &IndexConfig, block: &TextBlock) -> Cmd {
    let mut cmd = redis::cmd("HSET");
    cmd.arg(format!("{}{}", config.key_prefix, block.id))
        .arg(&config.text_field)
        .arg(&block.text)
        .arg(&config.vector_field)
        .arg(encode_vector(&block.vector));
    cmd
}

/// Extract the vector attribute and document count from an `FT.INFO` reply.
pub fn parse_index_info(reply: &Value, vector_field: &str) -> Result<IndexSchema, GhostError> {
    let items = match reply {
        Value::Array(items) => items,
        other => {
            return Err(GhostError::Parse(format!(
                "FT.INFO returned {}",
                value_kind(other)
            )))
        }
    };

    let mut schema = IndexSchema::default();
    for pair in items.chunks_exact(2) {
        let Some(name) = as_text(&pair[0]) else {
            continue;
        };
        match name.as_str() {
            "num_docs" => {
                schema.num_docs = match &pair[1] {
                    Value::Int(n) => u64::try_from(*n).ok(),
                    other => as_text(other).and_then(|s| s.parse::<f64>().ok()).map(|n| n as u64),
                };
            }
            "attributes" => {
                if let Value::Array(attributes) = &pair[1] {
                    schema.vector = attributes
                        .iter()
                        .find_map(|attr| parse_vector_attribute(attr, vector_field).transpose())
                        .transpose()?;
                }
            }
            _ => {}
        }
    }
    Ok(schema)
}

fn parse_vector_attribute(
    attr: &Value,
    vector_field: &str,
) -> Result<Option<VectorAttribute>, GhostError> {
    let Value::Array(values) = attr else {
        return Ok(None);
    };

    let mut identifier = None;
    let mut attribute = None;
    let mut is_vector = false;
    let mut dimensions = None;
    let mut metric = None;
    for pair in values.chunks_exact(2) {
        let Some(key) = as_text(&pair[0]) else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "identifier" => identifier = as_text(&pair[1]),
            "attribute" => attribute = as_text(&pair[1]),
            "type" => is_vector = as_text(&pair[1]).is_some_and(|t| t.eq_ignore_ascii_case("VECTOR")),
            "dim" => {
                dimensions = match &pair[1] {
                    Value::Int(n) => usize::try_from(*n).ok(),
                    other => as_text(other).and_then(|s| s.parse().ok()),
                }
            }
            "distance_metric" => {
                metric = as_text(&pair[1]).map(|m| m.parse::<DistanceMetric>()).transpose()?
            }
            _ => {}
        }
    }

    let named = attribute.as_deref() == Some(vector_field) || identifier.as_deref() == Some(vector_field);
    if !is_vector || !named {
        return Ok(None);
    }
    match (dimensions, metric) {
        (Some(dimensions), Some(metric)) => Ok(Some(VectorAttribute {
            field: vector_field.to_string(),
            dimensions,
            metric,
        })),
        _ => Err(GhostError::Parse(format!(
            "vector attribute {} is missing dim or distance_metric",
            vector_field
        ))),
    }
}

/// Check a reported schema against what the pipeline expects.
///
/// Returns the index dimension: the reported one, or `fallback_dims` when the
/// server does not expose the vector attribute.
pub fn check_schema(
    schema: &IndexSchema,
    expected_metric: DistanceMetric,
    fallback_dims: usize,
) -> Result<usize, GhostError> {
    match &schema.vector {
        Some(attr) => {
            if attr.metric != expected_metric {
                return Err(GhostError::Config(format!(
                    "index metric is {} but thresholds are calibrated for {}",
                    attr.metric, expected_metric
                )));
            }
            Ok(attr.dimensions)
        }
        None => {
            warn!(
                fallback_dims,
                "Index schema does not expose the vector attribute; assuming configured dimension"
            );
            Ok(fallback_dims)
        }
    }
}

fn is_unknown_index(err: &redis::RedisError) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("unknown index") || msg.contains("no such index")
}

/// Vector index client over a single multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisVectorIndex {
    conn: MultiplexedConnection,
    config: IndexConfig,
    fields: ResponseFields,
    dimensions: usize,
}

impl std::fmt::Debug for RedisVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisVectorIndex")
            .field("index", &self.config.index_name)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl RedisVectorIndex {
    /// Open the connection. Failure here is a startup configuration error.
    ///
    /// `dimensions` is the configured dimension until `verify_schema` or
    /// `ensure_index` replaces it with the one the server reports.
    pub async fn connect(config: IndexConfig, dimensions: usize) -> Result<Self, GhostError> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| GhostError::Config(format!("invalid redis url {}: {}", config.redis_url, e)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| GhostError::Config(format!("redis unavailable at {}: {}", config.redis_url, e)))?;

        info!(url = %config.redis_url, index = %config.index_name, "Connected to vector index");

        let fields = ResponseFields::new(config.text_field.clone(), config.score_alias.clone());
        Ok(Self {
            conn,
            config,
            fields,
            dimensions,
        })
    }

    /// Distance assigned to hits that come back without a score.
    pub fn with_missing_distance(mut self, distance: f64) -> Self {
        self.fields = self.fields.with_missing_distance(distance);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Read the index schema with `FT.INFO`.
    pub async fn describe(&self) -> Result<IndexSchema, GhostError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("FT.INFO")
            .arg(&self.config.index_name)
            .query_async(&mut conn)
            .await
            .map_err(|e| GhostError::Transport(e.to_string()))?;
        parse_index_info(&reply, &self.config.vector_field)
    }

    /// Confirm the index exists and uses the configured metric; adopt its dimension.
    ///
    /// Any failure is a configuration error, since it happens before the loop.
    pub async fn verify_schema(&mut self) -> Result<IndexSchema, GhostError> {
        let schema = self.describe().await.map_err(|e| {
            GhostError::Config(format!(
                "cannot inspect index {}: {}",
                self.config.index_name, e
            ))
        })?;
        self.dimensions = check_schema(&schema, self.config.distance_metric, self.dimensions)?;
        info!(
            index = %self.config.index_name,
            dimensions = self.dimensions,
            metric = %self.config.distance_metric,
            num_docs = ?schema.num_docs,
            "Index schema verified"
        );
        Ok(schema)
    }

    /// Create the index if it does not exist, otherwise verify it.
    ///
    /// Returns `true` when the index was created.
    pub async fn ensure_index(&mut self) -> Result<bool, GhostError> {
        let mut conn = self.conn.clone();
        let info: redis::RedisResult<Value> = redis::cmd("FT.INFO")
            .arg(&self.config.index_name)
            .query_async(&mut conn)
            .await;

        match info {
            Ok(reply) => {
                let schema = parse_index_info(&reply, &self.config.vector_field)?;
                self.dimensions = check_schema(&schema, self.config.distance_metric, self.dimensions)?;
                debug!(index = %self.config.index_name, "Reusing existing index");
                Ok(false)
            }
            Err(e) if is_unknown_index(&e) => {
                let _: Value = create_index_command(&self.config, self.dimensions)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| GhostError::Transport(format!("FT.CREATE failed: {}", e)))?;
                info!(
                    index = %self.config.index_name,
                    dimensions = self.dimensions,
                    metric = %self.config.distance_metric,
                    "Created vector index"
                );
                Ok(true)
            }
            Err(e) => Err(GhostError::Transport(e.to_string())),
        }
    }

    /// Store blocks as hashes in a single pipeline. Returns the number written.
    pub async fn load_blocks(&self, blocks: &[TextBlock]) -> Result<usize, GhostError> {
        if let Some(bad) = blocks.iter().find(|b| b.dimensions() != self.dimensions) {
            return Err(GhostError::Config(format!(
                "block {} has dimension {}, index expects {}",
                bad.id,
                bad.dimensions(),
                self.dimensions
            )));
        }

        let mut pipe = redis::pipe();
        for block in blocks {
            pipe.add_command(hset_command(&self.config, block)).ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| GhostError::Transport(e.to_string()))?;

        info!(count = blocks.len(), index = %self.config.index_name, "Loaded blocks");
        Ok(blocks.len())
    }
}

#[async_trait]
impl KnnSearch for RedisVectorIndex {
    async fn knn(&self, vector: &[f32], k: usize) -> Result<Vec<Candidate>, GhostError> {
        if vector.len() != self.dimensions {
            return Err(GhostError::Config(format!(
                "vector has dimension {}, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let mut conn = self.conn.clone();
        let reply: Value = knn_command(&self.config, vector, k)
            .query_async(&mut conn)
            .await
            .map_err(|e| GhostError::Transport(e.to_string()))?;

        parse_search_response(&reply, &self.fields)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
