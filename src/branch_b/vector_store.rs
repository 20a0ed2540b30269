//! Vector store adapter (component 9 in spec §2): a single HTTP round
//! trip runs two HNSW top-K cosine-similarity searches — one against
//! `attack_patterns`, one against `safe_patterns` — unioned server-side
//! via `UNION ALL` (spec §4.3, §6).

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::config::VectorStoreConfig;
use crate::error::VectorStoreError;
use crate::types::SemanticMatch;

/// Both sides of a dual-index query. Either side can independently fail;
/// the caller decides whether to degrade the branch or fall back to
/// single-side scoring (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct DualSearchResult {
    pub attack_matches: Vec<SemanticMatch>,
    pub safe_matches: Vec<SemanticMatch>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Run the dual top-K query. `top_k` applies to each side
    /// independently (spec: K=5 per side).
    async fn query_dual(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<DualSearchResult, VectorStoreError>;

    /// Health probe used by `/healthz`.
    async fn ping(&self) -> bool;
}

/// HTTP client issuing a single `UNION ALL` SQL-shaped POST against the
/// analytical engine's query endpoint (spec §6).
pub struct HttpVectorStore {
    client: reqwest::Client,
    config: VectorStoreConfig,
}

impl HttpVectorStore {
    pub fn new(config: VectorStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Attaches `VectorStoreConfig.user`/`.password` as HTTP basic auth when
    /// a user is configured; unauthenticated local deployments leave both
    /// unset and get a plain request.
    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.user {
            Some(user) => builder.basic_auth(user, self.config.password.as_ref().map(|p| p.expose_secret())),
            None => builder,
        }
    }

    fn union_all_query(&self, top_k: usize) -> String {
        format!(
            "SELECT 'ATTACK' AS table_type, pattern_id, category, subcategory, pattern_text, \
             1 - cosine_distance(embedding, $QUERY_VEC) AS similarity FROM {attack} \
             ORDER BY similarity DESC LIMIT {k} \
             UNION ALL \
             SELECT 'SAFE' AS table_type, pattern_id, category, subcategory, pattern_text, \
             1 - cosine_distance(embedding, $QUERY_VEC) AS similarity FROM {safe} \
             ORDER BY similarity DESC LIMIT {k}",
            attack = self.config.attack_table,
            safe = self.config.safe_table,
            k = top_k,
        )
    }
}

#[derive(serde::Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    query_vec: &'a [f32],
}

#[derive(serde::Deserialize)]
struct QueryRow {
    table_type: String,
    pattern_id: String,
    category: String,
    subcategory: String,
    similarity: f64,
}

#[derive(serde::Deserialize)]
struct QueryResponse {
    rows: Vec<QueryRow>,
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn query_dual(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<DualSearchResult, VectorStoreError> {
        let sql = self.union_all_query(top_k);
        let request = self
            .client
            .post(&self.config.endpoint)
            .timeout(std::time::Duration::from_millis(self.config.timeout_ms))
            .json(&QueryRequest {
                sql: &sql,
                query_vec: embedding,
            });
        let resp = self
            .authed(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VectorStoreError::Timeout(std::time::Duration::from_millis(self.config.timeout_ms))
                } else {
                    VectorStoreError::Http(e.to_string())
                }
            })?;

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

        let mut result = DualSearchResult::default();
        for row in body.rows {
            let m = SemanticMatch {
                pattern_id: row.pattern_id,
                category: row.category,
                subcategory: row.subcategory,
                similarity: row.similarity,
            };
            match row.table_type.as_str() {
                "ATTACK" => result.attack_matches.push(m),
                "SAFE" => result.safe_matches.push(m),
                other => {
                    return Err(VectorStoreError::InvalidResponse(format!(
                        "unknown table_type: {other}"
                    )))
                }
            }
        }
        result
            .attack_matches
            .sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        result
            .safe_matches
            .sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());

        Ok(result)
    }

    async fn ping(&self) -> bool {
        let request = self
            .client
            .get(&self.config.endpoint)
            .timeout(std::time::Duration::from_millis(self.config.timeout_ms));
        self.authed(request)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// In-memory corpus used by tests and the `MockVectorStore`: a flat list
/// of pattern records with pre-computed embeddings, searched by brute
/// force cosine similarity (standing in for the real HNSW index, which at
/// the corpus sizes involved in tests is equivalent to an exact search).
#[derive(Debug, Clone)]
pub struct PatternRecord {
    pub pattern_id: String,
    pub category: String,
    pub subcategory: String,
    pub embedding: Vec<f32>,
}

pub struct MockVectorStore {
    pub attack_corpus: Vec<PatternRecord>,
    pub safe_corpus: Vec<PatternRecord>,
    /// When set, `query_dual` returns this error instead of searching
    /// (simulates `DependencyDown`).
    pub fail_attack: bool,
    pub fail_safe: bool,
}

impl MockVectorStore {
    pub fn new(attack_corpus: Vec<PatternRecord>, safe_corpus: Vec<PatternRecord>) -> Self {
        Self {
            attack_corpus,
            safe_corpus,
            fail_attack: false,
            fail_safe: false,
        }
    }

    fn search(corpus: &[PatternRecord], embedding: &[f32], top_k: usize) -> Vec<SemanticMatch> {
        let mut scored: Vec<SemanticMatch> = corpus
            .iter()
            .map(|p| SemanticMatch {
                pattern_id: p.pattern_id.clone(),
                category: p.category.clone(),
                subcategory: p.subcategory.clone(),
                similarity: cosine_similarity(&p.embedding, embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn query_dual(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<DualSearchResult, VectorStoreError> {
        if self.fail_attack {
            return Err(VectorStoreError::Http("mock attack-side failure".into()));
        }
        let attack_matches = Self::search(&self.attack_corpus, embedding, top_k);
        let safe_matches = if self.fail_safe {
            Vec::new()
        } else {
            Self::search(&self.safe_corpus, embedding, top_k)
        };
        Ok(DualSearchResult {
            attack_matches,
            safe_matches,
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}
