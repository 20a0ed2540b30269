//! Embedding provider for Branch B's semantic search: a multilingual E5
//! encoder producing an L2-normalized 384-dim vector (spec §4.3).
//!
//! Queries are prefixed with `query: `, corpus entries with `passage: `
//! per the E5 protocol; inputs longer than `max_tokens` are truncated
//! from the right.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::EmbeddingsConfig;
use crate::error::SemanticError;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimension(&self) -> usize;

    /// Embed a user-supplied query, applying the `query: ` prefix.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SemanticError>;
}

/// HTTP client for a locally hosted E5 embedding server.
pub struct HttpEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    dimension: usize,
    max_tokens: usize,
    api_key: Option<SecretString>,
}

impl HttpEmbeddings {
    pub fn new(config: &EmbeddingsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            dimension: config.dimension,
            max_tokens: config.max_tokens,
            api_key: config.api_key.clone(),
        }
    }

    /// Truncate to the token budget. We approximate tokens with whitespace
    /// splitting, which is conservative (real BPE tokens are usually
    /// shorter than words) and matches "truncated from the right".
    fn truncate_to_budget(&self, text: &str) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= self.max_tokens {
            text.to_string()
        } else {
            words[..self.max_tokens].join(" ")
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let truncated = self.truncate_to_budget(text);
        let prefixed = format!("query: {truncated}");

        let mut request = self.client.post(&self.endpoint).json(&EmbedRequest { input: &prefixed });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let resp = request
            .send()
            .await
            .map_err(|e| SemanticError::Embedding(e.to_string()))?;

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| SemanticError::Embedding(format!("invalid response: {e}")))?;

        if body.embedding.len() != self.dimension {
            return Err(SemanticError::Embedding(format!(
                "expected {} dims, got {}",
                self.dimension,
                body.embedding.len()
            )));
        }

        Ok(l2_normalize(body.embedding))
    }
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Deterministic mock embedding provider for tests: hashes the query text
/// (post `query: ` prefix so the prefix still affects the vector the same
/// way it would with a real encoder) into an L2-normalized vector.
pub struct MockEmbeddings {
    dimension: usize,
}

impl MockEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        use std::hash::{Hash, Hasher};
        let prefixed = format!("query: {text}");
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        prefixed.hash(&mut hasher);
        let hash = hasher.finish();

        let mut v = Vec::with_capacity(self.dimension);
        let mut seed = hash;
        for _ in 0..self.dimension {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            v.push((seed as f32 / u64::MAX as f32) * 2.0 - 1.0);
        }
        Ok(l2_normalize(v))
    }
}
