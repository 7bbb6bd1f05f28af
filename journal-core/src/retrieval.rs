//! Reference document retrieval.
//!
//! The reference document is split into overlapping line-aware chunks, each
//! chunk is embedded once, and the resulting index is cached next to the
//! journal. Queries are embedded with the same model and ranked by cosine
//! similarity.

use async_trait::async_trait;
use ollama::Ollama;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between neighbouring chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Chunks sent to the embedder per request.
const EMBED_BATCH_SIZE: usize = 32;

/// Errors from document retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding backend error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index error: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Reference document {0} has no text to index")]
    EmptyDocument(PathBuf),
}

/// Turns texts into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;
}

#[async_trait]
impl Embedder for Ollama {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ollama::embed(self, texts)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))
    }
}

/// Returns the passages most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError>;
}

/// A retriever with nothing to search, used when no reference document is
/// available. Questions are then answered without context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocument;

#[async_trait]
impl Retriever for NoDocument {
    async fn top_k(&self, _query: &str, _k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split text into chunks of whole lines.
///
/// Each chunk grows until it reaches `chunk_size` characters. The next chunk
/// starts by repeating as many trailing lines as fit in `overlap`, but
/// always advances by at least one line.
pub fn chunk_text(text: &str, options: ChunkOptions) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < lines.len() {
        let mut end = start;
        let mut len = 0;
        while end < lines.len() && len < options.chunk_size {
            len += lines[end].len() + 1;
            end += 1;
        }

        let chunk = lines[start..end].join("\n");
        if !chunk.trim().is_empty() {
            chunks.push(chunk.trim().to_string());
        }
        if end >= lines.len() {
            break;
        }

        let mut next = end;
        let mut carried = 0;
        while next > start + 1 && carried + lines[next - 1].len() + 1 <= options.overlap {
            next -= 1;
            carried += lines[next].len() + 1;
        }
        start = next;
    }

    chunks
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// One embedded chunk of the reference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    pub vector: Vec<f32>,
}

/// On-disk form of the index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    document_len: usize,
    document_hash: String,
    chunks: Vec<IndexedChunk>,
}

/// In-memory embedding index over a reference document.
pub struct DocumentIndex {
    chunks: Vec<IndexedChunk>,
    embedder: Arc<dyn Embedder>,
}

impl DocumentIndex {
    /// Chunk and embed a document.
    pub async fn build(
        document: &str,
        embedder: Arc<dyn Embedder>,
        options: ChunkOptions,
    ) -> Result<Self, RetrievalError> {
        let texts = chunk_text(document, options);
        let mut chunks = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let vectors = embedder.embed(batch).await?;
            if vectors.len() != batch.len() {
                return Err(RetrievalError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            chunks.extend(
                batch
                    .iter()
                    .zip(vectors)
                    .map(|(text, vector)| IndexedChunk {
                        text: text.clone(),
                        vector,
                    }),
            );
        }

        Ok(Self { chunks, embedder })
    }

    /// Reuse the cached index when it was built from the same document,
    /// otherwise build a fresh one and cache it.
    pub async fn load_or_build(
        document_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        embedder: Arc<dyn Embedder>,
        options: ChunkOptions,
    ) -> Result<Self, RetrievalError> {
        let document_path = document_path.as_ref();
        let index_path = index_path.as_ref();

        let document = fs::read_to_string(document_path).await?;
        if document.trim().is_empty() {
            return Err(RetrievalError::EmptyDocument(document_path.to_path_buf()));
        }
        let document_hash = blake3::hash(document.as_bytes()).to_hex().to_string();

        match read_index_file(index_path).await {
            Ok(Some(cached))
                if cached.document_len == document.len()
                    && cached.document_hash == document_hash =>
            {
                tracing::debug!(chunks = cached.chunks.len(), path = %index_path.display(), "loaded cached document index");
                return Ok(Self {
                    chunks: cached.chunks,
                    embedder,
                });
            }
            Ok(Some(_)) => {
                tracing::info!(path = %index_path.display(), "reference document changed, rebuilding index");
            }
            Ok(None) => {
                tracing::info!(path = %index_path.display(), "creating document index with embeddings");
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %index_path.display(), "ignoring unreadable document index");
            }
        }

        let index = Self::build(&document, embedder, options).await?;
        let file = IndexFile {
            document_len: document.len(),
            document_hash,
            chunks: index.chunks.clone(),
        };
        fs::write(index_path, serde_json::to_string(&file)?).await?;
        tracing::info!(chunks = index.len(), "document index saved");

        Ok(index)
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

async fn read_index_file(path: &Path) -> Result<Option<IndexFile>, RetrievalError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Retriever for DocumentIndex {
    async fn top_k(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("no vector for query".to_string()))?;

        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|chunk| (cosine_similarity(&query_vector, &chunk.vector), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.text.clone())
            .collect())
    }
}
