//! Retrieval collaborators and the shared retrieval cache

pub mod cache;
pub mod jsonl;

use async_trait::async_trait;
use symloc_common::models::RetrievedSnippet;
use thiserror::Error;

pub use cache::RetrievalCache;
pub use jsonl::JsonlRetriever;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Retriever unavailable: {0}")]
    Unavailable(String),
}

/// Retrieval capability: ordered snippets for a symptom query
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedSnippet>, RetrievalError>;
}
