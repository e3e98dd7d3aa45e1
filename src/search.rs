//! `ragdesk search`: raw similarity search against the index.
//!
//! Useful for checking that ingestion actually landed before starting a chat
//! session. No generation model is involved.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::models::RetrievedPassage;
use crate::vector_store::{PineconeStore, VectorStore};

const EXCERPT_CHARS: usize = 240;

pub async fn search_passages(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    query: &str,
    limit: usize,
) -> Result<Vec<RetrievedPassage>> {
    let vector = embed_query(embedder, query).await?;
    store.query(&vector, limit.max(1)).await
}

pub fn format_results(results: &[RetrievedPassage]) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let score = result
            .score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{}. [{}] {} (page {})\n",
            i + 1,
            score,
            result.source.as_deref().unwrap_or("Unknown"),
            result.page
        ));
        let excerpt: String = result.content.chars().take(EXCERPT_CHARS).collect();
        out.push_str(&format!(
            "    excerpt: \"{}\"\n\n",
            excerpt.replace('\n', " ").trim()
        ));
    }
    out
}

pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    config.require_retrieval()?;

    let embedder = create_embedder(&config.embedding, config.secrets.openai_api_key.as_deref())?;
    let store = PineconeStore::new(
        config.require_index_name()?,
        config.require_pinecone_key()?,
        config.vector_store.timeout_secs,
    )?;

    let limit = limit.unwrap_or(config.retrieval.top_k);
    let results = search_passages(embedder.as_ref(), &store, query, limit).await?;
    print!("{}", format_results(&results));
    Ok(())
}
