//! Text-to-results over a single collection

use std::time::Duration;

use tracing::debug;

use super::error::{SearchError, SearchOutcome};
use super::result::SearchResult;
use crate::llm::LanguageModel;
use crate::vector::Collection;

/// System prompt used to turn chat input into a retrieval query
pub const DISTILL_PROMPT: &str =
    "Take the user input and respond ONLY with a very short query string to use RAG to identify matching entries.";

/// Embed `text` and return the `k` closest documents of `collection`
///
/// `k` is capped at the collection size; an empty collection returns no
/// results without calling the model.
pub async fn embed_and_query(
    llm: &dyn LanguageModel,
    collection: &Collection,
    text: &str,
    k: usize,
    timeout: Option<Duration>,
) -> SearchOutcome<Vec<SearchResult>> {
    let search = async {
        let k = k.min(collection.count().await);
        if k == 0 {
            debug!("Nothing to search in '{}'", collection.name());
            return Ok(Vec::new());
        }

        let embedding = llm
            .embed(text)
            .await
            .map_err(|source| SearchError::EmbeddingUnavailable { source })?;

        let results: Vec<SearchResult> = collection
            .query(&embedding, k)
            .await?
            .into_iter()
            .map(SearchResult::from)
            .collect();

        debug!(
            "Search of '{}' returned {} results (k: {})",
            collection.name(),
            results.len(),
            k
        );
        Ok::<_, SearchError>(results)
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, search)
            .await
            .map_err(|_| SearchError::Timeout {
                timeout_ms: limit.as_millis() as u64,
            })?,
        None => search.await,
    }
}

/// Ask the model for a short retrieval query; falls back to `input`
pub async fn distill_query(llm: &dyn LanguageModel, input: &str) -> String {
    match llm.quick_complete(DISTILL_PROMPT, input).await {
        Ok(query) if !query.trim().is_empty() => query.trim().to_string(),
        Ok(_) => input.to_string(),
        Err(e) => {
            debug!("Query distillation failed, using raw input: {}", e);
            input.to_string()
        }
    }
}
