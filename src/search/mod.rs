//! Retrieval module
//!
//! Text in, ranked results out. Hides embedding generation from callers and
//! renders results for prompt injection.

mod error;
mod gateway;
mod query;
mod result;

#[cfg(test)]
mod tests;

pub use error::{SearchError, SearchOutcome};
pub use gateway::{RetrievalGateway, RetrievedContext, SearchConfig};
pub use query::{distill_query, embed_and_query, DISTILL_PROMPT};
pub use result::SearchResult;
