//! Language model capability
//!
//! The stores never talk to a provider directly. They consume two
//! capabilities through [`LanguageModel`]:
//! - `embed`: text to a fixed-length vector
//! - `quick_complete`: short, low-latency completion used for summaries
//!   and query distillation
//!
//! [`OpenAiClient`] is the network implementation; [`OfflineModel`] is a
//! deterministic local stand-in used without an API key and in tests.

mod error;
mod offline;
mod openai;

pub use error::{LlmError, LlmResult};
pub use offline::OfflineModel;
pub use openai::{OpenAiClient, OpenAiConfig};

use async_trait::async_trait;

/// Provider-agnostic language model capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Compute the embedding vector for `text`
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>>;

    /// Compute a short completion for `user` under the `system` prompt
    async fn quick_complete(&self, system: &str, user: &str) -> LlmResult<String>;

    /// Dimensionality of the vectors returned by `embed`
    fn dimensions(&self) -> usize;

    /// Name for logging
    fn name(&self) -> &str;

    /// Identity of the vector space `embed` produces
    ///
    /// Vectors from different spaces are not comparable, so stores are
    /// partitioned by this value.
    fn embedding_space(&self) -> String {
        space_name(&[self.name(), &self.dimensions().to_string()])
    }
}

/// Join `parts` with `-`, keeping only filesystem-safe characters
pub(crate) fn space_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
pub(crate) mod testing;
