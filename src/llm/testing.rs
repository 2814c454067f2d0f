//! Language model doubles shared by unit tests across modules

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LanguageModel, LlmError, LlmResult, OfflineModel};

/// Fails every call with a network error
#[derive(Debug, Default)]
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn embed(&self, _text: &str) -> LlmResult<Vec<f32>> {
        Err(LlmError::Network {
            reason: "provider unreachable".to_string(),
        })
    }

    async fn quick_complete(&self, _system: &str, _user: &str) -> LlmResult<String> {
        Err(LlmError::Network {
            reason: "provider unreachable".to_string(),
        })
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Offline model that counts embedding and completion calls
#[derive(Debug, Default)]
pub struct CountingModel {
    inner: OfflineModel,
    pub embeds: AtomicUsize,
    pub completions: AtomicUsize,
}

impl CountingModel {
    pub fn embed_calls(&self) -> usize {
        self.embeds.load(Ordering::SeqCst)
    }

    pub fn completion_calls(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        self.embeds.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    async fn quick_complete(&self, system: &str, user: &str) -> LlmResult<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.inner.quick_complete(system, user).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Embeds only texts that do not contain `poison`
#[derive(Debug)]
pub struct PoisonedModel {
    inner: OfflineModel,
    poison: String,
}

impl PoisonedModel {
    pub fn new(poison: &str) -> Self {
        Self {
            inner: OfflineModel::default(),
            poison: poison.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for PoisonedModel {
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        if text.contains(&self.poison) {
            return Err(LlmError::Api {
                reason: "input rejected".to_string(),
            });
        }
        self.inner.embed(text).await
    }

    async fn quick_complete(&self, system: &str, user: &str) -> LlmResult<String> {
        self.inner.quick_complete(system, user).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> &str {
        "poisoned"
    }
}
