use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::base::{Completion, PromptContext, Provider, Usage};

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    completion: Completion,
    usage: Usage,
}

/// Replays completions for prompts that were already answered under the same seed.
///
/// Entries live as one JSON file per key under `dir`, so identical runs are reproducible
/// across processes.
pub struct CachedProvider {
    inner: Arc<dyn Provider>,
    seed: u64,
    dir: PathBuf,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn Provider>, seed: u64, dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            seed,
            dir: dir.into(),
        }
    }

    /// The default cache location, `<user cache dir>/tripcrew/<seed>`
    pub fn default_dir(seed: u64) -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("tripcrew").join(seed.to_string()))
    }

    pub fn cache_key(&self, context: &PromptContext) -> Result<String> {
        let material = json!({
            "seed": self.seed,
            "model": self.inner.model(),
            "context": context,
        });
        let digest = Sha256::digest(serde_json::to_vec(&material)?);
        Ok(hex::encode(digest))
    }

    async fn load(&self, key: &str) -> Option<CacheEntry> {
        let path = self.dir.join(format!("{}.json", key));
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn store(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", key));
        tokio::fs::write(path, serde_json::to_vec_pretty(entry)?).await?;
        Ok(())
    }
}

#[async_trait]
impl Provider for CachedProvider {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)> {
        // Timestamps would make every key unique
        let mut keyed = context.clone();
        for message in &mut keyed.messages {
            message.created = 0;
        }
        let key = self.cache_key(&keyed)?;

        if let Some(entry) = self.load(&key).await {
            debug!(agent = %context.agent, key = %key, "replaying cached completion");
            return Ok((entry.completion, entry.usage));
        }

        let (completion, usage) = self.inner.complete(context).await?;
        let entry = CacheEntry { completion, usage };
        if let Err(e) = self.store(&key, &entry).await {
            warn!(error = %e, "failed to write completion cache");
        }
        Ok((entry.completion, entry.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::Message;
    use crate::providers::mock::{MockProvider, Scripted};

    fn context(text: &str) -> PromptContext {
        PromptContext {
            agent: "Itinerary_Compiler".to_string(),
            system: "Compile the plan.".to_string(),
            messages: vec![Message::user("User_Proxy").with_text(text)],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_identical_prompts_replay() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let inner = Arc::new(MockProvider::replies(vec![
            Completion::text("first answer"),
            Completion::text("second answer"),
        ]));
        let cached = CachedProvider::new(inner.clone(), 42, dir.path());

        let (a, _) = cached.complete(&context("3 days in Goa")).await?;
        let (b, _) = cached.complete(&context("3 days in Goa")).await?;
        assert_eq!(a.content, "first answer");
        assert_eq!(b.content, "first answer");
        assert_eq!(inner.calls().len(), 1);

        let (c, _) = cached.complete(&context("5 days in Munnar")).await?;
        assert_eq!(c.content, "second answer");
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_changes_key() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let inner: Arc<dyn Provider> = Arc::new(MockProvider::new(vec![]));
        let a = CachedProvider::new(inner.clone(), 1, dir.path());
        let b = CachedProvider::new(inner, 2, dir.path());
        let key = a.cache_key(&context("x"))?;
        assert_ne!(key, b.cache_key(&context("x"))?);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        Ok(())
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let inner = Arc::new(MockProvider::new(vec![
            Scripted::Fail("boom".to_string()),
            Scripted::Reply(Completion::text("recovered")),
        ]));
        let cached = CachedProvider::new(inner, 42, dir.path());

        assert!(cached.complete(&context("q")).await.is_err());
        let (completion, _) = cached.complete(&context("q")).await?;
        assert_eq!(completion.content, "recovered");
        Ok(())
    }
}
