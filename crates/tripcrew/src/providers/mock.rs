use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::providers::base::{Completion, PromptContext, Provider, Usage};

pub enum Scripted {
    Reply(Completion),
    Fail(String),
    Hang,
}

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<PromptContext>>,
}

impl MockProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(completions: Vec<Completion>) -> Self {
        Self::new(completions.into_iter().map(Scripted::Reply).collect())
    }

    pub fn calls(&self) -> Vec<PromptContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        "mock"
    }

    async fn complete(&self, context: &PromptContext) -> Result<(Completion, Usage)> {
        self.seen.lock().unwrap().push(context.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            // Return an empty response once the script runs out
            None => Ok((Completion::text("..."), Usage::default())),
            Some(Scripted::Reply(completion)) => Ok((completion, Usage::default())),
            Some(Scripted::Fail(reason)) => Err(anyhow!(reason)),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("mock provider hung"))
            }
        }
    }
}
