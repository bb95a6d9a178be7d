// src/core/testing.rs

use crate::core::{config::AppConfig, engine::Engine, prompt::PromptSource, registry::Registry};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A prompt that replays canned answers and records what it was asked.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
    presented: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptSource for ScriptedPrompt {
    async fn ask(&self, message: &str) -> Result<String> {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("No scripted answer left for '{}'", message))
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn present(&self, text: &str) {
        self.presented.lock().unwrap().push(text.to_string());
    }
}

/// Builds an engine over `registry` whose prompt replays `answers`.
pub fn engine_with(registry: Registry, answers: &[&str]) -> (Engine, Arc<ScriptedPrompt>) {
    let prompt = Arc::new(ScriptedPrompt::new(answers));
    let engine = Engine::new(
        registry,
        AppConfig::new("test", "test application"),
        prompt.clone(),
    )
    .unwrap();
    (engine, prompt)
}
