// src/core/prompt.rs

use anyhow::Result;
use async_trait::async_trait;
use colored::*;

/// Supplies answers to questions the engine cannot answer on its own:
/// missing parameter values and command selection.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// Asks `message` and waits for a single freeform answer.
    async fn ask(&self, message: &str) -> Result<String>;

    /// Surfaces a rejected answer to the user.
    fn notify(&self, message: &str) {
        eprintln!("{}", format!("  | {}", message).red());
    }

    /// Shows informational text, such as the command selection table.
    fn present(&self, text: &str) {
        println!("{}", text);
    }
}
