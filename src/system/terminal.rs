// src/system/terminal.rs

use crate::core::prompt::PromptSource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Input, theme::ColorfulTheme};

/// Interactive prompt backed by `dialoguer`.
///
/// Each question runs on the blocking thread pool so a waiting prompt never
/// stalls webhook or scheduler tasks sharing the runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl PromptSource for TerminalPrompt {
    async fn ask(&self, message: &str) -> Result<String> {
        let message = message.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(message)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .context("Prompt task was interrupted")?
        .context("Could not read answer from the terminal")?;
        Ok(answer)
    }
}
