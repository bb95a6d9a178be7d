// src/core/mod.rs

pub mod api;
pub mod config;
pub mod engine;
pub mod history;
pub mod hooks;
pub mod parameters;
pub mod prompt;
pub mod registry;
pub mod scheduler;
pub mod validators;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;
