//! # System Interaction Layer
//!
//! Adapters that connect the engine to the user's terminal.
//!
//! ## Modules
//!
//! - **`terminal`**: The interactive prompt source, backed by `dialoguer`. It
//!   answers missing parameter values and command selection questions.

pub mod terminal;
