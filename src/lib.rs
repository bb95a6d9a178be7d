include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::{
    api::{Api, ExecutionContext},
    config::AppConfig,
    engine::{Engine, EngineError, RunScope},
    registry::{Handler, Registry, handler_fn},
    scheduler::{Every, JobStatus},
};
pub use crate::models::{Args, Argument, Invocation};
