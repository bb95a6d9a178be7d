// src/constants.rs

/// The config file the demo runner reads from the working directory, if present.
pub const CONFIG_FILENAME: &str = "lanes.toml";

/// The port webhooks listen on when none is given.
pub const DEFAULT_WEBHOOK_PORT: u16 = 7777;

pub const DEFAULT_WEBHOOK_HOST: &str = "0.0.0.0";
