pub mod cli_models;
pub mod capture_config;

/// Default location of the capture config, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// The literal the operator types to end a capture
pub const STOP_TOKEN: &str = "stop";
