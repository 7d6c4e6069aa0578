// Configuration loading

pub mod settings;

pub use settings::{
    AuthSettings, ConfigError, HttpSettings, PacingSettings, Settings, DEFAULT_API_BASE,
    DEFAULT_OUTPUT,
};
