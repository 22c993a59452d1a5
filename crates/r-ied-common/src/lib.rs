//! ---
//! ied_section: "01-core-functionality"
//! ied_subsection: "module"
//! ied_type: "source"
//! ied_scope: "code"
//! ied_description: "Shared primitives and utilities for the relay runtime."
//! ied_version: "v0.0.0-prealpha"
//! ied_owner: "tbd"
//! ---
//! Shared primitives for the R-IED workspace: configuration loading and the
//! tracing bootstrap used by the daemon.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, CaptureConfig, LoadedAppConfig, LoggingConfig, ModelConfig,
    NameMatching, SimulationConfig, StalenessPolicy,
};
pub use logging::{init_tracing, LogFormat};
