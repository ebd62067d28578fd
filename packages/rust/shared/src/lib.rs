//! Shared types, error model, and configuration for hubkit.
//!
//! This crate is the foundation depended on by all other hubkit crates.
//! It provides:
//! - [`HubError`], the unified error type
//! - Content model types ([`ContentModel`], [`ComponentModel`], [`IndexPath`])
//! - Configuration ([`AppConfig`], [`LoaderConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ComponentsConfig, LoaderConfig, LoaderSection, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{HubError, Result};
pub use types::{
    ComponentIdentifier, ComponentModel, ConnectivityState, ContentModel, FeatureInfo, IndexPath,
    JsonMap,
};
