//! Shared types, error model, and configuration for the lineage workspace.
//!
//! This crate is the foundation depended on by all other lineage crates.
//! It provides:
//! - [`LineageError`], the unified error type
//! - The lineage node model ([`Lineage`], [`NodeRef`]) and [`Document`]
//! - The [`DocumentStore`] port implemented by `lineage-storage`
//! - Configuration ([`AppConfig`], [`MoveConfig`], config loading)

pub mod config;
pub mod error;
pub mod lineage;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, MoveConfig, MovesConfig, StagingConfig, StoreConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{LineageError, Result};
pub use lineage::{Lineage, LineageLink, NodeRef};
pub use store::{DocumentStore, IndexName, index_entries};
pub use types::{DocType, Document};
