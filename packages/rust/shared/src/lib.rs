//! Shared types, error model, and configuration for the course feedback overlay.
//!
//! This crate is the foundation depended on by all other crates in the workspace.
//! It provides:
//! - [`CourseFeedbackError`]: the unified error type
//! - Domain types ([`CourseRecord`], [`FeedbackRecord`], [`CourseKey`], [`FieldKind`])
//! - Configuration ([`AppConfig`], [`ReconcilerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FeedbackServiceConfig, ReconcileSection, ReconcilerConfig, SitesConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_endpoint,
};
pub use error::{CourseFeedbackError, Result};
pub use types::{CourseKey, CourseRecord, FeedbackIndex, FeedbackRecord, FieldKind};
