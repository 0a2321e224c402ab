//! ---
//! cvo_section: "01-core-functionality"
//! cvo_subsection: "module"
//! cvo_type: "source"
//! cvo_scope: "code"
//! cvo_description: "Shared primitives and utilities for the core runtime."
//! cvo_version: "v0.0.0-prealpha"
//! cvo_owner: "tbd"
//! ---
//! Core shared primitives for the cluster version operator workspace.
//! This crate exposes configuration loading, startup identity validation,
//! logging, and version metadata utilities consumed across the workspace.

pub mod config;
pub mod identity;
pub mod logging;
pub mod version;

pub use config::{
    ClientSettings, ConfigError, ElectionConfig, LockConfig, LoggingConfig, OperatorConfig,
    COMPONENT_NAME, LOCK_NAMESPACE,
};
pub use identity::{ClusterId, IdentityError, ProcessIdentity, POD_NAME_ENV};
pub use logging::{flush_tracing, init_tracing, LogFormat};
pub use version::VersionInfo;
