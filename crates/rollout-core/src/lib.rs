//! Core types and configuration for rollout.
//!
//! This crate defines the `rollout.toml` schema ([`RolloutConfig`]), service
//! identity and image types, the redacting secret wrapper, the configuration
//! assembler ([`assemble`]), and the stage contracts the pipeline runs on
//! ([`ImageBuilder`], [`EndpointResolver`], [`RevisionDeployer`]).

pub mod config;
pub mod env;
pub mod error;
pub mod identity;
pub mod project;
pub mod secret;
pub mod stage;

pub use config::{
    BuildConfig, CONFIG_FILE, CloudRunConfig, LeaseConfig, RolloutConfig, SERVICE_TAG,
    SecretSourceKind, SecretsConfig, ServiceConfig, TagStrategy, TimeoutConfig,
};
pub use env::{
    ConfigEntry, ConfigValue, ConfigurationSet, EndpointBinding, EndpointFormat, ValueSource,
    assemble,
};
pub use error::{Error, Result};
pub use identity::{Endpoint, ImageReference, ServiceIdentity};
pub use project::ProjectMeta;
pub use secret::{SecretValue, Secrets};
pub use stage::{
    BuildError, DeployError, EndpointResolver, ImageBuilder, ResolverError, Revision,
    RevisionDeployer, SecretError, SecretProvider,
};
