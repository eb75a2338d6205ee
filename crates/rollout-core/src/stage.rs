//! Contracts for the pipeline stages that talk to the registry and platform.
//!
//! The orchestrator is generic over these traits; `rollout-cloud` implements
//! them on top of gcloud, tests implement them in memory.

use std::path::Path;
use std::time::Duration;

use crate::env::ConfigurationSet;
use crate::identity::{Endpoint, ImageReference, ServiceIdentity};
use crate::secret::Secrets;

/// Compiles a source tree into a container image and pushes it.
#[allow(async_fn_in_trait)]
pub trait ImageBuilder: Send + Sync {
    /// Build `source` and push the image under the identity's tag.
    ///
    /// A single attempt: no retries happen at this layer.
    async fn build_and_push(
        &self,
        identity: &ServiceIdentity,
        source: &Path,
        timeout: Duration,
    ) -> Result<ImageReference, BuildError>;
}

/// Reads the public address of the currently live service.
#[allow(async_fn_in_trait)]
pub trait EndpointResolver: Send + Sync {
    /// `Ok(None)` means the service does not exist yet, which is the normal
    /// state on a first deploy.
    async fn resolve(
        &self,
        identity: &ServiceIdentity,
        timeout: Duration,
    ) -> Result<Option<Endpoint>, ResolverError>;
}

/// Creates a new revision and moves all traffic onto it.
#[allow(async_fn_in_trait)]
pub trait RevisionDeployer: Send + Sync {
    /// Returns once the platform reports the new revision serving.
    async fn deploy(
        &self,
        identity: &ServiceIdentity,
        image: &ImageReference,
        config: &ConfigurationSet,
        timeout: Duration,
    ) -> Result<Revision, DeployError>;
}

/// Fetches named secrets before a run starts.
#[allow(async_fn_in_trait)]
pub trait SecretProvider: Send + Sync {
    async fn fetch(&self, names: &[String]) -> Result<Secrets, SecretError>;
}

impl<T: ImageBuilder> ImageBuilder for &T {
    async fn build_and_push(
        &self,
        identity: &ServiceIdentity,
        source: &Path,
        timeout: Duration,
    ) -> Result<ImageReference, BuildError> {
        (**self).build_and_push(identity, source, timeout).await
    }
}

impl<T: EndpointResolver> EndpointResolver for &T {
    async fn resolve(
        &self,
        identity: &ServiceIdentity,
        timeout: Duration,
    ) -> Result<Option<Endpoint>, ResolverError> {
        (**self).resolve(identity, timeout).await
    }
}

impl<T: RevisionDeployer> RevisionDeployer for &T {
    async fn deploy(
        &self,
        identity: &ServiceIdentity,
        image: &ImageReference,
        config: &ConfigurationSet,
        timeout: Duration,
    ) -> Result<Revision, DeployError> {
        (**self).deploy(identity, image, config, timeout).await
    }
}

/// A revision the platform reports as serving all traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Public address of the service (stable across revisions)
    pub endpoint: Endpoint,
    /// Platform-assigned revision name, when reported
    pub name: Option<String>,
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("source tree is not buildable: {detail}")]
    InvalidSource { detail: String },

    #[error("image build failed: {detail}")]
    CompileFailure { detail: String },

    #[error("registry rejected the image push: {detail}")]
    PushRejected { detail: String },

    #[error("image build exceeded {after:?}")]
    TimeoutExceeded { after: Duration },

    #[error("build service unavailable: {detail}")]
    PlatformUnavailable { detail: String },
}

impl BuildError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidSource { .. } => "invalid_source",
            Self::CompileFailure { .. } => "compile_failure",
            Self::PushRejected { .. } => "push_rejected",
            Self::TimeoutExceeded { .. } => "timeout_exceeded",
            Self::PlatformUnavailable { .. } => "platform_unavailable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("platform unreachable: {detail}")]
    PlatformUnreachable { detail: String },

    #[error("malformed service record: {detail}")]
    MalformedResponse { detail: String },

    #[error("endpoint lookup exceeded {after:?}")]
    TimeoutExceeded { after: Duration },
}

impl ResolverError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PlatformUnreachable { .. } => "platform_unreachable",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::TimeoutExceeded { .. } => "timeout_exceeded",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("new revision did not become healthy: {detail}")]
    RevisionUnhealthy { detail: String },

    #[error("revision deploy exceeded {after:?}")]
    TimeoutExceeded { after: Duration },

    #[error("platform rejected the revision configuration: {detail}")]
    PlatformRejectedConfig { detail: String },

    #[error("platform unavailable: {detail}")]
    PlatformUnavailable { detail: String },
}

impl DeployError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RevisionUnhealthy { .. } => "revision_unhealthy",
            Self::TimeoutExceeded { .. } => "timeout_exceeded",
            Self::PlatformRejectedConfig { .. } => "platform_rejected_config",
            Self::PlatformUnavailable { .. } => "platform_unavailable",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret '{name}' is not available: {detail}")]
    Missing { name: String, detail: String },

    #[error("secret provider failed: {detail}")]
    Provider { detail: String },
}
