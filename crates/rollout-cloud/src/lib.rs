//! gcloud-backed implementations of rollout's stage contracts.
//!
//! [`CloudRunPlatform`] builds with Cloud Build, pushes to Artifact Registry,
//! and deploys revisions to Cloud Run. [`SecretManager`] reads the secrets a
//! run injects. Both go through [`GcloudExecutor`], so tests can substitute
//! the gcloud CLI with a mock.

pub mod client;
pub mod executor;
pub mod gcloud;
pub mod platform;

pub use client::GcloudClient;
pub use executor::{GcloudExecutor, RealExecutor};
pub use gcloud::GcloudError;
pub use platform::{CloudRunPlatform, SecretManager};
