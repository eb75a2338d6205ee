use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::EndpointBinding;
use crate::identity::ServiceIdentity;

/// Name of the configuration file looked up at the source root.
pub const CONFIG_FILE: &str = "rollout.toml";

/// rollout.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub cloud_run: CloudRunConfig,
    /// Static environment defaults for every revision.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub endpoint: EndpointBinding,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// GCP project ID
    pub project: Option<String>,
    /// Cloud Run service name (defaults to Cargo.toml package name)
    pub name: Option<String>,
    /// GCP region (defaults to us-central1)
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Artifact Registry repository holding the images
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default)]
    pub tag_strategy: TagStrategy,
    /// Rust builder image
    #[serde(default = "default_builder_image")]
    pub base_image: String,
    /// Runtime base image
    #[serde(default = "default_runtime_image")]
    pub runtime_image: String,
    /// Additional system packages to install via apt-get
    #[serde(default)]
    pub extra_packages: Vec<String>,
    /// Cargo Chef version
    #[serde(default = "default_cargo_chef_version")]
    pub cargo_chef_version: String,
}

/// How the image tag is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStrategy {
    /// One fixed tag per service; every push supersedes the previous image.
    #[default]
    Service,
    /// Short git commit hash of the source tree.
    Commit,
}

/// Tag used by [`TagStrategy::Service`].
pub const SERVICE_TAG: &str = "latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudRunConfig {
    /// Memory allocation
    #[serde(default = "default_memory")]
    pub memory: String,
    /// CPU count
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    /// Minimum instances
    #[serde(default)]
    pub min_instances: u32,
    /// Maximum instances
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    /// Max concurrent requests per instance
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Port the application listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Serve the revision publicly
    #[serde(default = "default_true")]
    pub allow_unauthenticated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub source: SecretSourceKind,
    /// Secrets injected into every revision, by name
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretSourceKind {
    /// Latest version from Secret Manager
    #[default]
    SecretManager,
    /// Process environment, after loading `.env`
    Env,
}

/// Wall-clock budgets per pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub build: Duration,
    #[serde(default = "default_resolve_timeout", with = "humantime_serde")]
    pub resolve: Duration,
    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub deploy: Duration,
    /// Budget for the whole run
    #[serde(default = "default_total_timeout", with = "humantime_serde")]
    pub total: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Directory for cross-process lease files
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Age after which a lease file is considered abandoned
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            project: None,
            name: None,
            region: default_region(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            tag_strategy: TagStrategy::default(),
            base_image: default_builder_image(),
            runtime_image: default_runtime_image(),
            extra_packages: Vec::new(),
            cargo_chef_version: default_cargo_chef_version(),
        }
    }
}

impl Default for CloudRunConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpu: default_cpu(),
            min_instances: 0,
            max_instances: default_max_instances(),
            concurrency: default_concurrency(),
            port: default_port(),
            allow_unauthenticated: true,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            build: default_build_timeout(),
            resolve: default_resolve_timeout(),
            deploy: default_deploy_timeout(),
            total: default_total_timeout(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            dir: None,
            stale_after: default_stale_after(),
        }
    }
}

impl RolloutConfig {
    /// Load from rollout.toml in the given directory, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load_file(&config_path)
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_file(config_path: &Path) -> crate::Result<Self> {
        let content =
            std::fs::read_to_string(config_path).map_err(|e| crate::Error::ConfigLoad {
                path: config_path.to_path_buf(),
                source: e,
            })?;
        toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Build the service identity, falling back to `default_name` for the service.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingProject`](crate::Error::MissingProject) if no project is configured
    /// - [`Error::MissingServiceName`](crate::Error::MissingServiceName) if no name is known
    /// - identity validation errors from [`ServiceIdentity::new`]
    pub fn identity(&self, default_name: Option<&str>) -> crate::Result<ServiceIdentity> {
        let project = self
            .service
            .project
            .as_deref()
            .ok_or(crate::Error::MissingProject)?;
        let name = self
            .service
            .name
            .as_deref()
            .or(default_name)
            .ok_or(crate::Error::MissingServiceName)?;
        ServiceIdentity::new(project, name, &self.service.region)
    }
}

fn default_region() -> String {
    "us-central1".to_owned()
}

fn default_repository() -> String {
    "rollout".to_owned()
}

fn default_builder_image() -> String {
    "rust:1.84-bookworm".to_owned()
}

fn default_runtime_image() -> String {
    "gcr.io/distroless/cc-debian12".to_owned()
}

fn default_cargo_chef_version() -> String {
    "0.1.68".to_owned()
}

fn default_memory() -> String {
    "512Mi".to_owned()
}

fn default_cpu() -> u32 {
    1
}

fn default_max_instances() -> u32 {
    10
}

fn default_concurrency() -> u32 {
    80
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(20 * 60)
}

fn default_resolve_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_total_timeout() -> Duration {
    Duration::from_secs(40 * 60)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(60 * 60)
}
