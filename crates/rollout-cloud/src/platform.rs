//! Cloud Build, Artifact Registry, Cloud Run, and Secret Manager behind the
//! pipeline's stage contracts.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use rollout_build::{bundle, descriptor};
use rollout_core::{
    BuildConfig, BuildError, CloudRunConfig, ConfigurationSet, DeployError, Endpoint,
    EndpointResolver, ImageBuilder, ImageReference, ResolverError, Revision, RevisionDeployer,
    SERVICE_TAG, SecretError, SecretProvider, Secrets, ServiceIdentity, TagStrategy,
};
use serde_json::Value;
use tokio::time::Instant;

use crate::client::GcloudClient;
use crate::executor::{GcloudExecutor, RealExecutor};
use crate::gcloud::GcloudError;

/// stderr fragments that mean the registry refused the image.
const PUSH_REJECTION_MARKERS: &[&str] = &[
    "denied",
    "permission_denied",
    "unauthorized",
    "failed to push",
    "push access",
];

/// stderr fragments that mean the new revision never became ready.
const UNHEALTHY_MARKERS: &[&str] = &[
    "failed to start",
    "is not ready",
    "health check",
    "healthcheck",
    "did not become ready",
];

/// A Cloud Run service and its Artifact Registry images, driven through gcloud.
pub struct CloudRunPlatform<E: GcloudExecutor = RealExecutor> {
    client: GcloudClient<E>,
    build: BuildConfig,
    cloud_run: CloudRunConfig,
}

impl CloudRunPlatform<RealExecutor> {
    pub fn new(build: BuildConfig, cloud_run: CloudRunConfig) -> Self {
        Self::with_client(GcloudClient::new(), build, cloud_run)
    }
}

impl<E: GcloudExecutor> CloudRunPlatform<E> {
    pub fn with_client(
        client: GcloudClient<E>,
        build: BuildConfig,
        cloud_run: CloudRunConfig,
    ) -> Self {
        Self {
            client,
            build,
            cloud_run,
        }
    }

    fn image_tag(&self, source: &Path) -> Result<String, BuildError> {
        match self.build.tag_strategy {
            TagStrategy::Service => Ok(SERVICE_TAG.to_owned()),
            TagStrategy::Commit => {
                bundle::head_commit(source).map_err(|e| BuildError::InvalidSource {
                    detail: format!("cannot derive commit tag: {e}"),
                })
            }
        }
    }
}

impl<E: GcloudExecutor> ImageBuilder for CloudRunPlatform<E> {
    async fn build_and_push(
        &self,
        identity: &ServiceIdentity,
        source: &Path,
        timeout: Duration,
    ) -> Result<ImageReference, BuildError> {
        let descriptor = descriptor::resolve(source, &self.build, self.cloud_run.port)
            .map_err(|e| BuildError::InvalidSource {
                detail: error_chain(&e),
            })?;
        let tag = self.image_tag(source)?;
        let image = ImageReference::for_service(identity, &self.build.repository, &tag);

        self.client
            .ensure_artifact_repo(identity, &self.build.repository)
            .await
            .map_err(|e| match e {
                GcloudError::NotFound { .. } => BuildError::PlatformUnavailable {
                    detail: e.to_string(),
                },
                other => BuildError::PushRejected {
                    detail: format!("registry repository unavailable: {}", other.summary()),
                },
            })?;

        let bundle_dir = bundle::create_bundle(source, descriptor.content()).map_err(|e| {
            BuildError::InvalidSource {
                detail: error_chain(&e),
            }
        })?;

        tracing::info!(%identity, %image, "submitting build");
        let output = self
            .client
            .submit_build(&bundle_dir, identity.project(), &image, timeout)
            .await
            .map_err(classify_build_failure)?;
        tracing::debug!(lines = output.lines().count(), "cloud build finished");

        Ok(image)
    }
}

impl<E: GcloudExecutor> EndpointResolver for CloudRunPlatform<E> {
    async fn resolve(
        &self,
        identity: &ServiceIdentity,
        timeout: Duration,
    ) -> Result<Option<Endpoint>, ResolverError> {
        let record = match self.client.describe_service(identity, timeout).await {
            Ok(record) => record,
            Err(e) if e.is_resource_not_found() => {
                tracing::info!(%identity, "service does not exist yet");
                return Ok(None);
            }
            Err(GcloudError::Timeout { after, .. }) => {
                return Err(ResolverError::TimeoutExceeded { after });
            }
            Err(e) => {
                return Err(ResolverError::PlatformUnreachable {
                    detail: e.summary(),
                });
            }
        };

        let url = parse_status_field(&record, "url").map_err(|detail| {
            ResolverError::MalformedResponse { detail }
        })?;
        match url {
            Some(url) => Ok(Some(Endpoint::new(url))),
            None => Err(ResolverError::MalformedResponse {
                detail: "service record has no status.url".to_owned(),
            }),
        }
    }
}

impl<E: GcloudExecutor> RevisionDeployer for CloudRunPlatform<E> {
    async fn deploy(
        &self,
        identity: &ServiceIdentity,
        image: &ImageReference,
        config: &ConfigurationSet,
        timeout: Duration,
    ) -> Result<Revision, DeployError> {
        let deadline = Instant::now() + timeout;

        // Held until the deploy returns; the file is removed on drop
        let env_file = if config.is_empty() {
            None
        } else {
            Some(write_env_file(config)?)
        };

        tracing::info!(
            %identity,
            %image,
            variables = config.len(),
            "creating revision"
        );
        let record = self
            .client
            .deploy_service(
                identity,
                image,
                env_file.as_ref().map(|f| f.path()),
                &self.cloud_run,
                timeout,
            )
            .await
            .map_err(|e| classify_deploy_failure(e, config))?;
        drop(env_file);

        let url = parse_status_field(&record, "url")
            .map_err(|detail| DeployError::RevisionUnhealthy { detail })?
            .ok_or_else(|| DeployError::RevisionUnhealthy {
                detail: "deployed service reports no status.url".to_owned(),
            })?;
        let name = parse_status_field(&record, "latestReadyRevisionName")
            .map_err(|detail| DeployError::RevisionUnhealthy { detail })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.client
            .route_traffic_to_latest(identity, remaining)
            .await
            .map_err(|e| classify_deploy_failure(e, config))?;

        tracing::info!(%identity, revision = ?name, %url, "revision serving all traffic");
        Ok(Revision {
            endpoint: Endpoint::new(url),
            name,
        })
    }
}

/// Secret Manager as the source of a run's named secrets.
pub struct SecretManager<E: GcloudExecutor = RealExecutor> {
    client: GcloudClient<E>,
    project: String,
}

impl SecretManager<RealExecutor> {
    pub fn new(project: impl Into<String>) -> Self {
        Self::with_client(GcloudClient::new(), project)
    }
}

impl<E: GcloudExecutor> SecretManager<E> {
    pub fn with_client(client: GcloudClient<E>, project: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
        }
    }
}

impl<E: GcloudExecutor> SecretProvider for SecretManager<E> {
    async fn fetch(&self, names: &[String]) -> Result<Secrets, SecretError> {
        let mut secrets = Secrets::new();
        for name in names {
            let value = self
                .client
                .access_secret(&self.project, name)
                .await
                .map_err(|e| match e {
                    GcloudError::NotFound { .. } => SecretError::Provider {
                        detail: e.to_string(),
                    },
                    other => SecretError::Missing {
                        name: name.clone(),
                        detail: other.summary(),
                    },
                })?;
            secrets.insert(name, value);
        }
        tracing::debug!(count = secrets.len(), "secrets fetched from Secret Manager");
        Ok(secrets)
    }
}

// ── Helpers ──

fn classify_build_failure(err: GcloudError) -> BuildError {
    match err {
        GcloudError::Timeout { after, .. } => BuildError::TimeoutExceeded { after },
        GcloudError::NotFound { .. } => BuildError::PlatformUnavailable {
            detail: err.to_string(),
        },
        GcloudError::CommandFailed { ref stderr, .. }
            if contains_any(stderr, PUSH_REJECTION_MARKERS) =>
        {
            BuildError::PushRejected {
                detail: err.summary(),
            }
        }
        other => BuildError::CompileFailure {
            detail: other.summary(),
        },
    }
}

fn classify_deploy_failure(err: GcloudError, config: &ConfigurationSet) -> DeployError {
    match err {
        GcloudError::Timeout { after, .. } => DeployError::TimeoutExceeded { after },
        GcloudError::NotFound { .. } => DeployError::PlatformUnavailable {
            detail: err.to_string(),
        },
        GcloudError::CommandFailed { ref stderr, .. }
            if contains_any(stderr, UNHEALTHY_MARKERS) =>
        {
            DeployError::RevisionUnhealthy {
                detail: config.scrub(&err.summary()),
            }
        }
        other => DeployError::PlatformRejectedConfig {
            detail: config.scrub(&other.summary()),
        },
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

/// `status.<field>` of a service record; `Err` if the record is not JSON.
fn parse_status_field(record: &str, field: &str) -> Result<Option<String>, String> {
    let value: Value =
        serde_json::from_str(record).map_err(|e| format!("service record is not JSON: {e}"))?;
    Ok(value
        .get("status")
        .and_then(|status| status.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned))
}

/// Stage the environment in a private temporary file for `--env-vars-file`.
///
/// JSON is valid YAML, which is what gcloud reads.
fn write_env_file(config: &ConfigurationSet) -> Result<tempfile::NamedTempFile, DeployError> {
    let stage_failed = |e: std::io::Error| DeployError::PlatformUnavailable {
        detail: format!("failed to stage env-vars file: {e}"),
    };

    let mut file = tempfile::Builder::new()
        .prefix("rollout-env-")
        .suffix(".yaml")
        .tempfile()
        .map_err(stage_failed)?;
    let body = serde_json::to_vec(&config.exposed()).map_err(|e| {
        DeployError::PlatformUnavailable {
            detail: format!("failed to encode environment: {e}"),
        }
    })?;
    file.write_all(&body).map_err(stage_failed)?;
    file.flush().map_err(stage_failed)?;
    Ok(file)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
