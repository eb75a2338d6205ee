use std::path::Path;
use std::time::Duration;

use rollout_core::{CloudRunConfig, ImageReference, SecretValue, ServiceIdentity};

use crate::executor::{GcloudExecutor, RealExecutor};
use crate::gcloud::GcloudError;

/// GCP operations client, parameterized over the executor for testability.
pub struct GcloudClient<E: GcloudExecutor = RealExecutor> {
    executor: E,
}

impl GcloudClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor::default(),
        }
    }
}

impl Default for GcloudClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: GcloudExecutor> GcloudClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Run a command, abandoning it after `timeout`.
    async fn exec_within(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<String, GcloudError> {
        match tokio::time::timeout(timeout, self.executor.exec(&args)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(GcloudError::Timeout {
                args,
                after: timeout,
            }),
        }
    }

    // ── Artifact Registry ──

    /// Ensure the Artifact Registry Docker repository exists, creating it if needed.
    pub async fn ensure_artifact_repo(
        &self,
        identity: &ServiceIdentity,
        repo_name: &str,
    ) -> Result<(), GcloudError> {
        let describe = self
            .executor
            .exec(&args([
                "artifacts",
                "repositories",
                "describe",
                repo_name,
                "--project",
                identity.project(),
                "--location",
                identity.region(),
            ]))
            .await;

        match describe {
            Ok(_) => Ok(()),
            Err(e) if e.is_resource_not_found() => {
                tracing::info!(repo = repo_name, "creating Artifact Registry repository");
                self.executor
                    .exec(&args([
                        "artifacts",
                        "repositories",
                        "create",
                        repo_name,
                        "--project",
                        identity.project(),
                        "--location",
                        identity.region(),
                        "--repository-format",
                        "docker",
                        "--quiet",
                    ]))
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    // ── Cloud Build ──

    /// Build the bundle remotely and push it as `image`.
    ///
    /// Returns Cloud Build's captured output.
    pub async fn submit_build(
        &self,
        bundle_dir: &Path,
        project_id: &str,
        image: &ImageReference,
        timeout: Duration,
    ) -> Result<String, GcloudError> {
        let bundle = bundle_dir.to_string_lossy().into_owned();
        let tag = image.to_string();
        let remote_timeout = format!("{}s", timeout.as_secs().max(1));

        self.exec_within(
            args([
                "builds",
                "submit",
                &bundle,
                "--project",
                project_id,
                "--tag",
                &tag,
                "--timeout",
                &remote_timeout,
                "--quiet",
            ]),
            timeout,
        )
        .await
    }

    // ── Cloud Run ──

    /// The service record as JSON.
    pub async fn describe_service(
        &self,
        identity: &ServiceIdentity,
        timeout: Duration,
    ) -> Result<String, GcloudError> {
        self.exec_within(
            args([
                "run",
                "services",
                "describe",
                identity.service(),
                "--project",
                identity.project(),
                "--region",
                identity.region(),
                "--platform",
                "managed",
                "--format",
                "json",
            ]),
            timeout,
        )
        .await
    }

    /// Create a new revision running `image` with the environment in
    /// `env_vars_file`. Returns the service record as JSON.
    ///
    /// `env_vars_file` of `None` clears the revision's environment.
    pub async fn deploy_service(
        &self,
        identity: &ServiceIdentity,
        image: &ImageReference,
        env_vars_file: Option<&Path>,
        config: &CloudRunConfig,
        timeout: Duration,
    ) -> Result<String, GcloudError> {
        let image = image.to_string();
        let cpu = config.cpu.to_string();
        let min = config.min_instances.to_string();
        let max = config.max_instances.to_string();
        let concurrency = config.concurrency.to_string();
        let port = config.port.to_string();

        let mut cmd = args([
            "run",
            "deploy",
            identity.service(),
            "--image",
            &image,
            "--project",
            identity.project(),
            "--region",
            identity.region(),
            "--platform",
            "managed",
            "--memory",
            &config.memory,
            "--cpu",
            &cpu,
            "--min-instances",
            &min,
            "--max-instances",
            &max,
            "--concurrency",
            &concurrency,
            "--port",
            &port,
            "--quiet",
            "--format",
            "json",
        ]);

        match env_vars_file {
            Some(path) => {
                cmd.push("--env-vars-file".to_owned());
                cmd.push(path.to_string_lossy().into_owned());
            }
            None => cmd.push("--clear-env-vars".to_owned()),
        }

        if config.allow_unauthenticated {
            cmd.push("--allow-unauthenticated".to_owned());
        } else {
            cmd.push("--no-allow-unauthenticated".to_owned());
        }

        self.exec_within(cmd, timeout).await
    }

    /// Send 100% of traffic to the latest ready revision.
    pub async fn route_traffic_to_latest(
        &self,
        identity: &ServiceIdentity,
        timeout: Duration,
    ) -> Result<(), GcloudError> {
        self.exec_within(
            args([
                "run",
                "services",
                "update-traffic",
                identity.service(),
                "--to-latest",
                "--project",
                identity.project(),
                "--region",
                identity.region(),
                "--platform",
                "managed",
                "--quiet",
            ]),
            timeout,
        )
        .await
        .map(|_| ())
    }

    // ── Secret Manager ──

    /// Read the latest version of a secret.
    pub async fn access_secret(
        &self,
        project_id: &str,
        secret_name: &str,
    ) -> Result<SecretValue, GcloudError> {
        let mut value = self
            .executor
            .exec(&args([
                "secrets",
                "versions",
                "access",
                "latest",
                "--secret",
                secret_name,
                "--project",
                project_id,
            ]))
            .await?;

        // A trailing newline from `echo ... | gcloud secrets create` is not part of the value
        if value.ends_with('\n') {
            value.pop();
            if value.ends_with('\r') {
                value.pop();
            }
        }
        Ok(SecretValue::new(value))
    }
}

// ── Helper ──

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}
