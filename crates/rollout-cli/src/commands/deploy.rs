use std::process::ExitCode;

use anyhow::Context;
use rollout_build::bundle;
use rollout_cloud::CloudRunPlatform;
use rollout_core::{ProjectMeta, RolloutConfig};
use rollout_pipeline::{LeaseRegistry, Pipeline, PipelineRequest, StageBudgets};

use super::DEFAULT_LEASE_DIR;
use super::secrets;
use crate::DeployArgs;

/// Run the release pipeline once and report its terminal status.
pub async fn deploy(args: DeployArgs) -> anyhow::Result<ExitCode> {
    let source = args.source;

    let mut config = match &args.config {
        Some(path) => RolloutConfig::load_file(path)?,
        None => RolloutConfig::load(&source)?,
    };
    if let Some(project) = args.project {
        config.service.project = Some(project);
    }
    if let Some(service) = args.service {
        config.service.name = Some(service);
    }
    if let Some(region) = args.region {
        config.service.region = region;
    }

    let meta = ProjectMeta::discover(&source)?;
    let identity = config.identity(meta.as_ref().map(|m| m.name.as_str()))?;

    // Refuse to ship uncommitted changes unless --allow-dirty
    if !args.allow_dirty && bundle::is_dirty(&source)? {
        anyhow::bail!(
            "uncommitted changes detected in {}.\n\
             Commit your changes, or use `rollout deploy --allow-dirty` to deploy anyway.",
            source.display()
        );
    }

    let secrets = secrets::fetch(&config.secrets, identity.project(), &source)
        .await
        .context("failed to read secrets")?;

    if config.lease.dir.is_none() {
        config.lease.dir = Some(std::env::temp_dir().join(DEFAULT_LEASE_DIR));
    }

    let platform = CloudRunPlatform::new(config.build.clone(), config.cloud_run.clone());
    let pipeline = Pipeline::new(&platform, &platform, &platform)
        .with_leases(LeaseRegistry::from_config(&config.lease))
        .with_budgets(StageBudgets::from(&config.timeouts));

    let request = PipelineRequest {
        identity: identity.clone(),
        source,
        static_env: config.env,
        secrets,
        endpoint_binding: config.endpoint,
    };

    println!("Deploying {identity}...");
    let result = pipeline.run(&request).await;

    match result.outcome {
        Ok(deployment) => {
            println!();
            println!("Deployed: {}", deployment.endpoint);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!(
                "Deployment failed at {} ({}): {e}",
                e.stage(),
                e.reason()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
