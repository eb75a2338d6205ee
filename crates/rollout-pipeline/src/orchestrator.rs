//! The release state machine.
//!
//! `Start → Building → Resolving → Assembling → Deploying → {Succeeded | Failed}`
//!
//! A run is linear: each stage runs once, any error moves straight to
//! `Failed`, and nothing is retried. Every stage is bounded by its own budget
//! and by what is left of the run's total budget, whichever is smaller.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rollout_core::{
    BuildError, DeployError, Endpoint, EndpointBinding, EndpointResolver, ImageBuilder,
    ImageReference, ResolverError, RevisionDeployer, Secrets, ServiceIdentity, TimeoutConfig,
    assemble,
};
use tokio::time::{Instant, timeout};

use crate::error::{PipelineError, TimeoutError};
use crate::lease::LeaseRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Start,
    Building,
    Resolving,
    Assembling,
    Deploying,
    Succeeded,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Building => "building",
            Self::Resolving => "resolving",
            Self::Assembling => "assembling",
            Self::Deploying => "deploying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wall-clock budgets enforced by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBudgets {
    pub build: Duration,
    pub resolve: Duration,
    pub deploy: Duration,
    pub total: Duration,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for StageBudgets {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            build: config.build,
            resolve: config.resolve,
            deploy: config.deploy,
            total: config.total,
        }
    }
}

/// Everything one run needs besides the platform.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub identity: ServiceIdentity,
    pub source: PathBuf,
    pub static_env: BTreeMap<String, String>,
    pub secrets: Secrets,
    pub endpoint_binding: EndpointBinding,
}

impl PipelineRequest {
    pub fn new(identity: ServiceIdentity, source: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            source: source.into(),
            static_env: BTreeMap::new(),
            secrets: Secrets::new(),
            endpoint_binding: EndpointBinding::default(),
        }
    }
}

/// What a successful run put into service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub image: ImageReference,
    /// Where the new revision serves
    pub endpoint: Endpoint,
    /// Platform-assigned revision name, when reported
    pub revision: Option<String>,
    /// The service's address before this run, if it existed
    pub previous_endpoint: Option<Endpoint>,
}

/// The terminal status of one run.
#[derive(Debug)]
pub struct DeploymentResult {
    pub identity: ServiceIdentity,
    /// Every state the run entered, in order, ending in a terminal state
    pub transitions: Vec<PipelineState>,
    pub outcome: Result<Deployment, PipelineError>,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn final_state(&self) -> PipelineState {
        if self.succeeded() {
            PipelineState::Succeeded
        } else {
            PipelineState::Failed
        }
    }

    pub fn deployment(&self) -> Option<&Deployment> {
        match &self.outcome {
            Ok(deployment) => Some(deployment),
            Err(_) => None,
        }
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.deployment().map(|d| &d.endpoint)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.outcome.as_ref().err()
    }
}

/// Runs the stages against one builder, resolver, and deployer.
///
/// A single platform implementing all three contracts is passed by
/// reference for each.
pub struct Pipeline<B, R, D> {
    builder: B,
    resolver: R,
    deployer: D,
    leases: LeaseRegistry,
    budgets: StageBudgets,
}

impl<B, R, D> Pipeline<B, R, D>
where
    B: ImageBuilder,
    R: EndpointResolver,
    D: RevisionDeployer,
{
    pub fn new(builder: B, resolver: R, deployer: D) -> Self {
        Self {
            builder,
            resolver,
            deployer,
            leases: LeaseRegistry::in_memory(),
            budgets: StageBudgets::default(),
        }
    }

    pub fn with_leases(mut self, leases: LeaseRegistry) -> Self {
        self.leases = leases;
        self
    }

    pub fn with_budgets(mut self, budgets: StageBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn leases(&self) -> &LeaseRegistry {
        &self.leases
    }

    /// Run the pipeline once for `request.identity`.
    pub async fn run(&self, request: &PipelineRequest) -> DeploymentResult {
        let mut trace = Trace::new(&request.identity);
        let outcome = self.drive(request, &mut trace).await;

        match &outcome {
            Ok(deployment) => {
                trace.enter(PipelineState::Succeeded);
                tracing::info!(
                    identity = %request.identity,
                    endpoint = %deployment.endpoint,
                    image = %deployment.image,
                    "deployment succeeded"
                );
            }
            Err(e) => {
                trace.enter(PipelineState::Failed);
                tracing::warn!(
                    identity = %request.identity,
                    stage = %e.stage(),
                    reason = e.reason(),
                    error = %e,
                    "deployment failed"
                );
            }
        }

        DeploymentResult {
            identity: request.identity.clone(),
            transitions: trace.states,
            outcome,
        }
    }

    async fn drive(
        &self,
        request: &PipelineRequest,
        trace: &mut Trace<'_>,
    ) -> Result<Deployment, PipelineError> {
        let identity = &request.identity;
        let _lease = self.leases.acquire(identity)?;
        let started = Instant::now();

        trace.enter(PipelineState::Building);
        let budget = self.budget(self.budgets.build, started, PipelineState::Building)?;
        let image = timeout(
            budget,
            self.builder.build_and_push(identity, &request.source, budget),
        )
        .await
        .map_err(|_elapsed| BuildError::TimeoutExceeded { after: budget })??;

        trace.enter(PipelineState::Resolving);
        let budget = self.budget(self.budgets.resolve, started, PipelineState::Resolving)?;
        let previous = timeout(budget, self.resolver.resolve(identity, budget))
            .await
            .map_err(|_elapsed| ResolverError::TimeoutExceeded { after: budget })??;

        trace.enter(PipelineState::Assembling);
        self.remaining(started, PipelineState::Assembling)?;
        let config = assemble(
            &request.static_env,
            &request.secrets,
            previous.as_ref(),
            &request.endpoint_binding,
        );

        trace.enter(PipelineState::Deploying);
        let budget = self.budget(self.budgets.deploy, started, PipelineState::Deploying)?;
        let revision = timeout(
            budget,
            self.deployer.deploy(identity, &image, &config, budget),
        )
        .await
        .map_err(|_elapsed| DeployError::TimeoutExceeded { after: budget })??;

        Ok(Deployment {
            image,
            endpoint: revision.endpoint,
            revision: revision.name,
            previous_endpoint: previous,
        })
    }

    /// What is left of the total budget, failing `stage` if nothing is.
    fn remaining(&self, started: Instant, stage: PipelineState) -> Result<Duration, TimeoutError> {
        let remaining = self.budgets.total.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(TimeoutError {
                stage,
                budget: self.budgets.total,
            });
        }
        Ok(remaining)
    }

    fn budget(
        &self,
        stage_budget: Duration,
        started: Instant,
        stage: PipelineState,
    ) -> Result<Duration, TimeoutError> {
        Ok(stage_budget.min(self.remaining(started, stage)?))
    }
}

/// States entered by one run.
struct Trace<'a> {
    identity: &'a ServiceIdentity,
    states: Vec<PipelineState>,
}

impl<'a> Trace<'a> {
    fn new(identity: &'a ServiceIdentity) -> Self {
        tracing::info!(%identity, state = %PipelineState::Start, "pipeline started");
        Self {
            identity,
            states: vec![PipelineState::Start],
        }
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::info!(identity = %self.identity, %state, "pipeline transition");
        self.states.push(state);
    }
}
