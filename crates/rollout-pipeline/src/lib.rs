//! Release orchestration for rollout.
//!
//! [`Pipeline`] drives one run per call through build, endpoint resolution,
//! configuration assembly, and revision deploy, holding a [`LeaseGuard`] on
//! the service identity throughout so two runs for the same service never
//! interleave.

pub mod error;
pub mod lease;
pub mod orchestrator;

pub use error::{PipelineError, TimeoutError};
pub use lease::{LeaseConflictError, LeaseError, LeaseGuard, LeaseInfo, LeaseRegistry};
pub use orchestrator::{
    Deployment, DeploymentResult, Pipeline, PipelineRequest, PipelineState, StageBudgets,
};
