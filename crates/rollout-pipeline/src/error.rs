use std::time::Duration;

use rollout_core::{BuildError, DeployError, ResolverError};

use crate::lease::LeaseError;
use crate::orchestrator::PipelineState;

/// A stage ran out of wall-clock budget before its step answered.
#[derive(Debug, thiserror::Error)]
#[error("{stage} did not finish within {budget:?}")]
pub struct TimeoutError {
    pub stage: PipelineState,
    pub budget: Duration,
}

/// Why a run ended in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Resolve(#[from] ResolverError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl PipelineError {
    /// The state the run was in when it failed.
    pub fn stage(&self) -> PipelineState {
        match self {
            Self::Lease(_) => PipelineState::Start,
            Self::Build(_) => PipelineState::Building,
            Self::Resolve(_) => PipelineState::Resolving,
            Self::Deploy(_) => PipelineState::Deploying,
            Self::Timeout(e) => e.stage,
        }
    }

    /// Stable snake_case failure code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Lease(e) => e.reason(),
            Self::Build(e) => e.reason(),
            Self::Resolve(e) => e.reason(),
            Self::Deploy(e) => e.reason(),
            Self::Timeout(_) => "timeout_exceeded",
        }
    }

    pub fn is_lease_conflict(&self) -> bool {
        matches!(self, Self::Lease(LeaseError::Conflict(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_report_their_state() {
        let err = PipelineError::from(BuildError::CompileFailure {
            detail: "E0425".to_owned(),
        });
        assert_eq!(err.stage(), PipelineState::Building);
        assert_eq!(err.reason(), "compile_failure");

        let err = PipelineError::from(DeployError::RevisionUnhealthy {
            detail: "not ready".to_owned(),
        });
        assert_eq!(err.stage(), PipelineState::Deploying);
        assert_eq!(err.reason(), "revision_unhealthy");
    }

    #[test]
    fn timeout_reports_the_stage_it_cut_short() {
        let err = PipelineError::from(TimeoutError {
            stage: PipelineState::Resolving,
            budget: Duration::from_secs(60),
        });
        assert_eq!(err.stage(), PipelineState::Resolving);
        assert_eq!(err.reason(), "timeout_exceeded");
        assert_eq!(err.to_string(), "resolving did not finish within 60s");
    }
}
