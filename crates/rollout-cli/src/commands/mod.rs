mod deploy;
mod secrets;

/// Lease directory used when `[lease].dir` is not set.
pub(crate) const DEFAULT_LEASE_DIR: &str = "rollout-leases";

pub use deploy::deploy;
