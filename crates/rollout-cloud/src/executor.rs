use std::ffi::OsString;
use std::process::Stdio;

use crate::gcloud::GcloudError;

/// Runs one gcloud invocation and returns its stdout.
///
/// [`GcloudClient`](crate::GcloudClient) is generic over this so tests can
/// answer commands without a gcloud installation.
#[allow(async_fn_in_trait)]
pub trait GcloudExecutor: Send + Sync {
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError>;
}

/// Spawns the gcloud CLI.
///
/// Dropping the returned future kills the child, so a caller-side timeout
/// stops the command instead of leaving it running.
#[derive(Debug, Clone)]
pub struct RealExecutor {
    program: OsString,
}

impl Default for RealExecutor {
    fn default() -> Self {
        Self {
            program: OsString::from("gcloud"),
        }
    }
}

impl RealExecutor {
    /// Use a gcloud binary other than the one on `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl GcloudExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError> {
        tracing::debug!(program = ?self.program, ?args, "running gcloud");

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GcloudError::NotFound { source: e })?;

        if !output.status.success() {
            return Err(GcloudError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| GcloudError::InvalidUtf8 { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let executor = RealExecutor::with_program("/nonexistent/rollout-test-gcloud");

        let result = executor.exec(&["version".to_owned()]).await;

        assert!(matches!(result, Err(GcloudError::NotFound { .. })));
    }
}
