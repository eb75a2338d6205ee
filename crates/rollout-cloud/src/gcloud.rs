use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GcloudError {
    #[error("gcloud CLI not found; install: https://cloud.google.com/sdk/docs/install")]
    NotFound { source: std::io::Error },

    #[error("gcloud command failed: {args:?}\n{stderr}")]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("gcloud output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },

    #[error("gcloud command did not finish within {after:?}: {args:?}")]
    Timeout { args: Vec<String>, after: Duration },
}

impl GcloudError {
    /// stderr of a failed command, if the command ran at all.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Whether gcloud reported the requested resource as missing.
    pub fn is_resource_not_found(&self) -> bool {
        self.stderr().is_some_and(|stderr| {
            let lower = stderr.to_ascii_lowercase();
            lower.contains("could not be found")
                || lower.contains("not_found")
                || lower.contains("cannot find service")
        })
    }

    /// The line of gcloud's error output worth showing to a person.
    ///
    /// Prefers gcloud's own `ERROR:` line, falling back to the last
    /// non-empty line, then to the error's display text.
    pub fn summary(&self) -> String {
        let Some(stderr) = self.stderr() else {
            return self.to_string();
        };
        let lines: Vec<&str> = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        lines
            .iter()
            .find(|l| l.starts_with("ERROR:"))
            .or(lines.last())
            .map_or_else(|| self.to_string(), |l| (*l).to_owned())
    }
}
