use std::path::{Path, PathBuf};
use std::process::Command;

/// Directory the bundle is staged in, relative to the source root.
pub const BUNDLE_DIR: &str = ".rollout-bundle";

/// Tool directories never shipped to Cloud Build, regardless of .gitignore.
const ROLLOUT_EXCLUDES: &[&str] = &[BUNDLE_DIR, ".rollout", ".git"];

/// Stages the source tree for Cloud Build submission.
///
/// Uses `git ls-files` to respect `.gitignore`, copies every tracked and
/// untracked-but-not-ignored file into `.rollout-bundle/`, then writes the
/// resolved build descriptor as the bundle's `Dockerfile`.
pub fn create_bundle(source_dir: &Path, dockerfile_content: &str) -> Result<PathBuf, BundleError> {
    let bundle_dir = source_dir.join(BUNDLE_DIR);

    // A bundle left by an earlier run would leak stale files into this one
    if bundle_dir.exists() {
        std::fs::remove_dir_all(&bundle_dir).map_err(io_error("clean up", &bundle_dir))?;
    }
    std::fs::create_dir_all(&bundle_dir).map_err(io_error("create", &bundle_dir))?;

    let shipped: Vec<PathBuf> = git_ls_files(source_dir)?
        .into_iter()
        .filter(|path| !ROLLOUT_EXCLUDES.iter().any(|ex| path.starts_with(ex)))
        // Deleted from the working tree but still tracked
        .filter(|path| source_dir.join(path).is_file())
        .collect();

    for relative_path in &shipped {
        let src = source_dir.join(relative_path);
        let dst = bundle_dir.join(relative_path);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(io_error("create", parent))?;
        }
        std::fs::copy(&src, &dst).map_err(io_error("copy", &src))?;
    }

    let dockerfile_path = bundle_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile_content)
        .map_err(io_error("write", &dockerfile_path))?;

    tracing::debug!(bundle = %bundle_dir.display(), files = shipped.len(), "source bundled");
    Ok(bundle_dir)
}

/// Files git considers part of the project: tracked files plus untracked
/// files that are not ignored.
fn git_ls_files(source_dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let stdout = git(source_dir, &["ls-files", "--cached", "--others", "--exclude-standard"])?;
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Checks whether the git working tree has uncommitted changes.
///
/// rollout's own directories (a staged bundle from a previous run) do not count.
pub fn is_dirty(source_dir: &Path) -> Result<bool, BundleError> {
    let stdout = git(source_dir, &["status", "--porcelain"])?;
    Ok(stdout
        .lines()
        .filter_map(|line| line.get(3..))
        .any(|path| {
            !ROLLOUT_EXCLUDES
                .iter()
                .any(|ex| Path::new(path).starts_with(ex))
        }))
}

/// Short hash of the commit checked out in `source_dir`.
pub fn head_commit(source_dir: &Path) -> Result<String, BundleError> {
    let stdout = git(source_dir, &["rev-parse", "--short=12", "HEAD"])?;
    Ok(stdout.trim().to_owned())
}

fn git(source_dir: &Path, args: &[&str]) -> Result<String, BundleError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(source_dir)
        .output()
        .map_err(|e| BundleError::GitCommand {
            detail: format!("failed to execute git {}", args.join(" ")),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BundleError::GitFailed {
            detail: format!(
                "git {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("failed to {action} {path}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },

    #[error("git failed: {detail}")]
    GitFailed { detail: String },
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> BundleError {
    let path = path.to_path_buf();
    move |source| BundleError::Io {
        action,
        path,
        source,
    }
}
