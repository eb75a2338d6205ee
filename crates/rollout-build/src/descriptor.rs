use std::path::{Path, PathBuf};

use rollout_core::{BuildConfig, ProjectMeta};

use crate::dockerfile::DockerfileGenerator;

/// The build descriptor an image is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDescriptor {
    /// A Dockerfile shipped in the source tree.
    Provided { path: PathBuf, content: String },
    /// Generated from the source tree's Cargo.toml.
    Generated { binary: String, content: String },
}

impl BuildDescriptor {
    pub fn content(&self) -> &str {
        match self {
            Self::Provided { content, .. } | Self::Generated { content, .. } => content,
        }
    }
}

/// Find the descriptor for `source_dir`.
///
/// A `Dockerfile` at the root is used as is. Otherwise a Cargo package gets
/// a generated Dockerfile. Anything else is not buildable.
pub fn resolve(
    source_dir: &Path,
    config: &BuildConfig,
    port: u16,
) -> Result<BuildDescriptor, DescriptorError> {
    if !source_dir.is_dir() {
        return Err(DescriptorError::NotADirectory(source_dir.to_path_buf()));
    }

    let dockerfile = source_dir.join("Dockerfile");
    if dockerfile.is_file() {
        let content =
            std::fs::read_to_string(&dockerfile).map_err(|e| DescriptorError::Read {
                path: dockerfile.clone(),
                source: e,
            })?;
        tracing::debug!(path = %dockerfile.display(), "using Dockerfile from source tree");
        return Ok(BuildDescriptor::Provided {
            path: dockerfile,
            content,
        });
    }

    let meta = ProjectMeta::discover(source_dir)?
        .ok_or_else(|| DescriptorError::Missing(source_dir.to_path_buf()))?;
    let content = DockerfileGenerator::new(config, &meta, port).render();
    tracing::debug!(binary = %meta.binary_name, "generated Dockerfile");

    Ok(BuildDescriptor::Generated {
        binary: meta.binary_name,
        content,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("source location {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("no Dockerfile or Cargo.toml in {0}")]
    Missing(PathBuf),

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid Cargo project")]
    Project(#[from] rollout_core::Error),
}
