//! Source bundling, build descriptor resolution, and Dockerfile generation.
//!
//! # Build stage
//!
//! ```text
//! rollout deploy
//!   1. Dirty check  ── git status --porcelain (skip with --allow-dirty)
//!   2. Descriptor   ── ./Dockerfile, or DockerfileGenerator::render() for Cargo packages
//!   3. Bundle       ── git ls-files → .rollout-bundle/
//!   4. Cloud Build  ── gcloud builds submit .rollout-bundle/ --tag <image>
//! ```
//!
//! The bundle mirrors the git repository state: tracked and untracked
//! (non-ignored) files are included, `.gitignore`d paths are not, and
//! `.rollout-bundle/`, `.rollout/`, `.git/` are always excluded.

pub mod bundle;
pub mod descriptor;
pub mod dockerfile;

pub use descriptor::{BuildDescriptor, DescriptorError};
pub use dockerfile::DockerfileGenerator;
