use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Service identity ──
    #[error("GCP project not set; set [service].project in rollout.toml or pass --project")]
    MissingProject,

    #[error("service name not set; set [service].name in rollout.toml or pass --service")]
    MissingServiceName,

    #[error("service identity {part} must not be empty")]
    EmptyIdentityPart { part: &'static str },

    #[error("invalid service name '{name}': {reason}")]
    InvalidServiceName { name: String, reason: &'static str },

    // ── Cargo.toml metadata ──
    #[error("failed to read {path}")]
    CargoTomlRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    CargoTomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no [package] section in {0}")]
    MissingPackageSection(PathBuf),

    #[error("no package name in {0}")]
    MissingPackageName(PathBuf),
}
