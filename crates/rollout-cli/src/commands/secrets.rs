use std::collections::BTreeMap;
use std::env::VarError;
use std::path::Path;

use rollout_cloud::SecretManager;
use rollout_core::{
    SecretError, SecretProvider, SecretSourceKind, SecretValue, Secrets, SecretsConfig,
};

/// Read every configured secret from the configured source.
pub(crate) async fn fetch(
    config: &SecretsConfig,
    project: &str,
    source_dir: &Path,
) -> Result<Secrets, SecretError> {
    if config.names.is_empty() {
        return Ok(Secrets::new());
    }
    match config.source {
        SecretSourceKind::SecretManager => SecretManager::new(project).fetch(&config.names).await,
        SecretSourceKind::Env => EnvSecrets::load(source_dir)?.fetch(&config.names).await,
    }
}

/// Secrets from the process environment, falling back to `.env` in the
/// source tree. Variables already set win over the file.
pub(crate) struct EnvSecrets {
    file: BTreeMap<String, String>,
}

impl EnvSecrets {
    pub(crate) fn load(source_dir: &Path) -> Result<Self, SecretError> {
        let path = source_dir.join(".env");
        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            Err(e) if e.not_found() => {
                return Ok(Self {
                    file: BTreeMap::new(),
                });
            }
            Err(e) => {
                return Err(SecretError::Provider {
                    detail: format!("failed to read {}: {e}", path.display()),
                });
            }
        };

        let mut file = BTreeMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| SecretError::Provider {
                detail: format!("failed to parse {}: {e}", path.display()),
            })?;
            file.insert(key, value);
        }
        tracing::debug!(path = %path.display(), entries = file.len(), ".env loaded");
        Ok(Self { file })
    }
}

impl SecretProvider for EnvSecrets {
    async fn fetch(&self, names: &[String]) -> Result<Secrets, SecretError> {
        let mut secrets = Secrets::new();
        for name in names {
            let value = match std::env::var(name) {
                Ok(value) => value,
                Err(VarError::NotPresent) => {
                    self.file
                        .get(name)
                        .cloned()
                        .ok_or_else(|| SecretError::Missing {
                            name: name.clone(),
                            detail: "not set in the environment or .env".to_owned(),
                        })?
                }
                Err(VarError::NotUnicode(_)) => {
                    return Err(SecretError::Missing {
                        name: name.clone(),
                        detail: "value is not valid unicode".to_owned(),
                    });
                }
            };
            secrets.insert(name, SecretValue::new(value));
        }
        Ok(secrets)
    }
}
