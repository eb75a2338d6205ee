use std::path::PathBuf;
use std::time::Duration;

use rollout_core::{
    EndpointFormat, Error, RolloutConfig, SecretSourceKind, TagStrategy,
};
use tempfile::TempDir;

#[test]
fn load_returns_defaults_when_no_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = RolloutConfig::load(tmp.path()).unwrap();

    assert_eq!(config.service.region, "us-central1");
    assert!(config.service.name.is_none());
    assert!(config.service.project.is_none());
    assert_eq!(config.build.repository, "rollout");
    assert_eq!(config.build.tag_strategy, TagStrategy::Service);
    assert_eq!(config.build.base_image, "rust:1.84-bookworm");
    assert_eq!(config.build.runtime_image, "gcr.io/distroless/cc-debian12");
    assert!(config.build.extra_packages.is_empty());
    assert_eq!(config.cloud_run.memory, "512Mi");
    assert_eq!(config.cloud_run.cpu, 1);
    assert_eq!(config.cloud_run.min_instances, 0);
    assert_eq!(config.cloud_run.max_instances, 10);
    assert_eq!(config.cloud_run.concurrency, 80);
    assert_eq!(config.cloud_run.port, 8080);
    assert!(config.cloud_run.allow_unauthenticated);
    assert!(config.env.is_empty());
    assert_eq!(config.secrets.source, SecretSourceKind::SecretManager);
    assert!(config.secrets.names.is_empty());
    assert_eq!(config.endpoint.variable, "SERVICE_URL");
    assert_eq!(config.endpoint.format, EndpointFormat::Url);
    assert_eq!(config.timeouts.build, Duration::from_secs(1200));
    assert_eq!(config.timeouts.resolve, Duration::from_secs(60));
    assert_eq!(config.timeouts.deploy, Duration::from_secs(600));
    assert_eq!(config.timeouts.total, Duration::from_secs(2400));
    assert!(config.lease.dir.is_none());
    assert_eq!(config.lease.stale_after, Duration::from_secs(3600));
}

#[test]
fn load_parses_full_config() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[service]
project = "nomads-laws"
name = "law-bot"
region = "europe-west1"

[build]
repository = "bots"
tag_strategy = "commit"
base_image = "rust:1.82-slim"
runtime_image = "debian:bookworm-slim"
extra_packages = ["libssl-dev", "pkg-config"]
cargo_chef_version = "0.1.70"

[cloud_run]
memory = "1Gi"
cpu = 2
min_instances = 1
max_instances = 50
concurrency = 200
port = 3000
allow_unauthenticated = false

[env]
DEFAULT_LANGUAGE = "ru"
DEFAULT_COUNTRY = "georgia"
CHUNK_SIZE = "1000"

[secrets]
source = "env"
names = ["GOOGLE_API_KEY", "TELEGRAM_TOKEN", "VECTOR_SEARCH_ENDPOINT"]

[endpoint]
variable = "CLOUD_RUN_URL"
format = "host"

[timeouts]
build = "30m"
resolve = "45s"
deploy = "5m"
total = "1h"

[lease]
dir = "/var/lock/rollout"
stale_after = "2h"
"#;
    std::fs::write(tmp.path().join("rollout.toml"), toml).unwrap();

    let config = RolloutConfig::load(tmp.path()).unwrap();

    assert_eq!(config.service.project.as_deref(), Some("nomads-laws"));
    assert_eq!(config.service.name.as_deref(), Some("law-bot"));
    assert_eq!(config.service.region, "europe-west1");
    assert_eq!(config.build.repository, "bots");
    assert_eq!(config.build.tag_strategy, TagStrategy::Commit);
    assert_eq!(config.build.base_image, "rust:1.82-slim");
    assert_eq!(config.build.runtime_image, "debian:bookworm-slim");
    assert_eq!(
        config.build.extra_packages,
        vec!["libssl-dev", "pkg-config"]
    );
    assert_eq!(config.build.cargo_chef_version, "0.1.70");
    assert_eq!(config.cloud_run.memory, "1Gi");
    assert_eq!(config.cloud_run.cpu, 2);
    assert_eq!(config.cloud_run.min_instances, 1);
    assert_eq!(config.cloud_run.max_instances, 50);
    assert_eq!(config.cloud_run.concurrency, 200);
    assert_eq!(config.cloud_run.port, 3000);
    assert!(!config.cloud_run.allow_unauthenticated);
    assert_eq!(config.env.len(), 3);
    assert_eq!(config.env["DEFAULT_COUNTRY"], "georgia");
    assert_eq!(config.secrets.source, SecretSourceKind::Env);
    assert_eq!(
        config.secrets.names,
        vec!["GOOGLE_API_KEY", "TELEGRAM_TOKEN", "VECTOR_SEARCH_ENDPOINT"]
    );
    assert_eq!(config.endpoint.variable, "CLOUD_RUN_URL");
    assert_eq!(config.endpoint.format, EndpointFormat::Host);
    assert_eq!(config.timeouts.build, Duration::from_secs(1800));
    assert_eq!(config.timeouts.resolve, Duration::from_secs(45));
    assert_eq!(config.timeouts.deploy, Duration::from_secs(300));
    assert_eq!(config.timeouts.total, Duration::from_secs(3600));
    assert_eq!(config.lease.dir, Some(PathBuf::from("/var/lock/rollout")));
    assert_eq!(config.lease.stale_after, Duration::from_secs(7200));
}

#[test]
fn load_partial_config_fills_defaults() {
    let tmp = TempDir::new().unwrap();
    let toml = r#"
[service]
project = "partial-project"

[timeouts]
build = "5m"
"#;
    std::fs::write(tmp.path().join("rollout.toml"), toml).unwrap();

    let config = RolloutConfig::load(tmp.path()).unwrap();

    assert_eq!(config.service.project.as_deref(), Some("partial-project"));
    // Defaults preserved
    assert_eq!(config.service.region, "us-central1");
    assert_eq!(config.cloud_run.memory, "512Mi");
    assert_eq!(config.timeouts.build, Duration::from_secs(300));
    assert_eq!(config.timeouts.deploy, Duration::from_secs(600));
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("rollout.toml"), "not valid {{{{ toml").unwrap();

    let result = RolloutConfig::load(tmp.path());
    assert!(matches!(result, Err(Error::ConfigParse { .. })));

    let err = result.unwrap_err().to_string();
    assert!(err.contains("parse"));
}

#[test]
fn load_invalid_duration_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("rollout.toml"),
        "[timeouts]\nbuild = \"soon\"\n",
    )
    .unwrap();

    assert!(matches!(
        RolloutConfig::load(tmp.path()),
        Err(Error::ConfigParse { .. })
    ));
}

#[test]
fn load_unknown_secret_source_returns_parse_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("rollout.toml"),
        "[secrets]\nsource = \"vault\"\n",
    )
    .unwrap();

    assert!(RolloutConfig::load(tmp.path()).is_err());
}

#[test]
fn load_empty_config_returns_defaults() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("rollout.toml"), "").unwrap();

    let config = RolloutConfig::load(tmp.path()).unwrap();
    assert_eq!(config.service.region, "us-central1");
}

#[test]
fn load_file_requires_existing_path() {
    let tmp = TempDir::new().unwrap();
    let result = RolloutConfig::load_file(&tmp.path().join("missing.toml"));
    assert!(matches!(result, Err(Error::ConfigLoad { .. })));
}

// ── Identity Tests ──

#[test]
fn identity_uses_configured_name() {
    let mut config = RolloutConfig::default();
    config.service.project = Some("p".to_owned());
    config.service.name = Some("svc".to_owned());
    config.service.region = "r1".to_owned();

    let id = config.identity(Some("ignored")).unwrap();
    assert_eq!(id.project(), "p");
    assert_eq!(id.service(), "svc");
    assert_eq!(id.region(), "r1");
}

#[test]
fn identity_falls_back_to_default_name() {
    let mut config = RolloutConfig::default();
    config.service.project = Some("p".to_owned());

    let id = config.identity(Some("from-cargo")).unwrap();
    assert_eq!(id.service(), "from-cargo");
    assert_eq!(id.region(), "us-central1");
}

#[test]
fn identity_requires_project() {
    let config = RolloutConfig::default();
    assert!(matches!(
        config.identity(Some("svc")),
        Err(Error::MissingProject)
    ));
}

#[test]
fn identity_requires_some_name() {
    let mut config = RolloutConfig::default();
    config.service.project = Some("p".to_owned());
    assert!(matches!(
        config.identity(None),
        Err(Error::MissingServiceName)
    ));
}
