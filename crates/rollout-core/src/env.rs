//! Configuration assembly: static defaults, secrets, and the self-referential
//! endpoint merged into the flat environment of a new revision.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Endpoint;
use crate::secret::{SecretValue, Secrets};

const REDACTED: &str = "[REDACTED]";

/// Where an environment entry came from. Later sources override earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueSource {
    Static,
    Secret,
    Endpoint,
}

#[derive(Clone)]
pub enum ConfigValue {
    Plain(String),
    Secret(SecretValue),
}

impl ConfigValue {
    /// The raw value, as handed to the platform.
    pub fn expose(&self) -> &str {
        match self {
            Self::Plain(v) => v,
            Self::Secret(v) => v.expose(),
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(v) => f.debug_tuple("Plain").field(v).finish(),
            Self::Secret(v) => f.debug_tuple("Secret").field(v).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub value: ConfigValue,
    pub source: ValueSource,
}

/// How the resolved endpoint is exposed to the new revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointBinding {
    /// Environment variable carrying the service's own address
    #[serde(default = "default_endpoint_variable")]
    pub variable: String,
    #[serde(default)]
    pub format: EndpointFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFormat {
    /// `https://svc-abc123-uc.a.run.app`
    #[default]
    Url,
    /// `svc-abc123-uc.a.run.app`
    Host,
}

impl Default for EndpointBinding {
    fn default() -> Self {
        Self {
            variable: default_endpoint_variable(),
            format: EndpointFormat::default(),
        }
    }
}

impl EndpointBinding {
    fn render(&self, endpoint: &Endpoint) -> String {
        match self.format {
            EndpointFormat::Url => endpoint.url().to_owned(),
            EndpointFormat::Host => endpoint.host().to_owned(),
        }
    }
}

fn default_endpoint_variable() -> String {
    "SERVICE_URL".to_owned()
}

/// Flat environment for one revision. Names are unique; the last writer wins.
///
/// Built fresh by [`assemble`] on every run and never persisted. `Debug`
/// output redacts secret-sourced values.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationSet {
    entries: BTreeMap<String, ConfigEntry>,
}

impl ConfigurationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a variable.
    pub fn set(&mut self, name: impl Into<String>, value: ConfigValue, source: ValueSource) {
        self.entries
            .insert(name.into(), ConfigEntry { value, source });
    }

    pub fn get(&self, name: &str) -> Option<&ConfigEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Name → raw value pairs, for handing to the platform only.
    pub fn exposed(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .map(|(k, e)| (k.as_str(), e.value.expose()))
            .collect()
    }

    /// Replace every secret value occurring in `text` with `[REDACTED]`.
    ///
    /// Platform error output may echo configuration back; run it through
    /// here before it reaches an error message.
    ///
    /// Longer values go first, so a secret that contains another is never
    /// left partly visible.
    pub fn scrub(&self, text: &str) -> String {
        let mut secrets: Vec<&str> = self
            .entries
            .values()
            .filter_map(|entry| match &entry.value {
                ConfigValue::Secret(secret) => Some(secret.expose()),
                ConfigValue::Plain(_) => None,
            })
            .filter(|value| !value.is_empty())
            .collect();
        secrets.sort_by_key(|value| std::cmp::Reverse(value.len()));

        secrets
            .into_iter()
            .fold(text.to_owned(), |scrubbed, secret| scrubbed.replace(secret, REDACTED))
    }
}

/// Merge the three configuration sources for a new revision.
///
/// Order: `static_defaults`, then `secrets`, then the endpoint variable. When
/// `endpoint` is `None` (first deploy) the variable is left out entirely.
pub fn assemble(
    static_defaults: &BTreeMap<String, String>,
    secrets: &Secrets,
    endpoint: Option<&Endpoint>,
    binding: &EndpointBinding,
) -> ConfigurationSet {
    let mut config = ConfigurationSet::new();

    for (name, value) in static_defaults {
        config.set(name, ConfigValue::Plain(value.clone()), ValueSource::Static);
    }
    for (name, value) in secrets.iter() {
        config.set(name, ConfigValue::Secret(value.clone()), ValueSource::Secret);
    }
    if let Some(endpoint) = endpoint {
        config.set(
            &binding.variable,
            ConfigValue::Plain(binding.render(endpoint)),
            ValueSource::Endpoint,
        );
    }

    tracing::debug!(
        variables = ?config.names().collect::<Vec<_>>(),
        endpoint_bound = endpoint.is_some(),
        "configuration assembled"
    );

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn secrets(pairs: &[(&str, &str)]) -> Secrets {
        pairs
            .iter()
            .map(|(k, v)| (*k, SecretValue::new(*v)))
            .collect()
    }

    #[test]
    fn first_deploy_omits_endpoint_variable() {
        let config = assemble(
            &defaults(&[("DEFAULT_LANGUAGE", "ru")]),
            &secrets(&[("TELEGRAM_TOKEN", "t0k")]),
            None,
            &EndpointBinding::default(),
        );

        assert_eq!(config.len(), 2);
        assert!(!config.contains("SERVICE_URL"));
    }

    #[test]
    fn secret_overrides_static_default() {
        let config = assemble(
            &defaults(&[("API_KEY", "placeholder")]),
            &secrets(&[("API_KEY", "real")]),
            None,
            &EndpointBinding::default(),
        );

        let entry = config.get("API_KEY").unwrap();
        assert_eq!(entry.value.expose(), "real");
        assert_eq!(entry.source, ValueSource::Secret);
        assert!(entry.value.is_secret());
    }

    #[test]
    fn endpoint_overrides_secret_and_static() {
        let endpoint = Endpoint::new("https://svc-abc-uc.a.run.app");
        let config = assemble(
            &defaults(&[("SERVICE_URL", "static")]),
            &secrets(&[("SERVICE_URL", "secret")]),
            Some(&endpoint),
            &EndpointBinding::default(),
        );

        let entry = config.get("SERVICE_URL").unwrap();
        assert_eq!(entry.value.expose(), "https://svc-abc-uc.a.run.app");
        assert_eq!(entry.source, ValueSource::Endpoint);
    }

    #[test]
    fn host_format_strips_scheme() {
        let endpoint = Endpoint::new("https://svc-abc-uc.a.run.app");
        let binding = EndpointBinding {
            variable: "CLOUD_RUN_URL".to_owned(),
            format: EndpointFormat::Host,
        };
        let config = assemble(&BTreeMap::new(), &Secrets::new(), Some(&endpoint), &binding);

        assert_eq!(
            config.get("CLOUD_RUN_URL").unwrap().value.expose(),
            "svc-abc-uc.a.run.app"
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = assemble(
            &defaults(&[("MODE", "prod")]),
            &secrets(&[("TOKEN", "s3cr3t-value")]),
            None,
            &EndpointBinding::default(),
        );

        let shown = format!("{config:?}");
        assert!(shown.contains("prod"));
        assert!(!shown.contains("s3cr3t-value"), "got: {shown}");
    }

    #[test]
    fn scrub_removes_secret_values_only() {
        let config = assemble(
            &defaults(&[("MODE", "prod")]),
            &secrets(&[("TOKEN", "s3cr3t-value")]),
            None,
            &EndpointBinding::default(),
        );

        let scrubbed = config.scrub("invalid value 's3cr3t-value' for TOKEN in prod");
        assert_eq!(scrubbed, "invalid value '[REDACTED]' for TOKEN in prod");
    }

    #[test]
    fn scrub_hides_secrets_that_contain_other_secrets() {
        let config = assemble(
            &BTreeMap::new(),
            &secrets(&[("A_TOKEN", "tok"), ("B_TOKEN", "tok-extra-9")]),
            None,
            &EndpointBinding::default(),
        );

        let scrubbed = config.scrub("bad value tok-extra-9, then tok");
        assert_eq!(scrubbed, "bad value [REDACTED], then [REDACTED]");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn names() -> impl Strategy<Value = Vec<String>> {
            proptest::collection::hash_set("[A-Z][A-Z_]{0,8}", 0..8)
                .prop_map(|s| s.into_iter().collect())
        }

        proptest! {
            #[test]
            fn every_key_present_exactly_once_with_override_order(
                static_names in names(),
                secret_names in names(),
                with_endpoint in any::<bool>(),
            ) {
                let statics: BTreeMap<String, String> = static_names
                    .iter()
                    .map(|n| (n.clone(), "static".to_owned()))
                    .collect();
                let secret_set: Secrets = secret_names
                    .iter()
                    .map(|n| (n.clone(), SecretValue::new("secret")))
                    .collect();
                let endpoint = Endpoint::new("https://svc.run.app");
                let binding = EndpointBinding::default();

                let config = assemble(
                    &statics,
                    &secret_set,
                    with_endpoint.then_some(&endpoint),
                    &binding,
                );

                let names: Vec<&str> = config.names().collect();
                let mut deduped = names.clone();
                deduped.dedup();
                prop_assert_eq!(&names, &deduped);

                for name in &static_names {
                    prop_assert!(config.contains(name));
                }
                for name in &secret_names {
                    let entry = config.get(name).unwrap();
                    if !(with_endpoint && *name == binding.variable) {
                        prop_assert_eq!(entry.source, ValueSource::Secret);
                    }
                }
                for name in static_names.iter().filter(|n| !secret_names.contains(n)) {
                    if !(with_endpoint && **name == binding.variable) {
                        prop_assert_eq!(config.get(name).unwrap().source, ValueSource::Static);
                    }
                }
                prop_assert_eq!(config.contains(&binding.variable), with_endpoint
                    || static_names.contains(&binding.variable)
                    || secret_names.contains(&binding.variable));
            }
        }
    }
}
