use std::fmt;

use secrecy::{ExposeSecret, SecretString};

const REDACTED: &str = "[REDACTED]";

/// An opaque secret value fetched from a secret provider.
///
/// Every formatting path (`Debug`, `Display`) prints `[REDACTED]`. The only
/// way to read the value is [`SecretValue::expose`], which the revision
/// deployer calls when handing the environment to the platform.
#[derive(Clone)]
pub struct SecretValue(SecretString);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// Named secrets handed to a pipeline run, in the order they were fetched.
#[derive(Debug, Clone, Default)]
pub struct Secrets(Vec<(String, SecretValue)>);

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret. A later insert with the same name replaces the earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: SecretValue) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, SecretValue)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (N, SecretValue)>>(iter: I) -> Self {
        let mut secrets = Self::new();
        for (name, value) in iter {
            secrets.insert(name, value);
        }
        secrets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let value = SecretValue::new("hunter2");
        assert_eq!(format!("{value}"), "[REDACTED]");
        assert_eq!(format!("{value:?}"), "[REDACTED]");
        assert_eq!(value.expose(), "hunter2");
    }

    #[test]
    fn secrets_debug_never_shows_values() {
        let secrets: Secrets = [("TOKEN", SecretValue::new("abc-123"))]
            .into_iter()
            .collect();
        let shown = format!("{secrets:?}");
        assert!(shown.contains("TOKEN"));
        assert!(!shown.contains("abc-123"), "got: {shown}");
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut secrets = Secrets::new();
        secrets.insert("A", SecretValue::new("1"));
        secrets.insert("B", SecretValue::new("2"));
        secrets.insert("A", SecretValue::new("3"));

        assert_eq!(secrets.len(), 2);
        let values: Vec<_> = secrets.iter().map(|(n, v)| (n, v.expose())).collect();
        assert_eq!(values, vec![("A", "3"), ("B", "2")]);
    }
}
