//! Identity of a deployed service, the image it runs, and its public endpoint.

use std::fmt;

/// Maximum Cloud Run service name length.
const MAX_SERVICE_NAME_LEN: usize = 49;

/// The key for every registry and platform operation: project, service, region.
///
/// Immutable once constructed. Use [`ServiceIdentity::new`] to validate the parts.
///
/// # Examples
///
/// ```
/// use rollout_core::ServiceIdentity;
///
/// let id = ServiceIdentity::new("p", "svc", "r1").unwrap();
/// assert_eq!(id.to_string(), "p/r1/svc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceIdentity {
    project: String,
    service: String,
    region: String,
}

impl ServiceIdentity {
    /// Validate and build an identity.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyIdentityPart`](crate::Error::EmptyIdentityPart) if any part is blank
    /// - [`Error::InvalidServiceName`](crate::Error::InvalidServiceName) if the service
    ///   name is not a valid Cloud Run service name
    pub fn new(
        project: impl Into<String>,
        service: impl Into<String>,
        region: impl Into<String>,
    ) -> crate::Result<Self> {
        let project = project.into();
        let service = service.into();
        let region = region.into();

        for (part, value) in [
            ("project", &project),
            ("service", &service),
            ("region", &region),
        ] {
            if value.trim().is_empty() {
                return Err(crate::Error::EmptyIdentityPart { part });
            }
        }

        if let Some(reason) = service_name_violation(&service) {
            return Err(crate::Error::InvalidServiceName {
                name: service,
                reason,
            });
        }

        Ok(Self {
            project,
            service,
            region,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Filesystem-safe key, used for lease file names.
    pub fn key(&self) -> String {
        format!("{}.{}.{}", self.project, self.region, self.service)
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.region, self.service)
    }
}

fn service_name_violation(name: &str) -> Option<&'static str> {
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Some("must be at most 49 characters");
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Some("must start with a lowercase letter");
    }
    if name.ends_with('-') {
        return Some("must not end with a hyphen");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Some("may only contain lowercase letters, digits, and hyphens");
    }
    None
}

/// A container image location in Artifact Registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, e.g. `us-central1-docker.pkg.dev`
    pub registry: String,
    /// Path inside the registry, e.g. `my-project/rollout/svc`
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Reference for `identity` inside the Artifact Registry repository `repo_name`.
    pub fn for_service(identity: &ServiceIdentity, repo_name: &str, tag: &str) -> Self {
        Self {
            registry: format!("{}-docker.pkg.dev", identity.region()),
            repository: format!(
                "{}/{}/{}",
                identity.project(),
                repo_name,
                identity.service()
            ),
            tag: tag.to_owned(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// Public address of a live service, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Full URL, e.g. `https://svc-abc123-uc.a.run.app`.
    pub fn url(&self) -> &str {
        &self.0
    }

    /// URL without scheme or trailing slash, e.g. `svc-abc123-uc.a.run.app`.
    pub fn host(&self) -> &str {
        let rest = self
            .0
            .split_once("://")
            .map_or(self.0.as_str(), |(_, rest)| rest);
        rest.trim_end_matches('/')
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
