use serde::Deserialize;
use std::path::Path;

/// Package metadata read from the source tree's Cargo.toml.
///
/// Supplies the default service name and the binary a generated
/// Dockerfile builds. Sources that ship their own Dockerfile need not be
/// Cargo projects at all, see [`ProjectMeta::discover`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMeta {
    pub name: String,
    pub version: String,
    pub binary_name: String,
}

#[derive(Deserialize)]
struct CargoToml {
    package: Option<PackageSection>,
    bin: Option<Vec<BinSection>>,
}

#[derive(Deserialize)]
struct PackageSection {
    name: Option<String>,
    version: Option<String>,
}

#[derive(Deserialize)]
struct BinSection {
    name: Option<String>,
}

impl ProjectMeta {
    /// Read metadata if `source_dir` is a Cargo package, `Ok(None)` otherwise.
    pub fn discover(source_dir: &Path) -> crate::Result<Option<Self>> {
        if !source_dir.join("Cargo.toml").is_file() {
            tracing::debug!(dir = %source_dir.display(), "no Cargo.toml in source tree");
            return Ok(None);
        }
        Self::from_cargo_toml(source_dir).map(Some)
    }

    /// Extract project metadata from a Cargo.toml file.
    pub fn from_cargo_toml(source_dir: &Path) -> crate::Result<Self> {
        let cargo_path = source_dir.join("Cargo.toml");
        let content =
            std::fs::read_to_string(&cargo_path).map_err(|e| crate::Error::CargoTomlRead {
                path: cargo_path.clone(),
                source: e,
            })?;
        Self::parse(&content, &cargo_path)
    }

    fn parse(content: &str, cargo_path: &Path) -> crate::Result<Self> {
        let parsed: CargoToml =
            toml::from_str(content).map_err(|e| crate::Error::CargoTomlParse {
                path: cargo_path.to_path_buf(),
                source: e,
            })?;

        let package = parsed
            .package
            .ok_or_else(|| crate::Error::MissingPackageSection(cargo_path.to_path_buf()))?;

        let name = package
            .name
            .ok_or_else(|| crate::Error::MissingPackageName(cargo_path.to_path_buf()))?;

        let version = package.version.unwrap_or_else(|| "0.1.0".to_owned());

        // First [[bin]] entry, or the package name
        let binary_name = parsed
            .bin
            .and_then(|bins| bins.into_iter().next())
            .and_then(|b| b.name)
            .unwrap_or_else(|| name.clone());

        Ok(Self {
            name,
            version,
            binary_name,
        })
    }
}
