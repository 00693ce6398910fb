//! Package descriptor (package.json) access.

use super::lockfile::DependencyScope;
use crate::error::{LpmError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DESCRIPTOR_FILE: &str = "package.json";

const SCOPES: [DependencyScope; 4] = [
    DependencyScope::Dependencies,
    DependencyScope::DevDependencies,
    DependencyScope::PeerDependencies,
    DependencyScope::OptionalDependencies,
];

/// The parts of a package.json lpm cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Declared dependencies per section, as `name -> specifier`.
    pub dependencies: BTreeMap<DependencyScope, BTreeMap<String, String>>,
}

impl PackageDescriptor {
    /// Name and version, both required for publishing.
    pub fn identity(&self, dir: &Path) -> Result<(&str, &str)> {
        match (self.name.as_deref(), self.version.as_deref()) {
            (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
                Ok((name, version))
            }
            _ => Err(LpmError::InvalidDescriptor {
                path: dir.join(DESCRIPTOR_FILE),
                reason: "\"name\" and \"version\" are required".to_string(),
            }),
        }
    }

    /// Section that currently declares `name`, if any.
    #[must_use]
    pub fn scope_of(&self, name: &str) -> Option<DependencyScope> {
        self.dependencies
            .iter()
            .find(|(_, deps)| deps.contains_key(name))
            .map(|(scope, _)| *scope)
    }
}

/// Reads and rewrites a project's dependency declarations.
pub trait DescriptorStore: Send + Sync {
    fn read(&self, dir: &Path) -> Result<PackageDescriptor>;

    /// Declare `name` in `scope`, removing it from every other section.
    fn set_dependency(
        &self,
        dir: &Path,
        scope: DependencyScope,
        name: &str,
        specifier: &str,
    ) -> Result<()>;

    /// Drop `name` from every section. Returns whether it was declared.
    fn remove_dependency(&self, dir: &Path, name: &str) -> Result<bool>;
}

/// [`DescriptorStore`] over `package.json` files, preserving key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageJson;

impl PackageJson {
    fn load(dir: &Path) -> Result<(PathBuf, Map<String, Value>)> {
        let path = dir.join(DESCRIPTOR_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LpmError::not_found(
                    "package.json",
                    path.display().to_string(),
                ));
            }
            Err(e) => return Err(LpmError::io("read", &path)(e)),
        };

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            LpmError::InvalidDescriptor {
                path: path.clone(),
                reason: format!("invalid JSON: {e}"),
            }
        })?;
        match value {
            Value::Object(root) => Ok((path, root)),
            other => Err(LpmError::InvalidDescriptor {
                path,
                reason: format!("expected an object, got {}", json_type_name(&other)),
            }),
        }
    }

    fn store(path: &Path, root: Map<String, Value>) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&Value::Object(root))
            .map_err(LpmError::json("serialize", path))?;
        content.push('\n');
        lpm_util::fs::atomic_write(path, content.as_bytes()).map_err(LpmError::io("write", path))
    }
}

impl DescriptorStore for PackageJson {
    fn read(&self, dir: &Path) -> Result<PackageDescriptor> {
        let (path, root) = Self::load(dir)?;

        let mut descriptor = PackageDescriptor {
            name: root.get("name").and_then(Value::as_str).map(String::from),
            version: root.get("version").and_then(Value::as_str).map(String::from),
            dependencies: BTreeMap::new(),
        };

        for scope in SCOPES {
            let Some(section) = root.get(scope.as_str()) else {
                continue;
            };
            let Some(section) = section.as_object() else {
                return Err(LpmError::InvalidDescriptor {
                    path,
                    reason: format!(
                        "'{scope}' must be an object, got {}",
                        json_type_name(section)
                    ),
                });
            };
            let deps = section
                .iter()
                .filter_map(|(name, spec)| spec.as_str().map(|s| (name.clone(), s.to_string())))
                .collect();
            descriptor.dependencies.insert(scope, deps);
        }

        Ok(descriptor)
    }

    fn set_dependency(
        &self,
        dir: &Path,
        scope: DependencyScope,
        name: &str,
        specifier: &str,
    ) -> Result<()> {
        let (path, mut root) = Self::load(dir)?;

        for other in SCOPES.into_iter().filter(|s| *s != scope) {
            if let Some(Value::Object(section)) = root.get_mut(other.as_str()) {
                section.remove(name);
            }
        }

        let section = root
            .entry(scope.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(section) = section else {
            return Err(LpmError::InvalidDescriptor {
                path,
                reason: format!("'{scope}' must be an object"),
            });
        };
        section.insert(name.to_string(), Value::String(specifier.to_string()));

        Self::store(&path, root)
    }

    fn remove_dependency(&self, dir: &Path, name: &str) -> Result<bool> {
        let (path, mut root) = Self::load(dir)?;

        let mut removed = false;
        for scope in SCOPES {
            if let Some(Value::Object(section)) = root.get_mut(scope.as_str()) {
                removed |= section.remove(name).is_some();
            }
        }

        if removed {
            Self::store(&path, root)?;
        }
        Ok(removed)
    }
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
