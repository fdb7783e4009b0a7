//! `package.json` handling
//!
//! [`Manifest`] keeps the raw JSON object so a rewritten manifest differs
//! from the committed one only in the constraints that were changed.
//! [`PackageDescriptor`] is the typed view published in the registry index.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::rewrite::DependencyRewriter;

/// Download location and digests of one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    pub tarball: String,
    pub shasum: String,
    pub integrity: String,
}

/// Registry metadata for one version of a package.
///
/// Fields not modelled here are carried through unchanged in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub dependencies: Map<String, Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "gitHead", default, skip_serializing_if = "Option::is_none")]
    pub git_head: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A parsed and validated `package.json`.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    raw: Map<String, Value>,
}

impl Manifest {
    /// Read and validate the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Manifest`] when the file is missing or is not a
    /// JSON object with a string `name`, a semver `version` and, if present,
    /// an object `dependencies`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::manifest(path, e.to_string()))?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| Error::manifest(path, e.to_string()))?;
        let Value::Object(raw) = value else {
            return Err(Error::manifest(path, "expected a JSON object"));
        };

        match raw.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => {}
            _ => return Err(Error::manifest(path, "missing or empty 'name'")),
        }
        match raw.get("version") {
            Some(Value::String(version)) => {
                semver::Version::parse(version).map_err(|e| {
                    Error::manifest(path, format!("invalid version '{version}': {e}"))
                })?;
            }
            _ => return Err(Error::manifest(path, "missing 'version'")),
        }
        match raw.get("dependencies") {
            None | Some(Value::Object(_)) => {}
            Some(_) => return Err(Error::manifest(path, "'dependencies' must be an object")),
        }

        Ok(Self {
            path: path.to_path_buf(),
            raw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `name` field.
    pub fn name(&self) -> &str {
        self.raw.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    /// The `version` field.
    pub fn version(&self) -> &str {
        self.raw
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Rewrite internal dependency constraints. Returns the rewritten names.
    pub fn rewrite_dependencies(&mut self, rewriter: &DependencyRewriter) -> Vec<String> {
        match self.raw.get_mut("dependencies") {
            Some(Value::Object(dependencies)) => rewriter.rewrite(dependencies),
            _ => Vec::new(),
        }
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&self.raw)
            .map_err(|e| Error::manifest(&self.path, e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Typed view of the manifest.
    ///
    /// Registry-owned fields a committed manifest may carry (`_id`,
    /// `gitHead`, `dist`) are dropped; the mirror fills them in itself.
    pub fn into_descriptor(self) -> Result<PackageDescriptor> {
        let mut raw = self.raw;
        for field in ["_id", "gitHead", "dist"] {
            raw.remove(field);
        }
        serde_json::from_value(Value::Object(raw))
            .map_err(|e| Error::manifest(&self.path, e.to_string()))
    }
}
