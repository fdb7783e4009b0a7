//! Registry index documents

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::manifest::PackageDescriptor;

/// Dist-tag every index document carries.
pub const LATEST_TAG: &str = "latest";

/// The document a registry returns for `GET /<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    pub versions: BTreeMap<String, PackageDescriptor>,
}

impl IndexDocument {
    /// Wrap a single descriptor, tagged as `latest`.
    pub fn single(descriptor: PackageDescriptor) -> Self {
        let version = descriptor.version.clone();
        Self {
            id: descriptor.name.clone(),
            name: descriptor.name.clone(),
            dist_tags: BTreeMap::from([(LATEST_TAG.to_string(), version.clone())]),
            versions: BTreeMap::from([(version, descriptor)]),
        }
    }

    /// Version the `latest` tag points at.
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get(LATEST_TAG).map(String::as_str)
    }
}
