//! Registry metadata for a resolved revision

use std::io::ErrorKind;
use std::path::Path;

use mirror_fs::ArchiveDigest;
use mirror_fs::constants::{ARCHIVE_EXTENSION, MANIFEST_FILE};

use crate::error::{Error, Result};
use crate::manifest::{Dist, Manifest, PackageDescriptor};
use crate::rewrite::DependencyRewriter;

/// Final adjustment applied to every descriptor before it is published,
/// e.g. to point `dist.tarball` at a different host.
pub trait LocationRewrite: Send + Sync {
    fn rewrite(&self, descriptor: PackageDescriptor) -> PackageDescriptor;
}

/// Publishes descriptors unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLocation;

impl LocationRewrite for KeepLocation {
    fn rewrite(&self, descriptor: PackageDescriptor) -> PackageDescriptor {
        descriptor
    }
}

impl<F> LocationRewrite for F
where
    F: Fn(PackageDescriptor) -> PackageDescriptor + Send + Sync,
{
    fn rewrite(&self, descriptor: PackageDescriptor) -> PackageDescriptor {
        self(descriptor)
    }
}

/// Everything a descriptor is computed from.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSource<'a> {
    /// Registry package name
    pub name: &'a str,
    pub resolved_revision: &'a str,
    pub commit: &'a str,
    pub working_copy: &'a Path,
    pub archive: &'a Path,
    /// Registry URL without trailing slash
    pub registry_base: &'a str,
}

/// `<registry>/<name>/-/<basename>-<revision>.tgz`, where `basename` is the
/// name without its scope.
pub fn tarball_url(registry_base: &str, name: &str, revision: &str) -> String {
    let basename = name.rsplit('/').next().unwrap_or(name);
    format!("{registry_base}/{name}/-/{basename}-{revision}.{ARCHIVE_EXTENSION}")
}

/// Build the descriptor for a checked-out revision whose archive exists.
///
/// # Errors
///
/// [`Error::Manifest`] for a bad `package.json`, [`Error::CacheIntegrity`]
/// when the archive is missing.
pub fn build_descriptor(
    input: &DescriptorSource<'_>,
    rewriter: &DependencyRewriter,
    location: &dyn LocationRewrite,
) -> Result<PackageDescriptor> {
    let manifest = Manifest::load(&input.working_copy.join(MANIFEST_FILE))?;
    let mut descriptor = manifest.into_descriptor()?;

    if descriptor.name != input.name {
        tracing::warn!(
            package = %input.name,
            manifest_name = %descriptor.name,
            "Manifest name differs from the mirrored name; publishing under the mirrored name"
        );
        descriptor.name = input.name.to_string();
    }

    descriptor.version = format!("{}-{}", descriptor.version, input.resolved_revision);

    let digest = match ArchiveDigest::of_file(input.archive) {
        Ok(digest) => digest,
        Err(mirror_fs::Error::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            return Err(Error::CacheIntegrity {
                path: input.archive.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    descriptor.dist = Some(Dist {
        tarball: tarball_url(input.registry_base, input.name, input.resolved_revision),
        shasum: digest.shasum,
        integrity: digest.integrity,
    });
    descriptor.id = Some(format!("{}-{}", descriptor.name, descriptor.version));
    descriptor.git_head = Some(input.commit.to_string());

    rewriter.rewrite(&mut descriptor.dependencies);

    Ok(location.rewrite(descriptor))
}
