//! The mirror facade
//!
//! [`Mirror`] answers the three registry requests (index, full index and
//! tarball) for every package in its table. Each request for a package runs
//! the pipeline below to completion before the next one for the same
//! package starts:
//!
//! ```text
//! resolve revision -> ensure archive -> build descriptor
//! ```
//!
//! Runs are serialized per package by an in-process async mutex and, across
//! processes sharing a cache root, by the package's lock file. Different
//! packages proceed in parallel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use mirror_fs::{CacheLayout, CacheLock};
use mirror_meta::{MirrorOptions, RepositoryEntry, RepositoryTable, RevisionSpec};
use tokio_util::io::ReaderStream;

use crate::archiver;
use crate::error::{Error, Result};
use crate::index::IndexDocument;
use crate::locks::PackageLocks;
use crate::manifest::PackageDescriptor;
use crate::metadata::{self, DescriptorSource, KeepLocation, LocationRewrite};
use crate::resolver;
use crate::rewrite::DependencyRewriter;

/// Byte stream of an archive file.
pub type ArchiveStream = ReaderStream<tokio::fs::File>;

/// Which pipeline stages did real work during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub cloned: bool,
    /// The remote was asked whether it changed
    pub probed: bool,
    pub fetched: bool,
    /// A new archive was written
    pub archived: bool,
    /// The descriptor came from the memo
    pub descriptor_reused: bool,
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub name: String,
    /// The fixed spec literal, or the commit id for the moving reference
    pub resolved_revision: String,
    /// Full id of the checked-out commit
    pub commit: String,
    pub working_copy: PathBuf,
    pub archive: PathBuf,
    pub descriptor: PackageDescriptor,
    pub report: PipelineReport,
}

/// Counters since the mirror was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub pipeline_runs: u64,
    pub clones: u64,
    pub fetches: u64,
    pub archives_built: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pipeline_runs: AtomicU64,
    clones: AtomicU64,
    fetches: AtomicU64,
    archives_built: AtomicU64,
}

impl Counters {
    fn record(&self, report: &PipelineReport) {
        if report.cloned {
            self.clones.fetch_add(1, Ordering::Relaxed);
        }
        if report.fetched {
            self.fetches.fetch_add(1, Ordering::Relaxed);
        }
        if report.archived {
            self.archives_built.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> MirrorStats {
        MirrorStats {
            pipeline_runs: self.pipeline_runs.load(Ordering::Relaxed),
            clones: self.clones.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            archives_built: self.archives_built.load(Ordering::Relaxed),
        }
    }
}

/// Settings one request runs with from start to finish.
struct Settings {
    /// Bumped on every replacement; cached results carry the generation
    /// they were produced under.
    generation: u64,
    options: MirrorOptions,
    layout: CacheLayout,
    rewriter: DependencyRewriter,
    location: Arc<dyn LocationRewrite>,
}

impl Settings {
    fn new(
        table: &RepositoryTable,
        options: MirrorOptions,
        location: Arc<dyn LocationRewrite>,
    ) -> Result<Self> {
        Ok(Self {
            generation: 0,
            layout: CacheLayout::new(&options.cache_root),
            rewriter: DependencyRewriter::new(table, &options.internal_hosts)?,
            options,
            location,
        })
    }
}

/// `(generation, name, resolved revision)`
type DescriptorKey = (u64, String, String);

struct Inner {
    table: RepositoryTable,
    settings: RwLock<Arc<Settings>>,
    locks: PackageLocks,
    descriptors: Mutex<HashMap<DescriptorKey, PackageDescriptor>>,
    last_archives: Mutex<HashMap<String, (u64, PathBuf)>>,
    counters: Counters,
}

/// Serves npm registry documents and tarballs from git repositories.
///
/// Cheap to clone; clones share the cache, locks and counters.
#[derive(Clone)]
pub struct Mirror {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("packages", &self.inner.table.len())
            .field("cache_root", &self.settings().options.cache_root)
            .finish_non_exhaustive()
    }
}

impl Mirror {
    /// Create a mirror for `table`.
    ///
    /// # Errors
    ///
    /// Fails when an internal host pattern is not a valid regex.
    pub fn new(table: RepositoryTable, options: MirrorOptions) -> Result<Self> {
        let settings = Settings::new(&table, options, Arc::new(KeepLocation))?;
        tracing::debug!(
            packages = table.len(),
            cache_root = %settings.options.cache_root.display(),
            "Mirror created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                table,
                settings: RwLock::new(Arc::new(settings)),
                locks: PackageLocks::new(),
                descriptors: Mutex::new(HashMap::new()),
                last_archives: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        })
    }

    /// Replace the options. Requests already running finish with the old ones.
    pub fn configure(&self, options: MirrorOptions) -> Result<()> {
        let location = Arc::clone(&self.settings().location);
        let settings = Settings::new(&self.inner.table, options, location)?;
        tracing::info!(
            cache_root = %settings.options.cache_root.display(),
            registry_url = %settings.options.registry_url,
            "Mirror reconfigured"
        );
        self.replace_settings(settings);
        Ok(())
    }

    /// Apply `transform` to every descriptor published from now on.
    pub fn with_location_rewrite(self, transform: impl LocationRewrite + 'static) -> Self {
        let current = self.settings();
        let settings = Settings {
            generation: current.generation,
            options: current.options.clone(),
            layout: current.layout.clone(),
            rewriter: current.rewriter.clone(),
            location: Arc::new(transform),
        };
        self.replace_settings(settings);
        self
    }

    /// The repository table.
    pub fn table(&self) -> &RepositoryTable {
        &self.inner.table
    }

    /// Current options.
    pub fn options(&self) -> MirrorOptions {
        self.settings().options.clone()
    }

    pub fn stats(&self) -> MirrorStats {
        self.inner.counters.snapshot()
    }

    /// Run the pipeline for `name` and return everything it produced.
    pub async fn resolve(&self, name: &str) -> Result<Resolution> {
        let entry = self.entry(name)?.clone();
        let settings = self.settings();
        let guard = self.inner.locks.lock(name).await;

        let inner = Arc::clone(&self.inner);
        let worker_settings = Arc::clone(&settings);
        let task = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let span = tracing::info_span!("pipeline", package = %entry.name);
            let _enter = span.enter();
            inner.run_pipeline(&entry, &worker_settings)
        });

        match settings.options.pipeline_timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined?,
                Err(_) => {
                    tracing::warn!(package = %name, "Pipeline timed out; it keeps its locks until it finishes");
                    Err(Error::Timeout {
                        name: name.to_string(),
                        seconds: limit.as_secs(),
                    })
                }
            },
            None => task.await?,
        }
    }

    /// Descriptor of the current revision of `name`.
    pub async fn get_index(&self, name: &str) -> Result<PackageDescriptor> {
        Ok(self.resolve(name).await?.descriptor)
    }

    /// Registry index document of `name`, with its single current version.
    pub async fn get_full_index(&self, name: &str) -> Result<IndexDocument> {
        Ok(IndexDocument::single(self.get_index(name).await?))
    }

    /// Stream the archive of `name`.
    ///
    /// An archive left by an earlier resolution is served as is; only when
    /// there is none does the pipeline run, once.
    pub async fn get_tarball(&self, name: &str) -> Result<ArchiveStream> {
        let entry = self.entry(name)?;
        let settings = self.settings();
        let known = match &entry.revision {
            RevisionSpec::Fixed(spec) => Some(settings.layout.archive_path(name, spec)?),
            RevisionSpec::Moving => self
                .inner
                .last_archives
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(name)
                .filter(|(generation, _)| *generation == settings.generation)
                .map(|(_, path)| path.clone()),
        };

        let path = match known.filter(|path| path.is_file()) {
            Some(path) => {
                tracing::debug!(package = %name, path = %path.display(), "Serving cached archive");
                path
            }
            None => {
                let resolution = self.resolve(name).await?;
                if !resolution.archive.is_file() {
                    return Err(Error::CacheIntegrity {
                        path: resolution.archive,
                    });
                }
                resolution.archive
            }
        };

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CacheIntegrity { path: path.clone() }
            } else {
                mirror_fs::Error::io(&path, e).into()
            }
        })?;
        Ok(ReaderStream::new(file))
    }

    fn entry(&self, name: &str) -> Result<&RepositoryEntry> {
        self.inner.table.get(name).ok_or_else(|| Error::UnknownPackage {
            name: name.to_string(),
        })
    }

    fn settings(&self) -> Arc<Settings> {
        Arc::clone(
            &self
                .inner
                .settings
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn replace_settings(&self, mut settings: Settings) {
        let generation = {
            let mut current = self
                .inner
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            settings.generation = current.generation + 1;
            let generation = settings.generation;
            *current = Arc::new(settings);
            generation
        };
        // Pipelines still running under an older generation may insert after
        // this; lookups never match them and the next replacement drops them.
        self.inner
            .descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(entry_generation, _, _), _| *entry_generation == generation);
        self.inner
            .last_archives
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, (entry_generation, _)| *entry_generation == generation);
    }
}

impl Inner {
    /// The whole pipeline for one entry. Blocking; runs under the package's
    /// in-process lock.
    fn run_pipeline(&self, entry: &RepositoryEntry, settings: &Settings) -> Result<Resolution> {
        self.counters.pipeline_runs.fetch_add(1, Ordering::Relaxed);
        let layout = &settings.layout;
        let _lock = CacheLock::acquire(&layout.lock_path(&entry.name)?)?;

        let checkout = resolver::resolve(entry, layout)?;
        let archive = layout.archive_path(&entry.name, &checkout.resolved_revision)?;
        let archived = archiver::ensure_archive(&checkout, &archive, layout, &settings.rewriter)?;

        let commit = checkout.commit.to_string();
        let key = (
            settings.generation,
            entry.name.clone(),
            checkout.resolved_revision.clone(),
        );
        let memoized = if archived {
            None
        } else {
            self.descriptors
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&key)
                .cloned()
        };
        let descriptor_reused = memoized.is_some();
        let descriptor = match memoized {
            Some(descriptor) => {
                tracing::debug!(revision = %checkout.resolved_revision, "Reusing descriptor");
                descriptor
            }
            None => {
                let input = DescriptorSource {
                    name: &entry.name,
                    resolved_revision: &checkout.resolved_revision,
                    commit: &commit,
                    working_copy: checkout.working_copy.path(),
                    archive: &archive,
                    registry_base: settings.options.registry_base(),
                };
                let descriptor =
                    metadata::build_descriptor(&input, &settings.rewriter, settings.location.as_ref())?;
                self.descriptors
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, descriptor.clone());
                descriptor
            }
        };

        {
            let mut last_archives = self
                .last_archives
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let newer = last_archives
                .get(&entry.name)
                .is_some_and(|(generation, _)| *generation > settings.generation);
            if !newer {
                last_archives.insert(entry.name.clone(), (settings.generation, archive.clone()));
            }
        }

        let report = PipelineReport {
            cloned: checkout.cloned,
            probed: checkout.probed,
            fetched: checkout.fetched,
            archived,
            descriptor_reused,
        };
        self.counters.record(&report);
        tracing::debug!(?report, version = %descriptor.version, "Pipeline finished");

        Ok(Resolution {
            name: entry.name.clone(),
            resolved_revision: checkout.resolved_revision,
            commit,
            working_copy: checkout.working_copy.path().to_path_buf(),
            archive,
            descriptor,
            report,
        })
    }
}
