//! End-to-end tests of the mirror pipeline against local "remote" repositories

use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use flate2::read::GzDecoder;
use futures::TryStreamExt;
use mirror_core::{Error, Mirror, PackageDescriptor};
use mirror_meta::{MirrorOptions, RepositoryEntry, RepositoryTable};
use mirror_test_utils::{RemoteRepo, package_manifest};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn mirror_with(cache: &TempDir, entries: &[(&str, String, &str)]) -> Mirror {
    let mut table = RepositoryTable::new();
    for (name, remote, revision) in entries {
        table
            .insert(RepositoryEntry::new(*name, remote.clone(), revision.parse().unwrap()))
            .unwrap();
    }
    let mut options = MirrorOptions::with_cache_root(cache.path());
    options.registry_url = "http://registry.test/".to_string();
    Mirror::new(table, options).unwrap()
}

fn archive_entry(archive: &Path, wanted: &str) -> Option<Vec<u8>> {
    let file = fs::File::open(archive).unwrap();
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    for entry in tar.entries().unwrap() {
        let mut entry = entry.unwrap();
        if entry.path().unwrap().to_str() == Some(wanted) {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            return Some(content);
        }
    }
    None
}

fn archives_in(cache: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(cache.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tgz"))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_moving_reference_first_and_repeat_request() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);
    let archive = cache.path().join(format!("alpha-{}.tgz", remote.head()));
    assert!(!archive.exists());

    let first = mirror.resolve("alpha").await.unwrap();

    assert_eq!(first.resolved_revision, remote.head());
    assert_eq!(first.commit, remote.head());
    assert_eq!(first.descriptor.version, format!("1.0.0-{}", remote.head()));
    assert_eq!(first.archive, archive);
    assert!(archive.is_file());
    assert!(first.report.cloned);
    assert!(first.report.archived);
    assert!(!first.report.descriptor_reused);

    let second = mirror.resolve("alpha").await.unwrap();

    assert_eq!(second.resolved_revision, first.resolved_revision);
    assert_eq!(second.descriptor, first.descriptor);
    assert!(!second.report.cloned);
    assert!(second.report.probed);
    assert!(!second.report.fetched, "Unchanged remote should not be fetched");
    assert!(!second.report.archived);
    assert!(second.report.descriptor_reused);

    let stats = mirror.stats();
    assert_eq!(stats.pipeline_runs, 2);
    assert_eq!(stats.clones, 1);
    assert_eq!(stats.fetches, 0);
    assert_eq!(stats.archives_built, 1);
}

#[tokio::test]
async fn test_moving_reference_follows_new_commits() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let first = mirror.get_index("alpha").await.unwrap();
    let old_head = remote.head();

    remote.write_file("index.js", "module.exports = 43;\n");
    let new_head = remote.commit("Bump answer");

    let resolution = mirror.resolve("alpha").await.unwrap();

    assert_eq!(resolution.resolved_revision, new_head);
    assert!(resolution.report.fetched);
    assert!(resolution.report.archived);
    assert_eq!(resolution.descriptor.version, format!("1.0.0-{new_head}"));
    assert_ne!(resolution.descriptor.version, first.version);
    assert_eq!(
        archive_entry(&resolution.archive, "package/index.js").unwrap(),
        b"module.exports = 43;\n"
    );
    // Archives of earlier revisions stay where they are.
    let mut expected = vec![format!("alpha-{old_head}.tgz"), format!("alpha-{new_head}.tgz")];
    expected.sort();
    assert_eq!(archives_in(&cache), expected);
}

#[tokio::test]
async fn test_fixed_tag_is_a_pure_cache_hit_the_second_time() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    remote.tag("v1.0.0");
    let tagged = remote.head();
    remote.write_file("index.js", "module.exports = 0;\n");
    remote.commit("After the tag");

    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "v1.0.0")]);

    let first = mirror.resolve("alpha").await.unwrap();
    let archive_bytes = fs::read(&first.archive).unwrap();
    let second = mirror.resolve("alpha").await.unwrap();

    assert_eq!(first.resolved_revision, "v1.0.0");
    assert_eq!(first.commit, tagged);
    assert_eq!(first.descriptor.version, "1.0.0-v1.0.0");
    assert_eq!(first.archive, cache.path().join("alpha-v1.0.0.tgz"));
    assert_eq!(
        archive_entry(&first.archive, "package/index.js").unwrap(),
        b"module.exports = 42;\n"
    );

    assert_eq!(second.descriptor, first.descriptor);
    assert!(!second.report.probed);
    assert!(!second.report.fetched);
    assert!(!second.report.archived);
    assert!(second.report.descriptor_reused);
    assert_eq!(fs::read(&second.archive).unwrap(), archive_bytes);
    assert_eq!(mirror.stats().fetches, 0);
}

#[tokio::test]
async fn test_branch_with_slash_uses_placeholder() {
    let remote = RemoteRepo::new("alpha", "2.0.0", &[]);
    remote.create_branch("release/1.x");
    remote.write_file("index.js", "module.exports = 1;\n");
    let release_head = remote.commit("Release branch");
    remote.switch("main");

    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "release---1.x")]);

    let resolution = mirror.resolve("alpha").await.unwrap();

    assert_eq!(resolution.commit, release_head);
    assert_eq!(resolution.descriptor.version, "2.0.0-release---1.x");
    assert_eq!(resolution.working_copy, cache.path().join("alpha-release---1.x"));
    assert_eq!(resolution.archive, cache.path().join("alpha-release---1.x.tgz"));
    assert_eq!(
        resolution.descriptor.dist.unwrap().tarball,
        "http://registry.test/alpha/-/alpha-release---1.x.tgz"
    );
}

#[tokio::test]
async fn test_missing_fixed_reference_is_fetched_lazily() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "v2.0.0")]);

    let err = mirror.get_index("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Checkout { .. }), "got {err:?}");
    assert_eq!(err.stage(), "checkout");

    remote.tag("v2.0.0");
    let resolution = mirror.resolve("alpha").await.unwrap();

    assert!(!resolution.report.cloned);
    assert!(resolution.report.fetched);
    assert_eq!(resolution.commit, remote.head());
}

#[tokio::test]
async fn test_internal_dependencies_are_rewritten_everywhere() {
    let alpha = RemoteRepo::new("alpha", "1.0.0", &[]);
    let internal = format!("git+file://{}#main", alpha.url());
    let original = package_manifest(
        "beta",
        "0.3.0",
        &[("lodash", "^4.17.0"), ("alpha", internal.as_str())],
    );
    let beta = RemoteRepo::new(
        "beta",
        "0.3.0",
        &[("lodash", "^4.17.0"), ("alpha", internal.as_str())],
    );

    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(
        &cache,
        &[("alpha", alpha.url(), "HEAD"), ("beta", beta.url(), "HEAD")],
    );

    let resolution = mirror.resolve("beta").await.unwrap();

    let deps = &resolution.descriptor.dependencies;
    assert_eq!(deps["alpha"], "*");
    assert_eq!(deps["lodash"], "^4.17.0");

    let archived: serde_json::Value = serde_json::from_slice(
        &archive_entry(&resolution.archive, "package/package.json").unwrap(),
    )
    .unwrap();
    assert_eq!(archived["dependencies"]["alpha"], "*");
    assert_eq!(archived["dependencies"]["lodash"], "^4.17.0");
    assert_eq!(archived["version"], "0.3.0");

    // The working copy keeps the committed manifest.
    assert_eq!(
        fs::read_to_string(resolution.working_copy.join("package.json")).unwrap(),
        original
    );
}

#[tokio::test]
async fn test_full_index_wraps_the_single_version() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let doc = mirror.get_full_index("alpha").await.unwrap();

    let versions: Vec<&String> = doc.versions.keys().collect();
    assert_eq!(versions.len(), 1);
    assert_eq!(doc.latest(), Some(versions[0].as_str()));
    assert_eq!(doc.name, "alpha");
    assert_eq!(doc.id, "alpha");

    let descriptor: &PackageDescriptor = &doc.versions[versions[0]];
    let dist = descriptor.dist.as_ref().unwrap();
    assert_eq!(
        dist.tarball,
        format!("http://registry.test/alpha/-/alpha-{}.tgz", remote.head())
    );
    assert_eq!(dist.shasum.len(), 40);
    assert!(dist.integrity.starts_with("sha512-"));
    assert_eq!(descriptor.git_head.as_deref(), Some(remote.head().as_str()));
    assert_eq!(
        descriptor.id.as_deref(),
        Some(format!("alpha-1.0.0-{}", remote.head()).as_str())
    );
}

#[tokio::test]
async fn test_tarball_runs_pipeline_once_then_serves_cache() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let stream = mirror.get_tarball("alpha").await.unwrap();
    let streamed: Vec<u8> = stream.map_ok(|chunk| chunk.to_vec()).try_concat().await.unwrap();

    assert_eq!(mirror.stats().pipeline_runs, 1);
    let archive = cache.path().join(format!("alpha-{}.tgz", remote.head()));
    assert_eq!(streamed, fs::read(&archive).unwrap());

    let again: Vec<u8> = mirror
        .get_tarball("alpha")
        .await
        .unwrap()
        .map_ok(|chunk| chunk.to_vec())
        .try_concat()
        .await
        .unwrap();
    assert_eq!(again, streamed);
    assert_eq!(mirror.stats().pipeline_runs, 1);
}

#[tokio::test]
async fn test_fixed_tarball_is_served_without_pipeline_when_present() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    remote.tag("v1.0.0");
    let cache = TempDir::new().unwrap();

    // Another process already built the archive in the shared cache.
    let builder = mirror_with(&cache, &[("alpha", remote.url(), "v1.0.0")]);
    builder.get_index("alpha").await.unwrap();

    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "v1.0.0")]);
    let bytes: Vec<u8> = mirror
        .get_tarball("alpha")
        .await
        .unwrap()
        .map_ok(|chunk| chunk.to_vec())
        .try_concat()
        .await
        .unwrap();

    assert_eq!(mirror.stats().pipeline_runs, 0);
    assert_eq!(bytes, fs::read(cache.path().join("alpha-v1.0.0.tgz")).unwrap());
}

#[tokio::test]
async fn test_unknown_package_is_reported() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let err = mirror.get_index("missing-one").await.unwrap_err();
    assert!(matches!(err, Error::UnknownPackage { ref name } if name == "missing-one"));
    assert_eq!(err.stage(), "lookup");

    assert!(matches!(
        mirror.get_full_index("missing-one").await.unwrap_err(),
        Error::UnknownPackage { .. }
    ));
    assert!(matches!(
        mirror.get_tarball("missing-one").await.unwrap_err(),
        Error::UnknownPackage { .. }
    ));
    assert_eq!(mirror.stats().pipeline_runs, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_for_one_package_are_serialized() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let mirror = mirror.clone();
            tokio::spawn(async move { mirror.get_index("alpha").await })
        })
        .collect();

    let mut versions = Vec::new();
    for task in tasks {
        let descriptor = task.await.unwrap().unwrap();
        versions.push(descriptor.version);
    }

    let expected = format!("1.0.0-{}", remote.head());
    assert!(versions.iter().all(|v| *v == expected), "got {versions:?}");

    let stats = mirror.stats();
    assert_eq!(stats.pipeline_runs, 4);
    assert_eq!(stats.clones, 1);
    assert_eq!(stats.archives_built, 1);
    assert_eq!(archives_in(&cache).len(), 1);
}

#[tokio::test]
async fn test_malformed_manifest_aborts_before_archiving() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    remote.write_file("package.json", "{ \"name\": \"alpha\", ");
    remote.commit("Break the manifest");

    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let err = mirror.get_index("alpha").await.unwrap_err();

    assert!(matches!(err, Error::Manifest { .. }), "got {err:?}");
    assert!(archives_in(&cache).is_empty());
    let staging = cache.path().join(".staging");
    assert!(!staging.exists() || fs::read_dir(&staging).unwrap().next().is_none());
}

#[tokio::test]
async fn test_unreachable_remote_is_a_sync_error() {
    let missing = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let remote = missing.path().join("does-not-exist").display().to_string();
    let mirror = mirror_with(&cache, &[("alpha", remote, "HEAD")]);

    let err = mirror.get_index("alpha").await.unwrap_err();

    assert!(matches!(err, Error::Sync { .. }), "got {err:?}");
    assert_eq!(err.stage(), "sync");
    assert!(!cache.path().join("alpha-HEAD").exists());
}

#[tokio::test]
async fn test_configure_changes_published_locations() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);
    mirror.get_index("alpha").await.unwrap();

    let mut options = mirror.options();
    options.registry_url = "https://npm.example.com".to_string();
    mirror.configure(options).unwrap();

    let resolution = mirror.resolve("alpha").await.unwrap();
    assert!(!resolution.report.archived);
    assert!(!resolution.report.descriptor_reused);
    assert_eq!(
        resolution.descriptor.dist.unwrap().tarball,
        format!("https://npm.example.com/alpha/-/alpha-{}.tgz", remote.head())
    );
}

/// Mirror whose first descriptor build blocks until the test releases it.
fn mirror_paused_in_pipeline(
    cache: &TempDir,
    remote: &RemoteRepo,
) -> (Mirror, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let first = Arc::new(AtomicBool::new(true));
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let mirror = mirror_with(cache, &[("alpha", remote.url(), "HEAD")]).with_location_rewrite(
        move |descriptor: PackageDescriptor| {
            if first.swap(false, Ordering::SeqCst) {
                started_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
            descriptor
        },
    );
    (mirror, started_rx, release_tx)
}

#[tokio::test]
async fn test_configure_during_resolution_discards_its_results() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let (mirror, started, release) = mirror_paused_in_pipeline(&cache, &remote);

    let running = tokio::spawn({
        let mirror = mirror.clone();
        async move { mirror.get_index("alpha").await }
    });
    tokio::task::spawn_blocking(move || started.recv()).await.unwrap().unwrap();

    let mut options = mirror.options();
    options.registry_url = "http://new.test".to_string();
    mirror.configure(options).unwrap();
    release.send(()).unwrap();

    // The running request finishes with the settings it started with.
    let stale = running.await.unwrap().unwrap();
    assert!(stale.dist.unwrap().tarball.starts_with("http://registry.test/"));

    let resolution = mirror.resolve("alpha").await.unwrap();
    assert!(!resolution.report.descriptor_reused);
    assert_eq!(
        resolution.descriptor.dist.unwrap().tarball,
        format!("http://new.test/alpha/-/alpha-{}.tgz", remote.head())
    );

    let again = mirror.resolve("alpha").await.unwrap();
    assert!(again.report.descriptor_reused);
}

#[tokio::test]
async fn test_tarball_after_cache_move_during_resolution_uses_new_cache() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let moved = TempDir::new().unwrap();
    let (mirror, started, release) = mirror_paused_in_pipeline(&cache, &remote);

    let running = tokio::spawn({
        let mirror = mirror.clone();
        async move { mirror.resolve("alpha").await }
    });
    tokio::task::spawn_blocking(move || started.recv()).await.unwrap().unwrap();

    let mut options = mirror.options();
    options.cache_root = moved.path().to_path_buf();
    mirror.configure(options).unwrap();
    release.send(()).unwrap();

    let stale = running.await.unwrap().unwrap();
    assert!(stale.archive.starts_with(cache.path()));

    let bytes: Vec<u8> = mirror
        .get_tarball("alpha")
        .await
        .unwrap()
        .map_ok(|chunk| chunk.to_vec())
        .try_concat()
        .await
        .unwrap();

    assert_eq!(mirror.stats().pipeline_runs, 2);
    assert_eq!(archives_in(&moved), vec![format!("alpha-{}.tgz", remote.head())]);
    let archive = moved.path().join(format!("alpha-{}.tgz", remote.head()));
    assert_eq!(bytes, fs::read(&archive).unwrap());
}

#[tokio::test]
async fn test_configure_rejects_bad_host_pattern() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let mut options = mirror.options();
    options.internal_hosts = vec!["[unclosed".to_string()];

    let err = mirror.configure(options).unwrap_err();
    assert!(matches!(err, Error::InvalidPattern { .. }));
    assert_eq!(mirror.options().registry_url, "http://registry.test/");
}

#[tokio::test]
async fn test_location_rewrite_applies_to_descriptors() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]).with_location_rewrite(
        |mut descriptor: PackageDescriptor| {
            if let Some(dist) = descriptor.dist.as_mut() {
                dist.tarball = dist.tarball.replace("http://registry.test", "https://cdn.test");
            }
            descriptor
        },
    );

    let descriptor = mirror.get_index("alpha").await.unwrap();
    assert!(
        descriptor
            .dist
            .unwrap()
            .tarball
            .starts_with("https://cdn.test/alpha/-/alpha-")
    );
}

#[tokio::test]
async fn test_timed_out_pipeline_keeps_its_lock() {
    let remote = RemoteRepo::new("alpha", "1.0.0", &[]);
    let cache = TempDir::new().unwrap();
    let mirror = mirror_with(&cache, &[("alpha", remote.url(), "HEAD")]);

    let mut options = mirror.options();
    options.pipeline_timeout_secs = Some(0);
    mirror.configure(options.clone()).unwrap();

    let err = mirror.get_index("alpha").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { seconds: 0, .. }), "got {err:?}");

    options.pipeline_timeout_secs = None;
    mirror.configure(options).unwrap();

    // Waits for the abandoned run, then finds its clone and archive.
    let resolution = mirror.resolve("alpha").await.unwrap();
    assert!(!resolution.report.cloned);
    assert!(!resolution.report.archived);
    assert_eq!(mirror.stats().clones, 1);
}
