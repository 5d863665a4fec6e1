//! Syncing streams and switching between them

use crate::common::{at, binary, files_on_disk, latest, text, Fixture};
use anyhow::Result;
use workspace::RepositoryConfig;

fn two_streams() -> Result<Fixture> {
    let fixture = Fixture::new()?;
    fixture
        .file("A", 100, "x.txt", b"hi")
        .file("A", 100, "bin/y.bin", b"\0yy")
        .file("B", 50, "x.txt", b"hi")
        .file("B", 50, "z.txt", b"new");
    Ok(fixture)
}

#[test]
fn test_first_sync_fetches_everything() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    let summary = repo.sync(&depot, &latest("A"))?;
    assert_eq!(summary.change, 100);
    assert_eq!(summary.added.synced, 2);
    assert_eq!(summary.added.synced_bytes, 5);
    assert_eq!(files_on_disk(&fixture.sync_dir()), vec!["bin/y.bin", "x.txt"]);
    assert_eq!(fixture.read("x.txt").unwrap(), b"hi");
    assert!(repo.cache().is_empty());
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_switching_streams_parks_content_in_cache() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("A"))?;

    let summary = repo.sync(&depot, &latest("B"))?;
    assert_eq!(summary.change, 50);
    assert_eq!(summary.removed.moved_to_cache, 1);
    assert_eq!(summary.removed.deleted, 0);
    assert_eq!(summary.removed.directories_deleted, 1);
    assert_eq!(summary.added.synced, 1);

    assert_eq!(files_on_disk(&fixture.sync_dir()), vec!["x.txt", "z.txt"]);
    assert!(repo.cache().contains(&binary(b"\0yy")));
    assert!(repo.workspace().file("x.txt").is_some());
    assert!(repo.workspace().file("bin/y.bin").is_none());

    // Going back pulls y out of the cache instead of the depot
    let summary = repo.sync(&depot, &latest("A"))?;
    assert_eq!(summary.added.moved_from_cache, 1);
    assert_eq!(summary.added.synced, 0);
    assert_eq!(fixture.read("bin/y.bin").unwrap(), b"\0yy");
    assert!(repo.cache().contains(&text(b"new")));
    assert!(!repo.cache().contains(&binary(b"\0yy")));
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_duplicate_content_is_copied_locally() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("S1", 1, "a.txt", b"same")
        .file("S2", 1, "a.txt", b"same")
        .file("S2", 1, "copy/a2.txt", b"same");
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    repo.sync(&depot, &latest("S1"))?;
    let summary = repo.sync(&depot, &latest("S2"))?;
    assert_eq!(summary.added.copied, 1);
    assert_eq!(summary.added.synced, 0);
    assert_eq!(fixture.read("copy/a2.txt").unwrap(), b"same");
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_identical_new_files_are_fetched_once() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("Main", 1, "a/same.txt", b"twin")
        .file("Main", 1, "b/same.txt", b"twin")
        .file("Main", 1, "c.txt", b"solo");
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    let summary = repo.sync(&depot, &latest("Main"))?;
    assert_eq!(summary.added.synced, 2);
    assert_eq!(summary.added.synced_bytes, 8);
    assert_eq!(summary.added.copied, 1);
    assert_eq!(fixture.read("a/same.txt").unwrap(), b"twin");
    assert_eq!(fixture.read("b/same.txt").unwrap(), b"twin");
    assert!(repo.status()?.differences.is_empty());
    assert!(!repo.requires_repair());
    Ok(())
}

#[test]
fn test_sync_to_older_change_and_deletions() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("Main", 10, "a.txt", b"one")
        .file("Main", 10, "bin/data.bin", b"\0\x01")
        .file("Main", 20, "a.txt", b"two")
        .deleted("Main", 20, "bin/data.bin");
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    repo.sync(&depot, &at("Main", 15))?;
    assert_eq!(fixture.read("a.txt").unwrap(), b"one");
    assert!(fixture.read("bin/data.bin").is_some());

    let summary = repo.sync(&depot, &at("Main", 20))?;
    assert_eq!(summary.removed.directories_deleted, 1);
    assert_eq!(fixture.read("a.txt").unwrap(), b"two");
    assert!(!fixture.sync_dir().join("bin").exists());
    assert_eq!(repo.cache().len(), 2);
    Ok(())
}

#[test]
fn test_unknown_change_fails_without_touching_workspace() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("A"))?;

    assert!(repo.sync(&depot, &at("A", 5)).is_err());
    assert!(repo.sync(&depot, &latest("Nope")).is_err());
    assert_eq!(repo.workspace().file_count(), 2);
    Ok(())
}

#[test]
fn test_filters_narrow_the_workspace() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    let mut options = latest("A");
    options.filters = vec!["-bin/...".to_owned()];
    repo.sync(&depot, &options)?;
    assert_eq!(files_on_disk(&fixture.sync_dir()), vec!["x.txt"]);

    options.filters = vec!["bin/...".to_owned()];
    repo.sync(&depot, &options)?;
    assert_eq!(files_on_disk(&fixture.sync_dir()), vec!["bin/y.bin"]);
    Ok(())
}

#[test]
fn test_fake_sync_writes_placeholders() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;

    let mut options = latest("A");
    options.fake = true;
    repo.sync(&depot, &options)?;

    assert_eq!(fixture.read("x.txt").unwrap(), b"");
    let staged = repo.workspace().file("x.txt").unwrap();
    assert!(staged.content_id.is_fake());
    assert_eq!(staged.length, 0);
    assert!(repo.status()?.differences.is_empty());

    // Real content never reuses fake placeholders
    let summary = repo.sync(&depot, &latest("A"))?;
    assert_eq!(summary.added.synced, 2);
    assert_eq!(fixture.read("x.txt").unwrap(), b"hi");
    Ok(())
}

#[test]
fn test_snapshot_cache_file_is_reused() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    let cache_file = fixture.base_dir.with_file_name("A.snapshot");

    let mut options = latest("A");
    options.cache_file = Some(cache_file.clone());
    repo.sync(&depot, &options)?;
    assert!(cache_file.exists());

    // A newer change appears, but the saved snapshot still describes change 100
    fixture
        .file("A", 200, "x.txt", b"hi")
        .file("A", 200, "bin/y.bin", b"\0yy")
        .file("A", 200, "extra.txt", b"later");
    repo.sync(&depot, &options)?;
    assert_eq!(repo.workspace().file_count(), 2);

    options.cache_file = None;
    repo.sync(&depot, &options)?;
    assert_eq!(repo.workspace().file_count(), 3);
    Ok(())
}

#[test]
fn test_small_batches_sync_every_file() -> Result<()> {
    let fixture = Fixture::new()?;
    for idx in 0..6 {
        fixture.file("Main", 1, &format!("dir{}/file{idx}.txt", idx % 2), format!("content {idx}").as_bytes());
    }
    let depot = fixture.depot();
    let mut config = RepositoryConfig::default();
    config.sync.batch_size_bytes = 1;
    config.sync.threads = 2;
    let mut repo = fixture.create_with(config)?;

    let summary = repo.sync(&depot, &latest("Main"))?;
    assert_eq!(summary.added.synced, 6);
    assert_eq!(files_on_disk(&fixture.sync_dir()).len(), 6);
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_sync_cleans_local_edits_first() -> Result<()> {
    let fixture = two_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("A"))?;

    std::fs::write(fixture.sync_dir().join("x.txt"), b"edited locally")?;
    std::fs::write(fixture.sync_dir().join("stray.txt"), b"?")?;

    let summary = repo.sync(&depot, &latest("A"))?;
    assert_eq!(summary.added.synced, 1);
    assert_eq!(fixture.read("x.txt").unwrap(), b"hi");
    assert!(fixture.read("stray.txt").is_none());
    Ok(())
}
