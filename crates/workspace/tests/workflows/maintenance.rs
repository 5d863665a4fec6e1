//! Clean, clear, purge, repair, populate, stats and status

use crate::common::{binary, files_on_disk, latest, text, Fixture};
use anyhow::Result;
use std::fs;
use workspace::Difference;

/// Three streams of one file each plus an empty stream, so syncing them in
/// order leaves the cache with entries of ascending age
fn aging_streams() -> Result<Fixture> {
    let fixture = Fixture::new()?;
    fixture
        .file("S1", 1, "a.dat", &[b'a'; 10])
        .file("S2", 1, "b.dat", &[b'b'; 20])
        .file("S3", 1, "c.dat", &[b'c'; 30])
        .empty("Empty", 1);
    Ok(fixture)
}

#[test]
fn test_purge_evicts_oldest_first() -> Result<()> {
    let fixture = aging_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    for stream in ["S1", "S2", "S3", "Empty"] {
        repo.sync(&depot, &latest(stream))?;
    }
    assert_eq!(repo.cache().len(), 3);
    assert_eq!(repo.cache().total_size(), 60);
    let oldest = repo.cache().get(&text(&[b'a'; 10])).unwrap().clone();
    let newest = repo.cache().get(&text(&[b'c'; 30])).unwrap().clone();
    assert!(oldest.sequence_number < newest.sequence_number);

    let plan = repo.purge(35)?;
    assert_eq!(plan.evict, vec![text(&[b'a'; 10]), text(&[b'b'; 20])]);
    assert_eq!(plan.remaining_bytes, 30);
    assert_eq!(repo.cache().len(), 1);
    assert!(!oldest.path(&repo.paths().cache_dir).exists());
    assert!(newest.path(&repo.paths().cache_dir).exists());

    repo.purge(0)?;
    assert!(repo.cache().is_empty());
    assert!(files_on_disk(&repo.paths().cache_dir).is_empty());

    // The purge is durable
    drop(repo);
    assert!(fixture.load()?.cache().is_empty());
    Ok(())
}

#[test]
fn test_clear_keeps_content_in_cache() -> Result<()> {
    let fixture = aging_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("S3"))?;

    repo.clear()?;
    assert!(repo.workspace().is_empty());
    assert!(files_on_disk(&fixture.sync_dir()).is_empty());
    assert!(repo.cache().contains(&text(&[b'c'; 30])));

    let summary = repo.sync(&depot, &latest("S3"))?;
    assert_eq!(summary.added.moved_from_cache, 1);
    Ok(())
}

#[test]
fn test_repair_drops_damaged_cache_entries() -> Result<()> {
    let fixture = aging_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    for stream in ["S1", "S2", "Empty"] {
        repo.sync(&depot, &latest(stream))?;
    }
    let cache_dir = repo.paths().cache_dir.clone();
    let a = repo.cache().get(&text(&[b'a'; 10])).unwrap().clone();
    let b = repo.cache().get(&text(&[b'b'; 20])).unwrap().clone();

    fs::remove_file(a.path(&cache_dir))?;
    fs::write(b.path(&cache_dir), b"truncated")?;

    assert_eq!(repo.repair()?, 2);
    assert!(repo.cache().is_empty());
    assert!(!repo.requires_repair());
    assert!(!b.path(&cache_dir).exists());

    // With nothing cached the content comes from the depot again
    let summary = repo.sync(&depot, &latest("S1"))?;
    assert_eq!(summary.added.synced, 1);
    Ok(())
}

#[test]
fn test_populate_fills_cache_for_every_stream() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("A", 100, "x.txt", b"hi")
        .file("A", 100, "y.bin", b"\0yy")
        .file("B", 50, "x.txt", b"hi")
        .file("B", 50, "z.txt", b"new")
        .file("Old", 1, "w.txt", b"old");
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("Old"))?;

    let streams = vec!["A".to_owned(), "B".to_owned()];
    let summary = repo.populate(&depot, &streams, &[], false)?;
    assert_eq!(summary.total_bytes, 8);
    assert_eq!(summary.difference_bytes, 6);
    assert_eq!(summary.evicted_entries, 1);

    // The workspace holds the last stream; the cache holds what the others need
    assert_eq!(files_on_disk(&fixture.sync_dir()), vec!["x.txt", "z.txt"]);
    assert!(repo.cache().contains(&binary(b"\0yy")));
    assert!(!repo.cache().contains(&text(b"old")));
    assert_eq!(repo.cache().len(), 1);

    let summary = repo.sync(&depot, &latest("A"))?;
    assert_eq!(summary.added.synced, 0);
    assert_eq!(summary.added.moved_from_cache, 1);
    Ok(())
}

#[test]
fn test_stats_reports_unique_bytes() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("A", 1, "shared.txt", b"shared")
        .file("A", 1, "only_a.txt", b"aaaa")
        .file("B", 1, "shared.txt", b"shared")
        .file("B", 1, "only_b.txt", b"bbbbbbbb");
    let depot = fixture.depot();
    let repo = fixture.create()?;

    let table = repo.stats(&depot, &["A".to_owned(), "B".to_owned()], &[])?;
    assert_eq!(table.unique, vec![vec![0, 4], vec![8, 0]]);
    let rendered = table.render();
    assert!(rendered.lines().next().unwrap().contains('A'));
    assert_eq!(rendered.lines().count(), 3);
    Ok(())
}

#[test]
fn test_status_reports_local_changes() -> Result<()> {
    let fixture = aging_streams()?;
    fixture.file("S1", 1, "keep.dat", b"keep");
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("S1"))?;

    let sync_dir = fixture.sync_dir();
    let recorded = repo.workspace().file("a.dat").unwrap().last_modified_ticks;
    let forged = filetime::FileTime::from_unix_time(recorded / 1_000_000_000 - 3600, 0);
    filetime::set_file_mtime(sync_dir.join("a.dat"), forged)?;
    fs::remove_file(sync_dir.join("keep.dat"))?;
    fs::write(sync_dir.join("new.txt"), b"+")?;

    let status = repo.status()?;
    assert_eq!(status.workspace_files, 2);
    assert_eq!(status.workspace_bytes, 14);
    assert_eq!(
        status.differences,
        vec![
            Difference::Modified("a.dat".to_owned()),
            Difference::Missing("keep.dat".to_owned()),
            Difference::Untracked("new.txt".to_owned()),
        ]
    );

    // Status is read-only; clean acts on the same differences
    assert_eq!(repo.workspace().file_count(), 2);
    repo.clean(true)?;
    assert!(repo.workspace().is_empty());
    assert!(files_on_disk(&sync_dir).is_empty());
    Ok(())
}

#[test]
fn test_dump_lists_workspace_and_cache() -> Result<()> {
    let fixture = aging_streams()?;
    let depot = fixture.depot();
    let mut repo = fixture.create()?;
    repo.sync(&depot, &latest("S1"))?;
    repo.sync(&depot, &latest("S2"))?;

    let lines = repo.dump();
    assert_eq!(lines[0], "Workspace:");
    assert!(lines[1].trim_start().starts_with("b.dat"));
    assert_eq!(lines[2], "Cache:");
    assert!(lines[3].contains(&text(&[b'a'; 10]).to_hex()));
    Ok(())
}
