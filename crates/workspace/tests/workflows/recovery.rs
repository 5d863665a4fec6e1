//! Persistence across reloads and recovery from interrupted writes

use crate::common::{latest, text, Fixture};
use anyhow::Result;
use journal::TransactionState;
use std::fs;
use workspace::{Repository, WorkspaceTree};

fn fixture() -> Result<Fixture> {
    let fixture = Fixture::new()?;
    fixture
        .file("Main", 1, "src/lib.rs", b"pub fn f() {}")
        .file("Main", 1, "README", b"readme")
        .file("Dev", 1, "README", b"readme");
    Ok(fixture)
}

#[test]
fn test_state_survives_reload() -> Result<()> {
    let fixture = fixture()?;
    let depot = fixture.depot();
    {
        let mut repo = fixture.create()?;
        repo.sync(&depot, &latest("Main"))?;
        repo.sync(&depot, &latest("Dev"))?;
    }

    let repo = fixture.load()?;
    assert_eq!(repo.workspace().file_count(), 1);
    assert!(repo.cache().contains(&text(b"pub fn f() {}")));
    assert_eq!(repo.next_sequence_number(), 2);
    assert!(!repo.requires_repair());
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_interrupted_save_rolls_back_to_backup() -> Result<()> {
    let fixture = fixture()?;
    let depot = fixture.depot();
    {
        let mut repo = fixture.create()?;
        repo.sync(&depot, &latest("Main"))?;
    }

    // A crash after the backup was taken but before the new record was complete
    let data_file = fixture.base_dir.join("Repository.dat");
    fs::rename(&data_file, fixture.base_dir.join("Repository.dat.transaction"))?;
    fs::write(&data_file, b"\x01\x00")?;

    let repo = fixture.load()?;
    assert_eq!(repo.workspace().file_count(), 2);
    assert!(!fixture.base_dir.join("Repository.dat.transaction").exists());
    Ok(())
}

#[test]
fn test_dirty_state_is_repaired_on_load() -> Result<()> {
    let fixture = fixture()?;
    let depot = fixture.depot();
    let cached_path = {
        let mut repo = fixture.create()?;
        repo.sync(&depot, &latest("Main"))?;
        repo.sync(&depot, &latest("Dev"))?;
        let entry = repo.cache().get(&text(b"pub fn f() {}")).unwrap();
        entry.path(&repo.paths().cache_dir)
    };

    // Rewrite the record as if a phase had been interrupted, then lose the cached file
    let data_file = fixture.base_dir.join("Repository.dat");
    let saved = journal::state::load::<WorkspaceTree>(&data_file)?;
    journal::state::save(&data_file, &saved, TransactionState::Dirty)?;
    fs::remove_file(&cached_path)?;

    let repo = fixture.load()?;
    assert!(!repo.requires_repair());
    assert!(repo.cache().is_empty());

    // The repaired state was persisted clean
    let reloaded = journal::state::load::<WorkspaceTree>(&data_file)?;
    assert!(!reloaded.requires_repair);
    Ok(())
}

#[test]
fn test_missing_signature_is_not_a_repository() -> Result<()> {
    let fixture = fixture()?;
    fixture.create()?;
    assert!(Repository::exists(&fixture.base_dir));

    fs::write(fixture.base_dir.join("Repository.sig"), b"junk")?;
    assert!(!Repository::exists(&fixture.base_dir));
    assert!(fixture.load().is_err());
    Ok(())
}

#[test]
fn test_repository_config_is_loaded() -> Result<()> {
    let fixture = fixture()?;
    let mut config = workspace::RepositoryConfig::default();
    config.clean.remove_untracked = false;
    fixture.create_with(config)?;

    let repo = fixture.load()?;
    assert!(!repo.config().clean.remove_untracked);
    Ok(())
}

#[test]
fn test_lost_cache_file_is_fetched_and_flags_repair() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("S1", 1, "a.txt", b"shared")
        .file("E", 1, "keep.txt", b"keep")
        .file("S2", 1, "x/a.txt", b"shared")
        .file("S2", 1, "y/a.txt", b"shared");
    let depot = fixture.depot();
    {
        let mut repo = fixture.create()?;
        repo.sync(&depot, &latest("S1"))?;
        repo.sync(&depot, &latest("E"))?;
        let entry = repo.cache().get(&text(b"shared")).unwrap();
        fs::remove_file(entry.path(&repo.paths().cache_dir))?;

        // The move from the cache fails, and so does the copy that depends on it
        let summary = repo.sync(&depot, &latest("S2"))?;
        assert_eq!(summary.added.moved_from_cache, 0);
        assert_eq!(summary.added.copied, 0);
        assert_eq!(summary.added.synced, 2);
        assert_eq!(fixture.read("x/a.txt").unwrap(), b"shared");
        assert_eq!(fixture.read("y/a.txt").unwrap(), b"shared");
        assert!(!repo.cache().contains(&text(b"shared")));
        assert!(repo.requires_repair());
    }

    let data_file = fixture.base_dir.join("Repository.dat");
    assert!(journal::state::load::<WorkspaceTree>(&data_file)?.requires_repair);

    let repo = fixture.load()?;
    assert!(!repo.requires_repair());
    assert!(repo.status()?.differences.is_empty());
    Ok(())
}

#[test]
fn test_blocked_directory_removal_flags_repair() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("A", 1, "x.txt", b"hi")
        .file("A", 1, "bin/y.bin", b"\0yy")
        .file("B", 1, "x.txt", b"hi");
    let depot = fixture.depot();
    let mut config = workspace::RepositoryConfig::default();
    config.clean.remove_untracked = false;
    {
        let mut repo = fixture.create_with(config)?;
        repo.sync(&depot, &latest("A"))?;
        fs::write(fixture.sync_dir().join("bin/notes.txt"), b"mine")?;

        let summary = repo.sync(&depot, &latest("B"))?;
        assert_eq!(summary.removed.moved_to_cache, 1);
        assert_eq!(summary.removed.directories_deleted, 0);
        assert_eq!(fixture.read("bin/notes.txt").unwrap(), b"mine");
        assert!(repo.workspace().file("bin/y.bin").is_none());
        assert!(repo.requires_repair());
    }

    let repo = fixture.load()?;
    assert!(!repo.requires_repair());
    assert_eq!(repo.cache().len(), 1);
    Ok(())
}

#[test]
fn test_unwritable_placeholder_does_not_abort_fake_sync() -> Result<()> {
    let fixture = Fixture::new()?;
    fixture
        .file("Main", 1, "d/x.txt", b"x")
        .file("Main", 1, "top.txt", b"t");
    let depot = fixture.depot();
    let mut config = workspace::RepositoryConfig::default();
    config.clean.remove_untracked = false;
    {
        let mut repo = fixture.create_with(config)?;
        // An untracked file where the placeholder's directory should go
        fs::write(fixture.sync_dir().join("d"), b"in the way")?;

        let mut options = latest("Main");
        options.fake = true;
        let summary = repo.sync(&depot, &options)?;
        assert_eq!(summary.added.synced, 2);
        assert_eq!(fixture.read("top.txt").unwrap(), b"");
        assert_eq!(fixture.read("d").unwrap(), b"in the way");
        assert!(repo.requires_repair());
    }

    let repo = fixture.load()?;
    assert!(!repo.requires_repair());
    Ok(())
}
