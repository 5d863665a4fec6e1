//! create, sync, status, clean and dump

use crate::common::Sandbox;
use anyhow::Result;
use std::fs;

fn two_streams() -> Result<Sandbox> {
    let sandbox = Sandbox::new()?;
    sandbox
        .file("Main", 1, "a.txt", b"alpha")
        .file("Main", 1, "src/lib.rs", b"pub fn lib() {}")
        .file("Main", 2, "a.txt", b"alpha v2")
        .file("Main", 2, "src/lib.rs", b"pub fn lib() {}")
        .file("Dev", 7, "a.txt", b"alpha")
        .file("Dev", 7, "dev.txt", b"dev only");
    Ok(sandbox)
}

#[test]
fn test_create_then_status() -> Result<()> {
    let sandbox = two_streams()?;

    let result = sandbox.stash(&["create"]).assert_success()?;
    assert!(result.contains_stdout("Created repository"));
    assert!(sandbox.base_dir.join("Repository.sig").exists());
    assert!(sandbox.base_dir.join("config.toml").exists());

    let result = sandbox.stash(&["status"]).assert_success()?;
    assert!(result.contains_stdout("Repository Status"));
    assert!(result.contains_stdout("No local changes"));
    Ok(())
}

#[test]
fn test_create_refuses_occupied_directory() -> Result<()> {
    let sandbox = two_streams()?;
    fs::create_dir_all(&sandbox.base_dir)?;
    fs::write(sandbox.base_dir.join("precious.txt"), b"keep me")?;

    let result = sandbox.stash(&["create"]).assert_failure()?;
    assert!(result.contains_stderr("--force"));
    assert!(sandbox.base_dir.join("precious.txt").exists());

    sandbox.stash(&["create", "--force"]).assert_success()?;
    assert!(!sandbox.base_dir.join("precious.txt").exists());
    Ok(())
}

#[test]
fn test_commands_require_a_repository() -> Result<()> {
    let sandbox = two_streams()?;

    let result = sandbox.stash(&["status"]).assert_failure()?;
    assert!(result.contains_stderr("Not a Stash repository"));
    sandbox.stash(&["sync", "Main"]).assert_failure()?;
    Ok(())
}

#[test]
fn test_sync_switches_streams_through_the_cache() -> Result<()> {
    let sandbox = two_streams()?;
    sandbox.stash(&["create"]).assert_success()?;

    let result = sandbox.stash(&["sync", "Main", "--change", "1"]).assert_success()?;
    assert!(result.contains_stdout("Synced"));
    assert!(result.contains_stdout("2 fetched"));
    assert_eq!(fs::read(sandbox.workspace_file("a.txt"))?, b"alpha");
    assert_eq!(fs::read(sandbox.workspace_file("src/lib.rs"))?, b"pub fn lib() {}");

    let result = sandbox.stash(&["sync", "Dev"]).assert_success()?;
    assert!(result.contains_stdout("1 to cache"));
    assert!(!sandbox.workspace_file("src").exists());
    assert_eq!(fs::read(sandbox.workspace_file("dev.txt"))?, b"dev only");

    // lib.rs comes back from the cache, only the new a.txt is fetched
    let result = sandbox.stash(&["sync", "Main"]).assert_success()?;
    assert!(result.contains_stdout("1 from cache"));
    assert!(result.contains_stdout("1 fetched"));
    assert_eq!(fs::read(sandbox.workspace_file("a.txt"))?, b"alpha v2");
    assert!(!sandbox.workspace_file("dev.txt").exists());
    Ok(())
}

#[test]
fn test_sync_rejects_unknown_streams_and_changes() -> Result<()> {
    let sandbox = two_streams()?;
    sandbox.stash(&["create"]).assert_success()?;

    sandbox.stash(&["sync", "Nope"]).assert_failure()?;
    sandbox.stash(&["sync", "Main", "--change", "0"]).assert_failure()?;
    let result = sandbox.stash(&["sync", "Main", "--change", "soon"]).assert_failure()?;
    assert!(result.contains_stderr("soon"));
    Ok(())
}

#[test]
fn test_status_and_clean_handle_local_changes() -> Result<()> {
    let sandbox = two_streams()?;
    sandbox.stash(&["create"]).assert_success()?;
    sandbox.stash(&["sync", "Main"]).assert_success()?;

    fs::write(sandbox.workspace_file("extra.txt"), b"stray")?;
    fs::remove_file(sandbox.workspace_file("a.txt"))?;

    let result = sandbox.stash(&["status"]).assert_success()?;
    assert!(result.contains_stdout("Local changes"));
    assert!(result.contains_stdout("+ extra.txt"));
    assert!(result.contains_stdout("- a.txt"));

    // Untracked files survive when asked to keep them
    sandbox.stash(&["clean", "--keep-untracked"]).assert_success()?;
    assert!(sandbox.workspace_file("extra.txt").exists());

    sandbox.stash(&["clean"]).assert_success()?;
    assert!(!sandbox.workspace_file("extra.txt").exists());
    let result = sandbox.stash(&["status"]).assert_success()?;
    assert!(result.contains_stdout("No local changes"));

    // The missing file is restored by the next sync
    let result = sandbox.stash(&["sync", "Main"]).assert_success()?;
    assert!(result.contains_stdout("1 fetched"));
    assert!(sandbox.workspace_file("a.txt").exists());
    Ok(())
}

#[test]
fn test_dump_lists_workspace_and_cache() -> Result<()> {
    let sandbox = two_streams()?;
    sandbox.stash(&["create"]).assert_success()?;
    sandbox.stash(&["sync", "Main"]).assert_success()?;
    sandbox.stash(&["sync", "Dev"]).assert_success()?;

    let result = sandbox.stash(&["dump"]).assert_success()?;
    assert!(result.contains_stdout("Workspace:"));
    assert!(result.contains_stdout("dev.txt"));
    assert!(result.contains_stdout("Cache:"));
    Ok(())
}
