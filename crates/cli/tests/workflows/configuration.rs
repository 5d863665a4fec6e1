//! config list/get/set and the global options

use crate::common::{Sandbox, StashCommand};
use anyhow::Result;

#[test]
fn test_config_get_and_set() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stash(&["create"]).assert_success()?;

    let result = sandbox.stash(&["config", "get", "sync.batch_size_bytes"]).assert_success()?;
    assert_eq!(result.stdout.trim(), (256u64 * 1024 * 1024).to_string());

    sandbox.stash(&["config", "set", "sync.threads", "4"]).assert_success()?;
    let result = sandbox.stash(&["config", "get", "sync.threads"]).assert_success()?;
    assert_eq!(result.stdout.trim(), "4");

    let result = sandbox.stash(&["config", "list"]).assert_success()?;
    assert!(result.contains_stdout("batch_size_bytes"));
    assert!(result.contains_stdout("remove_untracked"));
    Ok(())
}

#[test]
fn test_config_rejects_bad_input() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.stash(&["create"]).assert_success()?;

    let result = sandbox.stash(&["config", "get", "daemon.interval"]).assert_failure()?;
    assert!(result.contains_stderr("Unknown config key"));
    sandbox.stash(&["config", "set", "sync.batch_size_bytes", "0"]).assert_failure()?;
    sandbox.stash(&["config", "set", "clean.remove_untracked", "maybe"]).assert_failure()?;

    // A rejected value never reaches the file
    let result = sandbox.stash(&["config", "get", "sync.batch_size_bytes"]).assert_success()?;
    assert_ne!(result.stdout.trim(), "0");
    Ok(())
}

#[test]
fn test_base_dir_flag_selects_repository() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let other = sandbox.root.join("other");

    let other_arg = other.to_string_lossy().into_owned();
    let mut cmd = StashCommand::new(&sandbox.root);
    cmd.args(&["--base-dir", other_arg.as_str(), "create"]);
    let result = cmd.assert_success()?;
    assert!(result.duration.as_secs() < 30);
    assert!(other.join("Repository.sig").exists());
    assert!(!sandbox.base_dir.exists());
    Ok(())
}
