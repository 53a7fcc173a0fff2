//! Idempotent installation of the three Git hook scripts into a
//! repository's `.git/hooks` directory.
//!
//! Installing twice must be a no-op (spec property P5), and installing
//! into a repo with a pre-existing, hand-written hook of the same name
//! must never clobber it.

use std::path::Path;

const MARKER: &str = "# managed-by: entire\n";

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("a hook already exists at {path} and was not installed by entire")]
    ForeignHookExists { path: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn script_for(binary_name: &str) -> String {
    format!(
        "#!/bin/sh\n{MARKER}# This file is regenerated on every `entire hooks install`; hand edits are lost.\nexec {binary_name} \"$@\"\n"
    )
}

/// Install (or update) one hook script. Returns `Ok(true)` if a new or
/// updated script was written, `Ok(false)` if the existing entire-managed
/// script was already current.
pub fn install_hook(hooks_dir: &Path, hook_name: &str, binary_name: &str) -> Result<bool, InstallError> {
    std::fs::create_dir_all(hooks_dir)?;
    let path = hooks_dir.join(hook_name);
    let script = script_for(binary_name);

    match std::fs::read_to_string(&path) {
        Ok(existing) if existing == script => {
            tracing::debug!(event = "hooks.install.unchanged", hook = hook_name, "hook already up to date");
            Ok(false)
        }
        Ok(existing) if existing.contains(MARKER) => {
            write_hook(&path, &script)?;
            tracing::info!(event = "hooks.install.updated", hook = hook_name, "updated managed hook");
            Ok(true)
        }
        Ok(_) => Err(InstallError::ForeignHookExists {
            path: path.display().to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            write_hook(&path, &script)?;
            tracing::info!(event = "hooks.install.created", hook = hook_name, "installed hook");
            Ok(true)
        }
        Err(e) => Err(InstallError::Io(e)),
    }
}

#[cfg(unix)]
fn write_hook(path: &Path, script: &str) -> Result<(), std::io::Error> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, script)?;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn write_hook(path: &Path, script: &str) -> Result<(), std::io::Error> {
    std::fs::write(path, script)
}

pub fn install_all(hooks_dir: &Path) -> Result<(), InstallError> {
    install_hook(hooks_dir, "prepare-commit-msg", "entire-hook-prepare-commit-msg")?;
    install_hook(hooks_dir, "post-commit", "entire-hook-post-commit")?;
    install_hook(hooks_dir, "pre-push", "entire-hook-pre-push")?;
    Ok(())
}
