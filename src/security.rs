#![forbid(unsafe_code)]

//! Process and credential checks run before touching the remote account.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use nix::unistd::Uid;
use tracing::warn;

/// Fails fast when a binary is started as root. Curation only needs the
/// token and the video directories, both of which belong to a regular user.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not be run as root; use the account that owns the token file");
    }
    Ok(())
}

/// True when group or others have any access to the file.
fn mode_is_shared(mode: u32) -> bool {
    mode & 0o077 != 0
}

/// Warns when a credential file is readable beyond its owner. Returns
/// whether the file is private.
pub fn check_token_file(path: &Path) -> Result<bool> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Inspecting {}", path.display()))?;
    let mode = metadata.permissions().mode();
    if mode_is_shared(mode) {
        warn!(
            path = %path.display(),
            mode = %format_args!("{:o}", mode & 0o777),
            "token file is accessible to other users; chmod 600 it"
        );
        return Ok(false);
    }
    Ok(true)
}
