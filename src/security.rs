#![forbid(unsafe_code)]

//! Startup checks shared by the shuffletube binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The server and the channel
/// tooling only ever touch their own data root, so there is no reason to give
/// them system-wide privileges.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not be run as root; start it as an unprivileged user");
    }
    Ok(())
}
