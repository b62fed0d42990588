//! Spawning external tools (inference helper, ffmpeg, rclone).

use std::ffi::OsStr;
use std::process::Command;

/// A command for an external tool, placed in its own process group.
///
/// A terminal Ctrl-C is delivered to the foreground process group only, so
/// tools spawned here keep running until the agent itself stops them.
pub(crate) fn command(program: impl AsRef<OsStr>) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}
