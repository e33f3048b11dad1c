#![cfg_attr(not(feature = "proc"), allow(dead_code))]

use std::time::Duration;

use tokio::process::{Child, Command};

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        /// SIGTERM first, SIGKILL once `grace` expires.
        pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
            if let Some(id) = child.id() {
                // SAFETY: signals our own child; a stale pid only yields ESRCH.
                unsafe {
                    libc::kill(id as libc::pid_t, libc::SIGTERM);
                }
                if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                    return Ok(());
                }
            }
            child.kill().await
        }
    } else {
        pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
            child.kill().await
        }
    }
}
