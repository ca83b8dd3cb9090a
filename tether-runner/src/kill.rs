//! Process-tree termination.

use tokio::process::Child;
use tracing::{debug, warn};

/// Delay before escalating from SIGTERM to SIGKILL.
#[cfg(unix)]
const SIGKILL_ESCALATION_MS: u64 = 200;

/// Terminate `child` and every descendant it spawned.
///
/// Best-effort: the tree may already be gone, and a vanished tree is not
/// worth surfacing — this step is hygiene, not part of the returned result.
/// The caller must still reap the child afterwards.
///
/// - Unix: the child was spawned as its own process-group leader, so its
///   pid doubles as the group id and `killpg` reaches the whole tree.
/// - Windows: `taskkill /f /t` walks the task tree.
pub(crate) async fn terminate_tree(child: &mut Child) {
    let Some(pid) = child.id() else {
        // Already reaped; nothing left to signal.
        return;
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let pgid = Pid::from_raw(pid as i32);

        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) => debug!(pid, "Sent SIGTERM to process group"),
            Err(e) => warn!(pid, error = %e, "SIGTERM to process group failed"),
        }

        tokio::time::sleep(std::time::Duration::from_millis(SIGKILL_ESCALATION_MS)).await;

        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!(pid, "Sent SIGKILL to process group"),
            // ESRCH here just means the group exited after the SIGTERM.
            Err(e) => debug!(pid, error = %e, "SIGKILL to process group failed"),
        }
    }

    #[cfg(windows)]
    {
        use std::process::Stdio;
        use tokio::process::Command;

        match Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut killer) => {
                let _ = killer.wait().await;
                debug!(pid, "taskkill completed");
            }
            Err(e) => warn!(pid, error = %e, "Failed to start taskkill"),
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!(pid, "No tree-kill support on this platform, killing direct child only");
        let _ = child.start_kill();
    }
}
