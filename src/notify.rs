//! Notification hook that runs an external program, usually the feed
//! generator.

use addons_catalog::Notifier;
use std::process::Stdio;
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Spawns `argv` after every catalog change. The mutation does not wait for
/// it; the exit status is collected and logged in the background.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// `None` for an empty argument list.
    pub fn new(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self { program: program.clone(), args: args.to_vec() })
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(program = self.program, "No async runtime; notifier not run");
            return;
        };
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(program = self.program, error = %e, "Could not run notifier");
                return;
            },
        };
        let program = self.program.clone();
        debug!(program, pid = child.id(), "Spawned notifier");
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(program, "Notifier finished"),
                Ok(status) => warn!(program, %status, "Notifier failed"),
                Err(e) => warn!(program, error = %e, "Could not wait for notifier"),
            }
        });
    }
}
