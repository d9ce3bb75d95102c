//! Shared subprocess helpers for the tool drivers.
//!
//! Both drivers spawn their tool directly with an argument vector (no shell
//! interpolation), stream one of its pipes through a parser task, and wait
//! for exit. Cancellation sends a graceful termination signal; the drivers
//! never escalate to a forced kill.

use std::process::Stdio;

use log::{debug, warn};
use tokio::process::{Child, Command};

use crate::Result;
use crate::error::OptimarrError;

/// Number of trailing output lines retained for error reporting.
pub(crate) const OUTPUT_TAIL_LINES: usize = 20;

/// Spawn `binary` with `args`, stdout and stderr piped, stdin closed.
///
/// A spawn failure with `NotFound` maps to `ToolMissing` so environmental
/// errors are distinguishable from tool failures.
pub(crate) fn spawn_tool(binary: &std::path::Path, args: &[String]) -> Result<Child> {
    debug!("executing: {} {}", binary.display(), args.join(" "));
    Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OptimarrError::ToolMissing(binary.display().to_string())
            } else {
                OptimarrError::Io(e)
            }
        })
}

/// Ask the child to terminate gracefully (SIGTERM on unix). The caller is
/// responsible for awaiting the exit afterwards so the process is reaped.
pub(crate) fn terminate_gracefully(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                warn!("failed to signal pid {}: {}", pid, std::io::Error::last_os_error());
            }
            return;
        }
    }
    // Non-unix platforms have no graceful signal to send.
    let _ = child.start_kill();
}

/// Check whether a tool binary is runnable, logging (not failing) when it is
/// absent. Used at manager startup so a missing tool surfaces early without
/// preventing the service from running other job kinds.
pub(crate) fn note_tool_presence(name: &str, binary: &std::path::Path) {
    let found = if binary.is_absolute() {
        binary.exists()
    } else {
        std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths).any(|dir| dir.join(binary).exists())
            })
            .unwrap_or(false)
    };
    if found {
        debug!("{} available at {}", name, binary.display());
    } else {
        warn!(
            "{} not found at {}; jobs requiring it will fail",
            name,
            binary.display()
        );
    }
}

/// Keep the last `OUTPUT_TAIL_LINES` lines of tool output for diagnostics.
pub(crate) fn push_tail(tail: &mut Vec<String>, line: &str) {
    if tail.len() >= OUTPUT_TAIL_LINES {
        tail.remove(0);
    }
    tail.push(line.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_spawn_missing_binary_maps_to_tool_missing() {
        let err = spawn_tool(Path::new("/nonexistent/tool-binary"), &[]).unwrap_err();
        assert!(matches!(err, OptimarrError::ToolMissing(_)));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut tail = Vec::new();
        for i in 0..50 {
            push_tail(&mut tail, &format!("line {}", i));
        }
        assert_eq!(tail.len(), OUTPUT_TAIL_LINES);
        assert_eq!(tail.last().unwrap(), "line 49");
        assert_eq!(tail.first().unwrap(), "line 30");
    }
}
