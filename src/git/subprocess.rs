use anyhow::{Context, Result};
use log::debug;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

/// Non-interactive SSH transport: unattended runs must never hang on a host
/// key prompt or a password prompt.
const SSH_COMMAND: &str = "ssh -oBatchMode=yes -oLogLevel=QUIET \
                           -oStrictHostKeyChecking=no -oUserKnownHostsFile=/dev/null";

fn run<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<Output> {
    let mut cmd = Command::new("git");
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.args(args)
        .env("GIT_SSH_COMMAND", SSH_COMMAND)
        .env("GIT_TERMINAL_PROMPT", "0");

    let display = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    debug!("git {display}");

    let output = cmd
        .output()
        .with_context(|| format!("failed to run git {display}"))?;

    if !output.stdout.is_empty() {
        debug!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
    }
    if !output.stderr.is_empty() {
        debug!("{}", String::from_utf8_lossy(&output.stderr).trim_end());
    }
    if !output.status.success() {
        debug!("git {display} exited with {}", output.status);
    }
    Ok(output)
}

/// Run a git command, discarding its output.
///
/// Returns whether the command exited successfully. A non-zero exit status is
/// an ordinary outcome here, not an error; only a failure to spawn the
/// executable is.
pub fn check<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<bool> {
    Ok(run(cwd, args)?.status.success())
}

/// Run a git command and hand back its stdout verbatim, trailing newline
/// included. Callers that compare against the output must account for it.
pub fn capture<S: AsRef<OsStr>>(cwd: Option<&Path>, args: &[S]) -> Result<(bool, String)> {
    let output = run(cwd, args)?;
    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn check_reports_exit_status() {
        let td = tempdir().unwrap();
        assert!(check(Some(td.path()), &["init", "--bare", "."]).unwrap());
        // Not a work tree, and rev-parse outside any repository fails.
        let other = tempdir().unwrap();
        assert!(!check(Some(other.path()), &["rev-parse", "--is-inside-work-tree"]).unwrap());
    }

    #[test]
    fn capture_keeps_the_trailing_newline() {
        let td = tempdir().unwrap();
        assert!(check(Some(td.path()), &["init", "-b", "master", "."]).unwrap());
        let (ok, out) = capture(
            Some(td.path()),
            &["rev-parse", "--is-inside-work-tree"],
        )
        .unwrap();
        assert!(ok);
        assert_eq!(out, "true\n");
    }
}
