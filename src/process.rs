//! Shell command runner for the external collaborators
//!
//! Collaborator commands are operator-supplied templates run through `sh -c`.
//! Output is captured into anonymous temp files rather than pipes, so a chatty
//! command can never block on a full pipe while we poll it for the deadline.
//!
//! Every command leads its own process group. Killing a command kills the
//! group, so helpers it started in the background cannot outlive it.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::domain::DeploymentUnit;
use crate::error::{Result, process};

/// How often a running command is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Characters of output kept in error messages
const OUTPUT_TAIL: usize = 400;

/// Substitute `{name}`, `{version}`, `{sequence}`, `{policy}` and `{path}`
pub fn render(template: &str, unit: &DeploymentUnit) -> String {
    template
        .replace("{name}", &unit.name)
        .replace("{version}", &unit.version)
        .replace("{sequence}", &unit.sequence.to_string())
        .replace("{policy}", &unit.policy)
        .replace("{path}", &unit.path)
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty trimmed stdout lines
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    /// Short description of a failure for error messages
    pub fn failure_reason(&self) -> String {
        let code = self
            .code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"));
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            return code;
        }
        let tail: String = stderr
            .chars()
            .rev()
            .take(OUTPUT_TAIL)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{code}: {tail}")
    }
}

/// A `sh -c` invocation with a deadline
#[derive(Debug, Clone)]
pub struct ShellCommand {
    script: String,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl ShellCommand {
    pub fn new(script: impl Into<String>, timeout: Duration) -> Self {
        Self {
            script: script.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            timeout,
        }
    }

    /// Render `template` for `unit` and export the unit as `CHAINROLL_UNIT_*`
    pub fn for_unit(template: &str, unit: &DeploymentUnit, timeout: Duration) -> Self {
        Self::new(render(template, unit), timeout).with_unit_env(unit)
    }

    #[must_use]
    pub fn in_dir(mut self, dir: Option<&Path>) -> Self {
        self.working_dir = dir.map(Path::to_path_buf);
        self
    }

    /// Positional argument, seen by the script as `$1`, `$2`, ...
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_unit_env(self, unit: &DeploymentUnit) -> Self {
        self.with_env("CHAINROLL_UNIT_NAME", &unit.name)
            .with_env("CHAINROLL_UNIT_VERSION", &unit.version)
            .with_env("CHAINROLL_UNIT_SEQUENCE", unit.sequence.to_string())
            .with_env("CHAINROLL_UNIT_POLICY", &unit.policy)
            .with_env("CHAINROLL_UNIT_PATH", &unit.path)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    /// Build the underlying `sh -c` command, as leader of a new process group
    pub fn command(&self) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.script).stdin(Stdio::null());
        if !self.args.is_empty() {
            cmd.arg("sh").args(&self.args);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run to completion or kill at the deadline
    ///
    /// A non-zero exit is not an error here; callers decide from
    /// [`CommandOutput::success`]. Spawn failures and timeouts are errors.
    pub fn run(&self) -> Result<CommandOutput> {
        let mut stdout = tempfile::tempfile()?;
        let mut stderr = tempfile::tempfile()?;

        let mut cmd = self.command();
        cmd.stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));

        tracing::debug!(command = %self.script, "running collaborator command");
        let mut child = cmd
            .spawn()
            .map_err(|e| process::failed(&self.script, e.to_string()))?;

        let status = match wait_until(&mut child, Instant::now() + self.timeout)? {
            Some(status) => status,
            None => {
                kill(&mut child);
                return Err(process::timed_out(&self.script, self.timeout.as_secs()));
            }
        };

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: read_back(&mut stdout)?,
            stderr: read_back(&mut stderr)?,
        })
    }

    /// Run and require a zero exit status
    pub fn run_checked(&self) -> Result<CommandOutput> {
        let output = self.run()?;
        if !output.success {
            return Err(process::failed(&self.script, output.failure_reason()));
        }
        Ok(output)
    }
}

/// Poll `child` until it exits or `deadline` passes; `None` means timed out
pub fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Kill `child`'s process group and reap `child`
pub fn kill(child: &mut Child) {
    if let Err(e) = kill_group(child) {
        tracing::debug!(pid = child.id(), error = %e, "killing process group failed");
    }
    let _ = child.wait();
}

/// SIGKILL every process in the group led by `child`
///
/// The group outlives its leader while any member runs, so this also reaches
/// background helpers of a leader that already exited. An empty group is not
/// an error.
#[cfg(unix)]
pub fn kill_group(child: &mut Child) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let group = Pid::from_raw(child.id() as i32);
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(errno.into()),
    }
}

#[cfg(not(unix))]
pub fn kill_group(child: &mut Child) -> std::io::Result<()> {
    match child.kill() {
        Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => Err(e),
        _ => Ok(()),
    }
}

fn read_back(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
