//! Ephemeral API process per test cycle
//!
//! One API server is started against exactly one deployed unit, on a fixed
//! port reused by every cycle, and is killed when the cycle ends. The whole
//! process group goes, so a server started by a wrapper script goes with it.
//! Dropping a process handle kills the group too, so a panic cannot leak a
//! server into the next cycle.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ApiConfig;
use crate::domain::DeploymentUnit;
use crate::error::{Result, unit};
use crate::process::{self, ShellCommand};

const READY_POLL: Duration = Duration::from_millis(200);

/// A running API process
pub trait ApiProcess {
    fn base_url(&self) -> &str;

    /// Stop the process; must be safe to call on an already exited process
    fn shutdown(&mut self) -> Result<()>;
}

/// Starts an API process fronting one unit
pub trait ApiLauncher {
    fn launch(&mut self, unit: &DeploymentUnit) -> Result<Box<dyn ApiProcess>>;
}

/// Launcher running `api.command` through `sh -c "exec ..."`
pub struct ShellApiLauncher {
    config: ApiConfig,
    working_dir: Option<PathBuf>,
    http: reqwest::blocking::Client,
}

impl ShellApiLauncher {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()?;
        Ok(Self {
            config: config.clone(),
            working_dir: config.working_dir.clone(),
            http,
        })
    }

    fn port_in_use(&self) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.config.port));
        TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok()
    }

    fn is_ready(&self, url: &str) -> bool {
        self.http
            .get(url)
            .send()
            .is_ok_and(|resp| resp.status().is_success())
    }
}

impl ApiLauncher for ShellApiLauncher {
    fn launch(&mut self, unit: &DeploymentUnit) -> Result<Box<dyn ApiProcess>> {
        if self.port_in_use() {
            return Err(unit::api_start_failed(
                &unit.name,
                format!("port {} is already in use by another process", self.config.port),
            ));
        }

        let mut output = tempfile::tempfile()?;
        let mut cmd = ShellCommand::new(format!("exec {}", self.config.command), self.config.startup_timeout())
            .in_dir(self.working_dir.as_deref())
            .with_unit_env(unit)
            .with_env("PORT", self.config.port.to_string())
            .with_env("CHAINROLL_API_PORT", self.config.port.to_string())
            .command();
        cmd.stdout(Stdio::from(output.try_clone()?))
            .stderr(Stdio::from(output.try_clone()?));

        let child = cmd
            .spawn()
            .map_err(|e| unit::api_start_failed(&unit.name, e.to_string()))?;
        let mut api = ShellApiProcess {
            unit: unit.name.clone(),
            base_url: self.config.base_url(),
            child: Some(child),
        };
        tracing::debug!(unit = %unit.name, port = self.config.port, "API process started");

        let ready_url = format!("{}{}", api.base_url, self.config.ready_path);
        let deadline = Instant::now() + self.config.startup_timeout();
        loop {
            if let Some(status) = api.try_exit()? {
                return Err(unit::api_start_failed(
                    &unit.name,
                    format!("exited with {status} before answering: {}", tail(&mut output)),
                ));
            }
            if self.is_ready(&ready_url) {
                tracing::info!(unit = %unit.name, url = %api.base_url, "API ready");
                return Ok(Box::new(api));
            }
            if Instant::now() >= deadline {
                if let Err(e) = api.shutdown() {
                    tracing::warn!(unit = %unit.name, error = %e, "stopping unready API process failed");
                }
                return Err(unit::api_start_failed(
                    &unit.name,
                    format!(
                        "{ready_url} did not answer within {}s",
                        self.config.startup_timeout_secs
                    ),
                ));
            }
            thread::sleep(READY_POLL);
        }
    }
}

/// API process started by [`ShellApiLauncher`]
pub struct ShellApiProcess {
    unit: String,
    base_url: String,
    child: Option<Child>,
}

impl ShellApiProcess {
    fn try_exit(&mut self) -> Result<Option<std::process::ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }
}

impl ApiProcess for ShellApiProcess {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        // A wrapper like `npm start` may have exited while its server still runs
        process::kill_group(&mut child)
            .map_err(|e| unit::teardown_failed(&self.unit, format!("kill API process group: {e}")))?;
        let status = process::wait_until(&mut child, Instant::now() + Duration::from_secs(5))?;
        if status.is_none() {
            return Err(unit::teardown_failed(
                &self.unit,
                format!("API process {} did not exit after kill", child.id()),
            ));
        }
        tracing::debug!(unit = %self.unit, "API process stopped");
        Ok(())
    }
}

impl Drop for ShellApiProcess {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            process::kill(&mut child);
        }
    }
}

fn tail(output: &mut File) -> String {
    let mut text = String::new();
    if output.seek(SeekFrom::Start(0)).is_ok() {
        let _ = output.read_to_string(&mut text);
    }
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(300)
        .map_or(0, |(idx, _)| idx);
    if text.is_empty() {
        "no output".to_string()
    } else {
        text[start..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[test]
    fn test_process_exiting_early_is_start_failure() {
        let config = ApiConfig {
            command: "sh -c 'echo boom >&2; exit 3'".to_string(),
            port: free_port(),
            startup_timeout_secs: 5,
            ..ApiConfig::default()
        };
        let mut launcher = ShellApiLauncher::new(&config).unwrap();
        let err = launcher
            .launch(&DeploymentUnit::new("patient", "cc/patient"))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            crate::error::ChainrollError::ApiStartFailed { .. }
        ));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_silent_process_times_out_and_is_killed() {
        let config = ApiConfig {
            command: "sleep 30".to_string(),
            port: free_port(),
            startup_timeout_secs: 1,
            ..ApiConfig::default()
        };
        let started = Instant::now();
        let mut launcher = ShellApiLauncher::new(&config).unwrap();
        let err = launcher
            .launch(&DeploymentUnit::new("doctor", "cc/doctor"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("did not answer"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_busy_port_is_start_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ApiConfig {
            command: "sleep 30".to_string(),
            port: listener.local_addr().unwrap().port(),
            ..ApiConfig::default()
        };
        let mut launcher = ShellApiLauncher::new(&config).unwrap();
        let err = launcher
            .launch(&DeploymentUnit::new("audit", "cc/audit"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("already in use"));
    }

    fn port_is_free(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }

    /// A wrapper shell whose listener is a child that outlives the wrapper
    fn wrapped_listener(port: u16) -> ShellApiProcess {
        let child = ShellCommand::new(
            "(exec python3 -c 'import socket,time; s=socket.socket(); \
             s.setsockopt(socket.SOL_SOCKET, socket.SO_REUSEADDR, 1); \
             s.bind((\"127.0.0.1\", int(__import__(\"sys\").argv[1]))); s.listen(); time.sleep(30)' \"$1\") & \
             sleep 30",
            Duration::from_secs(30),
        )
        .with_arg(port.to_string())
        .command()
        .spawn()
        .unwrap();
        ShellApiProcess {
            unit: "patient".to_string(),
            base_url: format!("http://127.0.0.1:{port}"),
            child: Some(child),
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        condition()
    }

    #[test]
    fn test_shutdown_kills_server_started_by_wrapper() {
        let temp = crate::test_fixtures::create_temp_dir();
        let child = ShellCommand::new("(sleep 1; touch served) & sleep 30", Duration::from_secs(30))
            .in_dir(Some(temp.path()))
            .command()
            .spawn()
            .unwrap();
        let mut api = ShellApiProcess {
            unit: "patient".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            child: Some(child),
        };

        api.shutdown().unwrap();
        thread::sleep(Duration::from_secs(2));
        assert!(!temp.path().join("served").exists());
    }

    #[test]
    fn test_shutdown_after_wrapper_exit_still_kills_server() {
        let temp = crate::test_fixtures::create_temp_dir();
        let mut child = ShellCommand::new("(sleep 1; touch served) & exit 0", Duration::from_secs(30))
            .in_dir(Some(temp.path()))
            .command()
            .spawn()
            .unwrap();
        process::wait_until(&mut child, Instant::now() + Duration::from_secs(5))
            .unwrap()
            .unwrap();
        let mut api = ShellApiProcess {
            unit: "doctor".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            child: Some(child),
        };

        api.shutdown().unwrap();
        thread::sleep(Duration::from_secs(2));
        assert!(!temp.path().join("served").exists());
    }

    #[test]
    fn test_port_is_free_for_next_cycle_after_shutdown() {
        if std::process::Command::new("python3").arg("-V").output().is_err() {
            return;
        }
        let port = free_port();
        let mut api = wrapped_listener(port);
        assert!(wait_for(|| !port_is_free(port)), "listener never bound");

        api.shutdown().unwrap();
        drop(api);
        assert!(wait_for(|| port_is_free(port)));

        let config = ApiConfig {
            command: "sleep 30".to_string(),
            port,
            startup_timeout_secs: 1,
            ..ApiConfig::default()
        };
        let err = ShellApiLauncher::new(&config)
            .unwrap()
            .launch(&DeploymentUnit::new("doctor", "cc/doctor"))
            .err()
            .unwrap();
        assert!(!err.to_string().contains("already in use"), "{err}");
    }

    #[test]
    fn test_tail_keeps_end_of_output() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, "a".repeat(500).as_bytes()).unwrap();
        std::io::Write::write_all(&mut file, b"END").unwrap();
        let text = tail(&mut file);
        assert!(text.ends_with("END"));
        assert!(text.len() <= 301);
    }
}
