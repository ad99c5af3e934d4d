//! Driver process supervision.
//!
//! Spawns a WebDriver binary (`chromedriver`, `geckodriver`) on a local port
//! and waits until it reports ready on `GET /status`.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::types::{DriverError, DriverResult};
use super::webdriver::WebDriverClient;
use crate::config::BrowserKind;

/// Interval between readiness probes
const READY_POLL: Duration = Duration::from_millis(100);

/// A running driver binary. Killed on drop.
#[derive(Debug)]
pub struct DriverProcess {
    child: Option<Child>,
    port: u16,
}

impl DriverProcess {
    /// Start `binary` and block until it accepts sessions or `startup_timeout`
    /// elapses. A process that exits early (missing browser, port already in
    /// use) is reported as a launch failure.
    pub fn launch(
        binary: &Path,
        browser: BrowserKind,
        port: Option<u16>,
        startup_timeout: Duration,
    ) -> DriverResult<Self> {
        let port = match port {
            Some(port) => port,
            None => free_port()?,
        };

        let child = Command::new(binary)
            .args(browser.port_args(port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DriverError::Launch(format!("failed to start '{}': {}", binary.display(), e)))?;

        info!(binary = %binary.display(), port, pid = child.id(), "driver process started");

        let mut process = Self {
            child: Some(child),
            port,
        };
        if let Err(err) = process.wait_ready(startup_timeout) {
            process.shutdown();
            return Err(err);
        }
        Ok(process)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the driver's HTTP endpoint
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn wait_ready(&mut self, startup_timeout: Duration) -> DriverResult<()> {
        let client = WebDriverClient::new(self.url())?;
        let start = Instant::now();

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(DriverError::Launch(format!(
                        "driver exited before becoming ready ({}); is port {} already in use?",
                        status, self.port
                    )));
                }
            }

            match client.status() {
                Ok(true) => {
                    debug!(port = self.port, elapsed = ?start.elapsed(), "driver ready");
                    return Ok(());
                }
                Ok(false) => {}
                Err(err) => debug!(port = self.port, error = %err, "driver not answering yet"),
            }

            if start.elapsed() >= startup_timeout {
                return Err(DriverError::Launch(format!(
                    "driver on port {} not ready after {:?}",
                    self.port, startup_timeout
                )));
            }
            thread::sleep(READY_POLL);
        }
    }

    /// Kill the process. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                // Already exited on its own
                debug!(port = self.port, error = %err, "driver kill failed");
            }
            match child.wait() {
                Ok(status) => debug!(port = self.port, %status, "driver process stopped"),
                Err(err) => warn!(port = self.port, error = %err, "failed to reap driver process"),
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ask the OS for an unused local port
fn free_port() -> DriverResult<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
