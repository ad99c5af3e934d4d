//! Browser session management.
//!
//! A [`Session`] owns one browser backend and, when the harness started the
//! driver itself, the driver process. Release is idempotent and also runs on
//! drop, so a session acquired in a scope is released on every exit path,
//! including early returns and panics in the scenario body.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::{self, BrowserKind};
use crate::driver::{BrowserBackend, DriverProcess, WebDriverClient, capabilities};
use crate::harness::{HarnessError, HarnessResult};

/// Options for acquiring a browser session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub browser: BrowserKind,
    pub headless: bool,
    /// Window size in pixels (width, height)
    pub window_size: (u32, u32),
    pub implicit_wait: Duration,
    /// Base for relative navigation
    pub base_url: Option<String>,
    /// Driver binary to spawn; `None` picks the one matching `browser`
    pub driver_path: Option<PathBuf>,
    /// Fixed port for the spawned driver
    pub driver_port: Option<u16>,
    /// Connect to this WebDriver server instead of spawning one
    pub remote_url: Option<String>,
    pub startup_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            browser: cfg.driver.browser,
            headless: cfg.browser.headless,
            window_size: (cfg.browser.window_width, cfg.browser.window_height),
            implicit_wait: Duration::from_millis(cfg.browser.implicit_wait_ms),
            base_url: cfg.browser.base_url.clone(),
            driver_path: cfg.driver.binary.as_ref().map(PathBuf::from),
            driver_port: cfg.driver.port,
            remote_url: cfg.driver.remote_url.clone(),
            startup_timeout: Duration::from_secs(cfg.driver.startup_timeout),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = (width, height);
        self
    }

    pub fn implicit_wait(mut self, wait: Duration) -> Self {
        self.implicit_wait = wait;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn browser(mut self, browser: BrowserKind) -> Self {
        self.browser = browser;
        self
    }

    pub fn driver_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.driver_path = Some(path.into());
        self
    }

    /// The driver binary `acquire` spawns
    pub fn driver_binary(&self) -> PathBuf {
        self.driver_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.browser.default_driver()))
    }

    pub fn driver_port(mut self, port: u16) -> Self {
        self.driver_port = Some(port);
        self
    }

    pub fn remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

/// A live handle to a remote-controlled browser
pub struct Session {
    /// Unique session ID
    pub id: String,
    config: SessionConfig,
    backend: Option<Box<dyn BrowserBackend>>,
    process: Option<DriverProcess>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("source", &self.backend.as_ref().map(|b| b.source_type().to_string()))
            .field("released", &self.is_released())
            .finish()
    }
}

impl Session {
    /// Start (or connect to) a WebDriver server and open a browser session.
    ///
    /// Any failure here is a `SessionAcquisition` error; a driver process
    /// started along the way is stopped before returning.
    pub fn acquire(config: &SessionConfig) -> HarnessResult<Self> {
        let (process, server_url) = match &config.remote_url {
            Some(url) => (None, url.clone()),
            None => {
                let process = DriverProcess::launch(
                    &config.driver_binary(),
                    config.browser,
                    config.driver_port,
                    config.startup_timeout,
                )
                .map_err(HarnessError::SessionAcquisition)?;
                let url = process.url();
                (Some(process), url)
            }
        };

        let client = WebDriverClient::new(&server_url).map_err(HarnessError::SessionAcquisition)?;
        let caps = capabilities(config.browser, config.headless, config.window_size);
        // `process` drops (and is killed) if the session request fails
        let backend = client.new_session(caps).map_err(HarnessError::SessionAcquisition)?;

        info!(server = %server_url, session_id = %backend.session_id(), "browser session acquired");
        Self::assemble(Box::new(backend), process, config)
    }

    /// Wrap an existing backend, applying window size and implicit wait
    pub fn with_backend(backend: Box<dyn BrowserBackend>, config: &SessionConfig) -> HarnessResult<Self> {
        Self::assemble(backend, None, config)
    }

    fn assemble(
        backend: Box<dyn BrowserBackend>,
        process: Option<DriverProcess>,
        config: &SessionConfig,
    ) -> HarnessResult<Self> {
        let mut session = Self {
            id: generate_session_id(),
            config: config.clone(),
            backend: Some(backend),
            process,
        };

        let (width, height) = config.window_size;
        let setup = session.browser().and_then(|browser| {
            browser.set_window_size(width, height)?;
            browser.set_implicit_wait(config.implicit_wait)?;
            Ok(())
        });
        if let Err(err) = setup {
            // Dropping `session` releases what was acquired so far
            return Err(match err {
                HarnessError::Driver(driver) => HarnessError::SessionAcquisition(driver),
                other => other,
            });
        }

        debug!(session = %session.id, width, height, "session configured");
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The live backend, or `SessionClosed` after release
    pub fn browser(&mut self) -> HarnessResult<&mut dyn BrowserBackend> {
        match self.backend.as_mut() {
            Some(backend) => Ok(&mut **backend),
            None => Err(HarnessError::SessionClosed),
        }
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none() && self.process.is_none()
    }

    /// Quit the browser and stop the driver process. Calling this again is a
    /// no-op.
    pub fn release(&mut self) -> HarnessResult<()> {
        if self.is_released() {
            return Ok(());
        }
        let mut result = Ok(());
        if let Some(mut backend) = self.backend.take() {
            if let Err(err) = backend.quit() {
                warn!(session = %self.id, error = %err, "browser quit failed");
                result = Err(HarnessError::Driver(err));
            }
        }
        if let Some(mut process) = self.process.take() {
            process.shutdown();
        }
        if result.is_ok() {
            info!(session = %self.id, "browser session released");
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            debug!(session = %self.id, error = %err, "release on drop failed");
        }
    }
}

/// Acquire a session, run `body`, and release the session whatever happens
pub fn with_session<T, F>(config: &SessionConfig, body: F) -> HarnessResult<T>
where
    F: FnOnce(&mut Session) -> HarnessResult<T>,
{
    let session = Session::acquire(config)?;
    scoped(session, body)
}

/// `with_session` over an already constructed backend
pub fn with_backend_session<T, F>(backend: Box<dyn BrowserBackend>, config: &SessionConfig, body: F) -> HarnessResult<T>
where
    F: FnOnce(&mut Session) -> HarnessResult<T>,
{
    let session = Session::with_backend(backend, config)?;
    scoped(session, body)
}

fn scoped<T, F>(mut session: Session, body: F) -> HarnessResult<T>
where
    F: FnOnce(&mut Session) -> HarnessResult<T>,
{
    // A panic in `body` unwinds through `session`'s Drop, which releases it
    let outcome = body(&mut session);
    let released = session.release();
    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), _) => Err(err),
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    format!("session_{}_{}_{}", timestamp, std::process::id(), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockBrowser;

    fn config() -> SessionConfig {
        SessionConfig::new().window_size(1024, 768).implicit_wait(Duration::from_millis(500))
    }

    #[test]
    fn test_with_backend_applies_config() {
        let probe = MockBrowser::new();
        let session = Session::with_backend(Box::new(probe.clone()), &config()).unwrap();
        assert!(session.id.starts_with("session_"));
        assert_eq!(probe.window_size(), Some((1024, 768)));
        assert_eq!(probe.implicit_wait(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_release_is_idempotent() {
        let probe = MockBrowser::new();
        let mut session = Session::with_backend(Box::new(probe.clone()), &config()).unwrap();
        session.release().unwrap();
        session.release().unwrap();
        drop(session);
        assert_eq!(probe.quit_count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let probe = MockBrowser::new();
        {
            let _session = Session::with_backend(Box::new(probe.clone()), &config()).unwrap();
        }
        assert_eq!(probe.quit_count(), 1);
    }

    #[test]
    fn test_released_session_is_closed() {
        let mut session = Session::with_backend(Box::new(MockBrowser::new()), &config()).unwrap();
        session.release().unwrap();
        assert!(session.is_released());
        assert!(matches!(session.browser(), Err(HarnessError::SessionClosed)));
    }

    #[test]
    fn test_driver_binary_follows_browser() {
        let firefox = SessionConfig::new().browser(BrowserKind::Firefox);
        let firefox = SessionConfig { driver_path: None, ..firefox };
        assert_eq!(firefox.driver_binary(), PathBuf::from("geckodriver"));
        assert_eq!(
            firefox.clone().browser(BrowserKind::Chrome).driver_binary(),
            PathBuf::from("chromedriver")
        );
        let pinned = firefox.driver_path("/opt/drivers/geckodriver-0.34");
        assert_eq!(pinned.driver_binary(), PathBuf::from("/opt/drivers/geckodriver-0.34"));
        assert_eq!(pinned.browser(BrowserKind::Chrome).driver_binary(), PathBuf::from("/opt/drivers/geckodriver-0.34"));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
