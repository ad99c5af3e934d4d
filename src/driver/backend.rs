//! Browser backend abstraction.
//!
//! This module provides a unified interface over different ways of driving a
//! browser:
//! - `WebDriverBackend` for real browsers over the W3C WebDriver protocol
//! - `MockBrowser` for tests and demos with scripted in-memory pages

use std::time::Duration;

use super::locator::Locator;
use super::types::{DriverResult, ElementHandle};

/// Trait for browser backends
///
/// Every call blocks until the browser answers. Implementations are owned by a
/// single session, so methods take `&mut self`.
pub trait BrowserBackend: Send {
    /// Load a URL in the current window
    fn navigate(&mut self, url: &str) -> DriverResult<()>;

    fn current_url(&mut self) -> DriverResult<String>;

    fn title(&mut self) -> DriverResult<String>;

    /// Serialized DOM of the current page
    fn page_source(&mut self) -> DriverResult<String>;

    /// All elements matching the locator, in document order. No match is an
    /// empty list, not an error.
    fn find_elements(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>>;

    fn is_displayed(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    fn is_enabled(&mut self, element: &ElementHandle) -> DriverResult<bool>;

    /// Attribute value, `None` when absent
    fn attribute(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>>;

    /// Rendered text of the element
    fn text(&mut self, element: &ElementHandle) -> DriverResult<String>;

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()>;

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()>;

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()>;

    /// Text of the open JavaScript alert, `NoSuchAlert` when none is open
    fn alert_text(&mut self) -> DriverResult<String>;

    fn accept_alert(&mut self) -> DriverResult<()>;

    fn dismiss_alert(&mut self) -> DriverResult<()>;

    /// PNG-encoded capture of the viewport
    fn screenshot(&mut self) -> DriverResult<Vec<u8>>;

    fn set_window_size(&mut self, width: u32, height: u32) -> DriverResult<()>;

    fn set_implicit_wait(&mut self, wait: Duration) -> DriverResult<()>;

    /// End the browser session. Called once by the owning session.
    fn quit(&mut self) -> DriverResult<()>;

    /// Get the source type identifier (e.g., "webdriver", "mock")
    fn source_type(&self) -> &str;
}
