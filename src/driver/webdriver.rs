//! W3C WebDriver client.
//!
//! Speaks the JSON-over-HTTP protocol exposed by `chromedriver`,
//! `geckodriver` or a Selenium server. Every call is a blocking request; the
//! `value` member of the response body carries the result or a W3C error
//! object (`{"error": ..., "message": ...}`).

use base64::Engine;
use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};

use super::backend::BrowserBackend;
use super::locator::Locator;
use super::types::{DriverError, DriverResult, ElementHandle};
use crate::config::BrowserKind;

/// Key under which W3C drivers return element references
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Timeout for a single HTTP round trip to the driver
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Server-level WebDriver client (no session yet)
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: Client,
    base_url: String,
}

impl WebDriverClient {
    pub fn new(base_url: impl Into<String>) -> DriverResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /status`: whether the server accepts new sessions
    pub fn status(&self) -> DriverResult<bool> {
        let value = self.command(Method::GET, "/status", None)?;
        Ok(value["ready"].as_bool().unwrap_or(false))
    }

    /// `POST /session`: open a browser session with the given capabilities
    pub fn new_session(&self, capabilities: Value) -> DriverResult<WebDriverBackend> {
        let body = self.request(Method::POST, "/session", Some(capabilities))?;
        // W3C puts sessionId under value; legacy servers put it at the top level
        let session_id = body["value"]["sessionId"]
            .as_str()
            .or_else(|| body["sessionId"].as_str())
            .ok_or_else(|| DriverError::InvalidResponse("new session response has no sessionId".to_string()))?
            .to_string();
        debug!(session_id = %session_id, url = %self.base_url, "webdriver session opened");
        Ok(WebDriverBackend {
            client: self.clone(),
            session_id,
            closed: false,
        })
    }

    /// Send a command and return the `value` member of the response
    pub fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let mut response = self.request(method, path, body)?;
        Ok(response.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        trace!(%method, %url, "webdriver request");

        let mut request = self.http.request(method.clone(), &url);
        if method == Method::POST {
            // Drivers reject body-less POSTs, even for commands without parameters
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        let parsed: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| DriverError::InvalidResponse(format!("{} {}: {}", method, path, e)))?
        };

        if let Some(error) = parsed["value"]["error"].as_str() {
            let message = parsed["value"]["message"].as_str().unwrap_or("");
            return Err(DriverError::from_w3c(status.as_u16(), error, message));
        }
        if !status.is_success() {
            return Err(DriverError::Protocol {
                status: status.as_u16(),
                error: "http error".to_string(),
                message: text,
            });
        }
        Ok(parsed)
    }
}

/// Build `alwaysMatch` capabilities for the requested browser options
pub fn capabilities(browser: BrowserKind, headless: bool, window: (u32, u32)) -> Value {
    let (width, height) = window;
    match browser {
        BrowserKind::Chrome => {
            let mut args = vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                format!("--window-size={},{}", width, height),
            ];
            if headless {
                args.insert(0, "--headless=new".to_string());
                args.push("--disable-gpu".to_string());
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": browser.browser_name(),
                        "goog:chromeOptions": { "args": args }
                    }
                }
            })
        }
        BrowserKind::Firefox => {
            let mut args = vec![
                "-width".to_string(),
                width.to_string(),
                "-height".to_string(),
                height.to_string(),
            ];
            if headless {
                args.insert(0, "-headless".to_string());
            }
            json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": browser.browser_name(),
                        "moz:firefoxOptions": { "args": args }
                    }
                }
            })
        }
    }
}

/// A live WebDriver session
#[derive(Debug)]
pub struct WebDriverBackend {
    client: WebDriverClient,
    session_id: String,
    closed: bool,
}

impl WebDriverBackend {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let path = format!("/session/{}{}", self.session_id, path);
        self.client.command(method, &path, body)
    }

    fn element_command(
        &self,
        method: Method,
        element: &ElementHandle,
        path: &str,
        body: Option<Value>,
    ) -> DriverResult<Value> {
        let path = format!("/element/{}{}", element.id(), path);
        self.session_command(method, &path, body)
    }

    fn string_value(value: Value, what: &str) -> DriverResult<String> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(DriverError::InvalidResponse(format!("{} is not a string: {}", what, other))),
        }
    }

    fn bool_value(value: Value, what: &str) -> DriverResult<bool> {
        value
            .as_bool()
            .ok_or_else(|| DriverError::InvalidResponse(format!("{} is not a boolean: {}", what, value)))
    }
}

impl BrowserBackend for WebDriverBackend {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.session_command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn current_url(&mut self) -> DriverResult<String> {
        let value = self.session_command(Method::GET, "/url", None)?;
        Self::string_value(value, "url")
    }

    fn title(&mut self) -> DriverResult<String> {
        let value = self.session_command(Method::GET, "/title", None)?;
        Self::string_value(value, "title")
    }

    fn page_source(&mut self) -> DriverResult<String> {
        let value = self.session_command(Method::GET, "/source", None)?;
        Self::string_value(value, "source")
    }

    fn find_elements(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        let (using, value) = locator.to_webdriver();
        let result = self.session_command(
            Method::POST,
            "/elements",
            Some(json!({ "using": using, "value": value })),
        )?;
        let items = result
            .as_array()
            .ok_or_else(|| DriverError::InvalidResponse(format!("elements for {} is not an array", locator)))?;
        items
            .iter()
            .map(|item| {
                item[ELEMENT_KEY]
                    .as_str()
                    .map(ElementHandle::new)
                    .ok_or_else(|| DriverError::InvalidResponse(format!("malformed element reference: {}", item)))
            })
            .collect()
    }

    fn is_displayed(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self.element_command(Method::GET, element, "/displayed", None)?;
        Self::bool_value(value, "displayed")
    }

    fn is_enabled(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self.element_command(Method::GET, element, "/enabled", None)?;
        Self::bool_value(value, "enabled")
    }

    fn attribute(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let value = self.element_command(Method::GET, element, &format!("/attribute/{}", name), None)?;
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Ok(Some(other.to_string())),
        }
    }

    fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        let value = self.element_command(Method::GET, element, "/text", None)?;
        Self::string_value(value, "text")
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/click", None)?;
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/clear", None)?;
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/value", Some(json!({ "text": text })))?;
        Ok(())
    }

    fn alert_text(&mut self) -> DriverResult<String> {
        let value = self.session_command(Method::GET, "/alert/text", None)?;
        Self::string_value(value, "alert text")
    }

    fn accept_alert(&mut self) -> DriverResult<()> {
        self.session_command(Method::POST, "/alert/accept", None)?;
        Ok(())
    }

    fn dismiss_alert(&mut self) -> DriverResult<()> {
        self.session_command(Method::POST, "/alert/dismiss", None)?;
        Ok(())
    }

    fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        let value = self.session_command(Method::GET, "/screenshot", None)?;
        let encoded = Self::string_value(value, "screenshot")?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| DriverError::InvalidResponse(format!("screenshot is not base64: {}", e)))
    }

    fn set_window_size(&mut self, width: u32, height: u32) -> DriverResult<()> {
        self.session_command(
            Method::POST,
            "/window/rect",
            Some(json!({ "width": width, "height": height })),
        )?;
        Ok(())
    }

    fn set_implicit_wait(&mut self, wait: Duration) -> DriverResult<()> {
        let millis = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.session_command(Method::POST, "/timeouts", Some(json!({ "implicit": millis })))?;
        Ok(())
    }

    fn quit(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let path = format!("/session/{}", self.session_id);
        self.client.command(Method::DELETE, &path, None)?;
        debug!(session_id = %self.session_id, "webdriver session deleted");
        Ok(())
    }

    fn source_type(&self) -> &str {
        "webdriver"
    }
}
