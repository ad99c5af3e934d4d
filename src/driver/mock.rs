//! Scripted in-memory browser.
//!
//! `MockBrowser` serves pages registered by URL. Elements can start hidden or
//! disabled, appear after a delay measured from page load, and run actions
//! when clicked. The handle is cheap to clone and all clones share state, so a
//! test can hand one clone to a session and inspect the other afterwards.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::backend::BrowserBackend;
use super::locator::{Locator, Strategy};
use super::types::{DriverError, DriverResult, ElementHandle};

/// Size of rendered mock screenshots
const SCREENSHOT_WIDTH: u32 = 640;
const SCREENSHOT_HEIGHT: u32 = 400;

/// Side effect of clicking a mock element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    /// Load another registered page
    Navigate(String),
    /// Make the element with this id visible
    Show(String),
    /// Hide the element with this id
    Hide(String),
    /// Enable the element with this id
    Enable(String),
    /// Open a JavaScript alert with this text
    Alert(String),
    /// Open an alert once the delay has passed
    AlertAfter(String, Duration),
}

/// One element on a mock page
#[derive(Debug, Clone)]
pub struct MockElement {
    tag: String,
    id: Option<String>,
    name: Option<String>,
    classes: Vec<String>,
    text: String,
    attributes: BTreeMap<String, String>,
    value: String,
    displayed: bool,
    enabled: bool,
    present_after: Option<Duration>,
    visible_after: Option<Duration>,
    on_click: Vec<MockAction>,
}

impl MockElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            id: None,
            name: None,
            classes: Vec::new(),
            text: String::new(),
            attributes: BTreeMap::new(),
            value: String::new(),
            displayed: true,
            enabled: true,
            present_after: None,
            visible_after: None,
            on_click: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Initial form value
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Disabled through the `disabled` attribute, as a native control would be
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self.attributes.insert("disabled".to_string(), "true".to_string());
        self
    }

    /// Styled as disabled only; the control still accepts input
    pub fn disabled_class(self) -> Self {
        self.class("disabled")
    }

    pub fn read_only(self) -> Self {
        self.attr("readonly", "true")
    }

    /// Not in the DOM until `delay` after the page loads
    pub fn present_after(mut self, delay: Duration) -> Self {
        self.present_after = Some(delay);
        self
    }

    /// In the DOM but not displayed until `delay` after the page loads
    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = Some(delay);
        self
    }

    pub fn on_click(mut self, action: MockAction) -> Self {
        self.on_click.push(action);
        self
    }

    fn is_present(&self, since_load: Duration) -> bool {
        self.present_after.map(|d| since_load >= d).unwrap_or(true)
    }

    fn is_displayed(&self, since_load: Duration) -> bool {
        self.displayed && self.visible_after.map(|d| since_load >= d).unwrap_or(true)
    }

    fn is_read_only(&self) -> bool {
        self.attributes.get("readonly").map(|v| v != "false").unwrap_or(false)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "name" => self.name.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            "class" => None,
            "value" if matches!(self.tag.as_str(), "input" | "textarea" | "select") => Some(self.value.clone()),
            _ => self.attributes.get(name).cloned(),
        }
    }

    fn label(&self) -> String {
        match (&self.id, self.text.is_empty()) {
            (Some(id), _) => format!("{}#{}", self.tag, id),
            (None, false) => format!("{} '{}'", self.tag, self.text),
            (None, true) => self.tag.clone(),
        }
    }
}

/// A page served by the mock browser
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    title: String,
    elements: Vec<MockElement>,
}

impl MockPage {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
        }
    }

    pub fn element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug)]
struct MockState {
    pages: HashMap<String, MockPage>,
    url: String,
    page: MockPage,
    loaded_at: Instant,
    generation: u64,
    window: Option<(u32, u32)>,
    implicit_wait: Option<Duration>,
    actions: Vec<String>,
    quit_count: usize,
    fail_screenshots: bool,
    /// Open alert text and when it shows up
    alert: Option<(String, Instant)>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            url: "about:blank".to_string(),
            page: MockPage::default(),
            loaded_at: Instant::now(),
            generation: 0,
            window: None,
            implicit_wait: None,
            actions: Vec::new(),
            quit_count: 0,
            fail_screenshots: false,
            alert: None,
        }
    }
}

impl MockState {
    fn load(&mut self, url: &str) {
        self.alert = None;
        self.url = url.to_string();
        self.page = self.pages.get(url).cloned().unwrap_or_default();
        self.loaded_at = Instant::now();
        self.generation += 1;
    }

    fn resolve(&self, element: &ElementHandle) -> DriverResult<usize> {
        let stale = || DriverError::StaleElement(format!("element {} is not attached to the page", element.id()));
        let (generation, index) = element.id().split_once(':').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let index: usize = index.parse().map_err(|_| stale())?;
        let since_load = self.loaded_at.elapsed();
        match self.page.elements.get(index) {
            Some(el) if generation == self.generation && el.is_present(since_load) => Ok(index),
            _ => Err(stale()),
        }
    }

    fn open_alert(&self) -> Option<&str> {
        self.alert
            .as_ref()
            .filter(|(_, opens_at)| Instant::now() >= *opens_at)
            .map(|(text, _)| text.as_str())
    }

    fn take_alert(&mut self) -> DriverResult<String> {
        if self.open_alert().is_none() {
            return Err(DriverError::NoSuchAlert("no alert is open".to_string()));
        }
        Ok(self.alert.take().map(|(text, _)| text).unwrap_or_default())
    }

    fn position_by_id(&self, id: &str) -> Option<usize> {
        self.page.elements.iter().position(|el| el.id.as_deref() == Some(id))
    }

    fn apply(&mut self, action: &MockAction) {
        match action {
            MockAction::Navigate(url) => self.load(url),
            MockAction::Show(id) => {
                if let Some(i) = self.position_by_id(id) {
                    self.page.elements[i].displayed = true;
                    self.page.elements[i].visible_after = None;
                }
            }
            MockAction::Hide(id) => {
                if let Some(i) = self.position_by_id(id) {
                    self.page.elements[i].displayed = false;
                }
            }
            MockAction::Enable(id) => {
                if let Some(i) = self.position_by_id(id) {
                    self.page.elements[i].enabled = true;
                    self.page.elements[i].attributes.remove("disabled");
                }
            }
            MockAction::Alert(text) => self.alert = Some((text.clone(), Instant::now())),
            MockAction::AlertAfter(text, delay) => self.alert = Some((text.clone(), Instant::now() + *delay)),
        }
    }
}

/// Cloneable handle to a scripted browser
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page served at `url`
    pub fn with_page(self, url: impl Into<String>, page: MockPage) -> Self {
        self.state().pages.insert(url.into(), page);
        self
    }

    /// Make every screenshot request fail, as a crashed browser would
    pub fn failing_screenshots(self) -> Self {
        self.state().fail_screenshots = true;
        self
    }

    /// Every interaction so far, e.g. `navigate https://x/login`, `click id=submit`
    pub fn actions(&self) -> Vec<String> {
        self.state().actions.clone()
    }

    pub fn quit_count(&self) -> usize {
        self.state().quit_count
    }

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.state().window
    }

    pub fn implicit_wait(&self) -> Option<Duration> {
        self.state().implicit_wait
    }

    /// Current form value of the element with the given id
    pub fn value_of(&self, id: &str) -> Option<String> {
        let state = self.state();
        state.position_by_id(id).map(|i| state.page.elements[i].value.clone())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_element<T>(
        &self,
        element: &ElementHandle,
        f: impl FnOnce(&MockElement, Duration) -> T,
    ) -> DriverResult<T> {
        let state = self.state();
        let index = state.resolve(element)?;
        Ok(f(&state.page.elements[index], state.loaded_at.elapsed()))
    }

    /// Check that the element can take input, returning its index
    fn interactable(state: &MockState, element: &ElementHandle) -> DriverResult<usize> {
        if let Some(text) = state.open_alert() {
            return Err(DriverError::from_w3c(400, "unexpected alert open", text));
        }
        let index = state.resolve(element)?;
        let el = &state.page.elements[index];
        if !el.is_displayed(state.loaded_at.elapsed()) {
            return Err(DriverError::NotInteractable(format!("{} is not displayed", el.label())));
        }
        if !el.enabled {
            return Err(DriverError::NotInteractable(format!("{} is disabled", el.label())));
        }
        Ok(index)
    }
}

impl BrowserBackend for MockBrowser {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let mut state = self.state();
        state.actions.push(format!("navigate {}", url));
        state.load(url);
        Ok(())
    }

    fn current_url(&mut self) -> DriverResult<String> {
        Ok(self.state().url.clone())
    }

    fn title(&mut self) -> DriverResult<String> {
        Ok(self.state().page.title.clone())
    }

    fn page_source(&mut self) -> DriverResult<String> {
        let state = self.state();
        let since_load = state.loaded_at.elapsed();
        let mut html = format!("<html><head><title>{}</title></head><body>\n", state.page.title);
        for el in state.page.elements.iter().filter(|el| el.is_present(since_load)) {
            html.push_str(&format!("<{}", el.tag));
            for name in ["id", "name", "class"] {
                if let Some(value) = el.attribute(name) {
                    html.push_str(&format!(" {}=\"{}\"", name, value));
                }
            }
            for (name, value) in &el.attributes {
                html.push_str(&format!(" {}=\"{}\"", name, value));
            }
            html.push_str(&format!(">{}</{}>\n", el.text, el.tag));
        }
        html.push_str("</body></html>");
        Ok(html)
    }

    fn find_elements(&mut self, locator: &Locator) -> DriverResult<Vec<ElementHandle>> {
        let matcher = Matcher::compile(locator)?;
        let state = self.state();
        let since_load = state.loaded_at.elapsed();
        Ok(state
            .page
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.is_present(since_load) && matcher.matches(el))
            .map(|(i, _)| ElementHandle::new(format!("{}:{}", state.generation, i)))
            .collect())
    }

    fn is_displayed(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.with_element(element, |el, since_load| el.is_displayed(since_load))
    }

    fn is_enabled(&mut self, element: &ElementHandle) -> DriverResult<bool> {
        self.with_element(element, |el, _| el.enabled)
    }

    fn attribute(&mut self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        self.with_element(element, |el, _| el.attribute(name))
    }

    fn text(&mut self, element: &ElementHandle) -> DriverResult<String> {
        self.with_element(element, |el, since_load| {
            // Hidden elements render no text, as in a real browser
            if el.is_displayed(since_load) { el.text.clone() } else { String::new() }
        })
    }

    fn click(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let mut state = self.state();
        let index = Self::interactable(&state, element)?;
        let label = state.page.elements[index].label();
        let actions = state.page.elements[index].on_click.clone();
        state.actions.push(format!("click {}", label));
        for action in &actions {
            state.apply(action);
        }
        Ok(())
    }

    fn clear(&mut self, element: &ElementHandle) -> DriverResult<()> {
        let mut state = self.state();
        let index = Self::interactable(&state, element)?;
        if state.page.elements[index].is_read_only() {
            return Err(DriverError::NotInteractable(format!(
                "invalid element state: {} is read-only",
                state.page.elements[index].label()
            )));
        }
        let label = state.page.elements[index].label();
        state.page.elements[index].value.clear();
        state.actions.push(format!("clear {}", label));
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementHandle, text: &str) -> DriverResult<()> {
        let mut state = self.state();
        let index = Self::interactable(&state, element)?;
        if state.page.elements[index].is_read_only() {
            return Err(DriverError::NotInteractable(format!(
                "{} is read-only",
                state.page.elements[index].label()
            )));
        }
        let label = state.page.elements[index].label();
        state.page.elements[index].value.push_str(text);
        state.actions.push(format!("type {} {}", label, text));
        Ok(())
    }

    fn alert_text(&mut self) -> DriverResult<String> {
        self.state()
            .open_alert()
            .map(str::to_string)
            .ok_or_else(|| DriverError::NoSuchAlert("no alert is open".to_string()))
    }

    fn accept_alert(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        let text = state.take_alert()?;
        state.actions.push(format!("accept alert '{}'", text));
        Ok(())
    }

    fn dismiss_alert(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        let text = state.take_alert()?;
        state.actions.push(format!("dismiss alert '{}'", text));
        Ok(())
    }

    fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        let state = self.state();
        if state.fail_screenshots {
            return Err(DriverError::Protocol {
                status: 500,
                error: "unknown error".to_string(),
                message: "screenshot unavailable".to_string(),
            });
        }
        let since_load = state.loaded_at.elapsed();

        let mut fb = Framebuffer::with_color(SCREENSHOT_WIDTH, SCREENSHOT_HEIGHT, [255, 255, 255]);
        fb.draw_rect(0, 0, SCREENSHOT_WIDTH, 24, [60, 60, 60]);
        fb.draw_text(8, 8, &state.url, [255, 255, 255], [60, 60, 60]);
        fb.draw_text(8, 36, &state.page.title, [0, 0, 0], [255, 255, 255]);

        let mut y = 60;
        for el in state.page.elements.iter().filter(|el| el.is_present(since_load) && el.is_displayed(since_load)) {
            if y + 8 > SCREENSHOT_HEIGHT {
                break;
            }
            let line = if el.text.is_empty() { format!("[{}] {}", el.label(), el.value) } else { el.text.clone() };
            let fg = if el.enabled { [0, 0, 0] } else { [150, 150, 150] };
            fb.draw_text(16, y, &line, fg, [255, 255, 255]);
            y += 14;
        }
        fb.to_png()
    }

    fn set_window_size(&mut self, width: u32, height: u32) -> DriverResult<()> {
        self.state().window = Some((width, height));
        Ok(())
    }

    fn set_implicit_wait(&mut self, wait: Duration) -> DriverResult<()> {
        self.state().implicit_wait = Some(wait);
        Ok(())
    }

    fn quit(&mut self) -> DriverResult<()> {
        let mut state = self.state();
        state.quit_count += 1;
        state.actions.push("quit".to_string());
        Ok(())
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Locator evaluation
// =============================================================================

/// A single attribute constraint from CSS or XPath
#[derive(Debug, Clone)]
enum AttrTest {
    Exists(String),
    Equals(String, String),
    Contains(String, String),
    /// Whitespace-separated token, as CSS `.class` matches
    Token(String, String),
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    attrs: Vec<AttrTest>,
    text_equals: Option<String>,
    text_contains: Option<String>,
}

impl Compound {
    fn matches(&self, el: &MockElement) -> bool {
        if let Some(tag) = &self.tag {
            if !tag.eq_ignore_ascii_case(&el.tag) {
                return false;
            }
        }
        if let Some(text) = &self.text_equals {
            if el.text.trim() != text {
                return false;
            }
        }
        if let Some(text) = &self.text_contains {
            if !el.text.contains(text.as_str()) {
                return false;
            }
        }
        self.attrs.iter().all(|test| match test {
            AttrTest::Exists(name) => el.attribute(name).is_some(),
            AttrTest::Equals(name, value) => el.attribute(name).as_deref() == Some(value.as_str()),
            AttrTest::Contains(name, value) => el
                .attribute(name)
                .map(|v| v.contains(value.as_str()))
                .unwrap_or(false),
            AttrTest::Token(name, value) => el
                .attribute(name)
                .map(|v| v.split_whitespace().any(|t| t == value))
                .unwrap_or(false),
        })
    }
}

enum Matcher {
    Compound(Compound),
    Class(String),
    LinkText { text: String, partial: bool },
}

impl Matcher {
    fn compile(locator: &Locator) -> DriverResult<Self> {
        let value = locator.value.clone();
        Ok(match locator.by {
            Strategy::Id => Matcher::Compound(Compound {
                attrs: vec![AttrTest::Equals("id".to_string(), value)],
                ..Default::default()
            }),
            Strategy::Name => Matcher::Compound(Compound {
                attrs: vec![AttrTest::Equals("name".to_string(), value)],
                ..Default::default()
            }),
            Strategy::ClassName => Matcher::Class(value),
            Strategy::TagName => Matcher::Compound(Compound {
                tag: Some(value),
                ..Default::default()
            }),
            Strategy::Text => Matcher::Compound(Compound {
                text_equals: Some(value),
                ..Default::default()
            }),
            Strategy::LinkText => Matcher::LinkText { text: value, partial: false },
            Strategy::PartialLinkText => Matcher::LinkText { text: value, partial: true },
            Strategy::Css => Matcher::Compound(parse_css(&value)?),
            Strategy::Xpath => Matcher::Compound(parse_xpath(&value)?),
        })
    }

    fn matches(&self, el: &MockElement) -> bool {
        match self {
            Matcher::Compound(compound) => compound.matches(el),
            Matcher::Class(class) => el.classes.iter().any(|c| c == class),
            Matcher::LinkText { text, partial } => {
                el.tag == "a" && if *partial { el.text.contains(text.as_str()) } else { el.text.trim() == text }
            }
        }
    }
}

static CSS_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:#([\w-]+)|\.([\w-]+)|\[\s*([\w-]+)\s*(?:([*]?=)\s*(?:"([^"]*)"|'([^']*)'|([^\]\s]*))\s*)?\])"#)
        .expect("css token pattern")
});

/// Single compound selector: `tag#id.class[attr='v'][attr*='v']`
fn parse_css(selector: &str) -> DriverResult<Compound> {
    let invalid = || DriverError::InvalidSelector(format!("mock browser cannot evaluate css '{}'", selector));
    let selector = selector.trim();
    let mut compound = Compound::default();

    let tag_end = selector
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '*'))
        .unwrap_or(selector.len());
    let tag = &selector[..tag_end];
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag.to_string());
    }

    let mut rest = &selector[tag_end..];
    while !rest.is_empty() {
        let caps = CSS_TOKEN.captures(rest).ok_or_else(invalid)?;
        if let Some(id) = caps.get(1) {
            compound.attrs.push(AttrTest::Equals("id".to_string(), id.as_str().to_string()));
        } else if let Some(class) = caps.get(2) {
            compound.attrs.push(AttrTest::Token("class".to_string(), class.as_str().to_string()));
        } else if let Some(name) = caps.get(3) {
            let name = name.as_str().to_string();
            let value = caps.get(5).or(caps.get(6)).or(caps.get(7)).map(|m| m.as_str().to_string());
            match (caps.get(4).map(|m| m.as_str()), value) {
                (Some("*="), Some(value)) => compound.attrs.push(AttrTest::Contains(name, value)),
                (Some(_), Some(value)) => compound.attrs.push(AttrTest::Equals(name, value)),
                _ => compound.attrs.push(AttrTest::Exists(name)),
            }
        }
        rest = &rest[caps[0].len()..];
    }
    Ok(compound)
}

static XPATH_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^//([\w-]+|\*)((?:\[[^\[\]]*\])*)$").expect("xpath path pattern"));

static XPATH_PREDICATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:(text\(\)|\.|@[\w-]+)\s*=\s*(?:'([^']*)'|"([^"]*)")|contains\(\s*(text\(\)|\.|@[\w-]+)\s*,\s*(?:'([^']*)'|"([^"]*)")\s*\))$"#,
    )
    .expect("xpath predicate pattern")
});

/// XPath subset: `//tag[pred][pred]` where each predicate compares `text()`,
/// `.` or `@attr` by equality or `contains()`
fn parse_xpath(expr: &str) -> DriverResult<Compound> {
    let invalid = || DriverError::InvalidSelector(format!("mock browser cannot evaluate xpath '{}'", expr));
    let caps = XPATH_PATH.captures(expr.trim()).ok_or_else(invalid)?;
    let mut compound = Compound::default();
    if &caps[1] != "*" {
        compound.tag = Some(caps[1].to_string());
    }

    let predicates = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    for predicate in predicates.split(']').filter(|p| !p.is_empty()) {
        let body = predicate.trim_start_matches('[').trim();
        let pred = XPATH_PREDICATE.captures(body).ok_or_else(invalid)?;
        if let Some(subject) = pred.get(1) {
            let value = pred.get(2).or(pred.get(3)).map(|m| m.as_str()).unwrap_or("").to_string();
            match subject.as_str() {
                "text()" | "." => compound.text_equals = Some(value),
                attr => compound
                    .attrs
                    .push(AttrTest::Equals(attr.trim_start_matches('@').to_string(), value)),
            }
        } else if let Some(subject) = pred.get(4) {
            let value = pred.get(5).or(pred.get(6)).map(|m| m.as_str()).unwrap_or("").to_string();
            match subject.as_str() {
                "text()" | "." => compound.text_contains = Some(value),
                attr => compound
                    .attrs
                    .push(AttrTest::Contains(attr.trim_start_matches('@').to_string(), value)),
            }
        }
    }
    Ok(compound)
}

// =============================================================================
// Screenshot rendering
// =============================================================================

/// RGB framebuffer with font8x8 text, encoded to PNG for mock screenshots
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
}

impl Framebuffer {
    pub fn with_color(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut buffer = vec![0u8; (width * height * 3) as usize];
        for chunk in buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
        Self { width, height, buffer }
    }

    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Each character is 8x8 pixels. Text is clipped at the right edge.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x + 8 > self.width {
                break;
            }
            let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
            for (row_idx, row) in glyph.iter().enumerate() {
                for bit in 0..8 {
                    // font8x8 stores LSB as leftmost pixel
                    let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                    self.set_pixel(cursor_x + bit, y + row_idx as u32, color);
                }
            }
            cursor_x += 8;
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = ((y * self.width + x) * 3) as usize;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    pub fn to_png(&self) -> DriverResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| DriverError::InvalidResponse("framebuffer size mismatch".to_string()))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| DriverError::InvalidResponse(format!("failed to encode PNG: {}", e)))?;
        Ok(bytes)
    }
}
