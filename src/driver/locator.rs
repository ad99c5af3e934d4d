//! Element locators.
//!
//! A [`Locator`] is an immutable `(strategy, value)` pair. WebDriver only
//! understands five strategies natively, so the convenience strategies are
//! rewritten into CSS or XPath before they reach the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How to find an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    Name,
    ClassName,
    Css,
    Xpath,
    LinkText,
    PartialLinkText,
    TagName,
    /// Exact visible text of the element
    Text,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::ClassName => "class_name",
            Strategy::Css => "css",
            Strategy::Xpath => "xpath",
            Strategy::LinkText => "link_text",
            Strategy::PartialLinkText => "partial_link_text",
            Strategy::TagName => "tag_name",
            Strategy::Text => "text",
        }
    }
}

/// A rule for finding one UI element within a rendered page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub by: Strategy,
    pub value: String,
}

impl Locator {
    pub fn new(by: Strategy, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::new(Strategy::Name, value)
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, value)
    }

    pub fn css(value: impl Into<String>) -> Self {
        Self::new(Strategy::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::Xpath, value)
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, value)
    }

    pub fn partial_link_text(value: impl Into<String>) -> Self {
        Self::new(Strategy::PartialLinkText, value)
    }

    pub fn tag_name(value: impl Into<String>) -> Self {
        Self::new(Strategy::TagName, value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Strategy::Text, value)
    }

    /// The `(using, value)` pair sent to a W3C `/elements` command
    pub fn to_webdriver(&self) -> (&'static str, String) {
        match self.by {
            Strategy::Id => ("css selector", format!("[id={}]", css_string(&self.value))),
            Strategy::Name => ("css selector", format!("[name={}]", css_string(&self.value))),
            Strategy::ClassName => ("css selector", format!(".{}", self.value.trim())),
            Strategy::Css => ("css selector", self.value.clone()),
            Strategy::Xpath => ("xpath", self.value.clone()),
            Strategy::LinkText => ("link text", self.value.clone()),
            Strategy::PartialLinkText => ("partial link text", self.value.clone()),
            Strategy::TagName => ("tag name", self.value.clone()),
            Strategy::Text => ("xpath", format!("//*[text()={}]", xpath_literal(&self.value))),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.by.as_str(), self.value)
    }
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// XPath 1.0 has no escapes, so mixed quotes need `concat()`
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
