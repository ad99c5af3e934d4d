// Core types shared by every browser backend

use serde::{Deserialize, Serialize};

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by a browser backend
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No element matched a lookup that required one
    #[error("no such element: {0}")]
    NoSuchElement(String),

    /// Element handle no longer attached to the page
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// Element exists but cannot receive the interaction
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// Alert command issued while no alert is open
    #[error("no such alert: {0}")]
    NoSuchAlert(String),

    /// Locator could not be evaluated
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Driver binary could not be started or never became ready
    #[error("driver launch failed: {0}")]
    Launch(String),

    /// Any other W3C error response
    #[error("webdriver error '{error}' (HTTP {status}): {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    /// Response did not have the expected shape
    #[error("invalid driver response: {0}")]
    InvalidResponse(String),

    /// Transport failure talking to the driver
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Errors that mean "the DOM is not ready yet" while polling
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::NoSuchElement(_) | DriverError::StaleElement(_))
    }

    /// Map a W3C error code to a typed error
    pub fn from_w3c(status: u16, error: &str, message: &str) -> Self {
        match error {
            "no such element" => DriverError::NoSuchElement(message.to_string()),
            "stale element reference" => DriverError::StaleElement(message.to_string()),
            "element not interactable" | "element click intercepted" | "invalid element state" => {
                DriverError::NotInteractable(format!("{}: {}", error, message))
            }
            "invalid selector" => DriverError::InvalidSelector(message.to_string()),
            "no such alert" => DriverError::NoSuchAlert(message.to_string()),
            _ => DriverError::Protocol {
                status,
                error: error.to_string(),
                message: message.to_string(),
            },
        }
    }
}

/// Opaque reference to an element inside one browser session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Backend-specific element id
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_w3c_error_mapping() {
        assert!(matches!(
            DriverError::from_w3c(404, "no such element", "gone"),
            DriverError::NoSuchElement(_)
        ));
        assert!(matches!(
            DriverError::from_w3c(400, "element click intercepted", "overlay"),
            DriverError::NotInteractable(_)
        ));
        assert!(matches!(
            DriverError::from_w3c(404, "no such alert", "no open dialog"),
            DriverError::NoSuchAlert(_)
        ));
        match DriverError::from_w3c(500, "unknown error", "boom") {
            DriverError::Protocol { status, error, .. } => {
                assert_eq!(status, 500);
                assert_eq!(error, "unknown error");
            }
            other => panic!("unexpected mapping: {:?}", other),
        }
    }

    #[test]
    fn test_transient_errors() {
        assert!(DriverError::StaleElement("x".into()).is_transient());
        assert!(DriverError::NoSuchElement("x".into()).is_transient());
        assert!(!DriverError::Launch("x".into()).is_transient());
        assert!(!DriverError::NoSuchAlert("x".into()).is_transient());
    }
}
