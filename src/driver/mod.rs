pub mod backend;
pub mod locator;
pub mod mock;
pub mod process;
pub mod types;
pub mod webdriver;

pub use backend::BrowserBackend;
pub use locator::{Locator, Strategy};
pub use mock::{Framebuffer, MockAction, MockBrowser, MockElement, MockPage};
pub use process::DriverProcess;
pub use types::{DriverError, DriverResult, ElementHandle};
pub use webdriver::{ELEMENT_KEY, WebDriverBackend, WebDriverClient, capabilities};
