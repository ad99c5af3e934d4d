//! Integration tests for the WebDriver HTTP boundary against a mock server

use base64::Engine;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

use web_harness::driver::{Framebuffer, ELEMENT_KEY};
use web_harness::{
    BrowserBackend, DriverError, HarnessError, Locator, Scenario, ScenarioRunner, Session, SessionConfig, Step,
    Waiter, run_scenario,
};

const SESSION: &str = "/session/abc123";

fn remote_config(server: &MockServer) -> SessionConfig {
    SessionConfig::new()
        .remote_url(server.base_url())
        .window_size(1280, 800)
        .implicit_wait(Duration::ZERO)
}

/// New session, window size and timeouts: everything acquisition needs
fn mock_session_setup(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(200)
            .json_body(json!({ "value": { "sessionId": "abc123", "capabilities": { "browserName": "chrome" } } }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/window/rect", SESSION))
            .json_body(json!({ "width": 1280, "height": 800 }));
        then.status(200)
            .json_body(json!({ "value": { "x": 0, "y": 0, "width": 1280, "height": 800 } }));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/timeouts", SESSION))
            .json_body(json!({ "implicit": 0 }));
        then.status(200).json_body(json!({ "value": null }));
    });
}

fn element(id: &str) -> serde_json::Value {
    json!({ ELEMENT_KEY: id })
}

fn png_base64() -> String {
    let png = Framebuffer::with_color(8, 6, [10, 20, 30]).to_png().unwrap();
    base64::engine::general_purpose::STANDARD.encode(png)
}

#[test]
fn test_acquire_and_release_over_remote_server() {
    let server = MockServer::start();
    mock_session_setup(&server);
    let delete = server.mock(|when, then| {
        when.method(DELETE).path(SESSION);
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut session = Session::acquire(&remote_config(&server)).unwrap();
    session.release().unwrap();
    session.release().unwrap();
    drop(session);

    delete.assert_hits(1);
}

#[test]
fn test_rejected_session_is_acquisition_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(500).json_body(json!({
            "value": { "error": "session not created", "message": "Chrome failed to start", "stacktrace": "" }
        }));
    });

    let err = Session::acquire(&remote_config(&server)).unwrap_err();
    match err {
        HarnessError::SessionAcquisition(DriverError::Protocol { status, error, message }) => {
            assert_eq!(status, 500);
            assert_eq!(error, "session not created");
            assert_eq!(message, "Chrome failed to start");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_element_commands() {
    let server = MockServer::start();
    mock_session_setup(&server);
    server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/elements", SESSION))
            .json_body(json!({ "using": "css selector", "value": "[id=\"email\"]" }));
        then.status(200).json_body(json!({ "value": [element("e-1")] }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/element/e-1/displayed", SESSION));
        then.status(200).json_body(json!({ "value": true }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/element/e-1/attribute/placeholder", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });
    let typed = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{}/element/e-1/value", SESSION))
            .json_body(json!({ "text": "a@b.com" }));
        then.status(200).json_body(json!({ "value": null }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/screenshot", SESSION));
        then.status(200).json_body(json!({ "value": png_base64() }));
    });
    server.mock(|when, then| {
        when.method(DELETE).path(SESSION);
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut session = Session::acquire(&remote_config(&server)).unwrap();
    let browser = session.browser().unwrap();

    let found = browser.find_elements(&Locator::id("email")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), "e-1");
    assert!(browser.is_displayed(&found[0]).unwrap());
    assert_eq!(browser.attribute(&found[0], "placeholder").unwrap(), None);
    browser.send_keys(&found[0], "a@b.com").unwrap();
    typed.assert();

    let png = browser.screenshot().unwrap();
    assert_eq!(&png[1..4], b"PNG");
}

#[test]
fn test_transient_errors_keep_waiting() {
    let server = MockServer::start();
    mock_session_setup(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/elements", SESSION));
        then.status(200).json_body(json!({ "value": [element("gone")] }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/element/gone/displayed", SESSION));
        then.status(404).json_body(json!({
            "value": { "error": "stale element reference", "message": "element is not attached", "stacktrace": "" }
        }));
    });
    server.mock(|when, then| {
        when.method(DELETE).path(SESSION);
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut session = Session::acquire(&remote_config(&server)).unwrap();
    let timeout = Duration::from_millis(150);
    let err = Waiter::new()
        .with_poll_interval(Duration::from_millis(30))
        .wait_for(&mut session, &Locator::css("#banner"), web_harness::ConditionKind::Visible, timeout)
        .unwrap_err();
    match err {
        HarnessError::WaitTimeout { elapsed, .. } => assert!(elapsed >= timeout),
        other => panic!("stale element should read as not yet, got {:?}", other),
    }
}

#[test]
fn test_intercepted_click_fails_scenario_with_diagnostics() {
    let server = MockServer::start();
    mock_session_setup(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/url", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/elements", SESSION));
        then.status(200).json_body(json!({ "value": [element("btn")] }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/element/btn/displayed", SESSION));
        then.status(200).json_body(json!({ "value": true }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/element/btn/enabled", SESSION));
        then.status(200).json_body(json!({ "value": true }));
    });
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/element/btn/click", SESSION));
        then.status(400).json_body(json!({
            "value": {
                "error": "element click intercepted",
                "message": "Other element would receive the click: <div class=\"overlay\">",
                "stacktrace": ""
            }
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/screenshot", SESSION));
        then.status(200).json_body(json!({ "value": png_base64() }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/url", SESSION));
        then.status(200).json_body(json!({ "value": "http://app.test/checkout" }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/title", SESSION));
        then.status(200).json_body(json!({ "value": "Checkout" }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/source", SESSION));
        then.status(200).json_body(json!({ "value": "<html><body><div class=\"overlay\"></div></body></html>" }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path(SESSION);
        then.status(200).json_body(json!({ "value": null }));
    });

    let dir = tempfile::tempdir().unwrap();
    let scenario = Scenario::new("checkout")
        .step(Step::navigate("http://app.test/checkout"))
        .step(Step::click(Locator::text("Pay now")))
        .step(Step::assert_page_contains("Thank you"));
    let runner = ScenarioRunner::new()
        .with_waiter(Waiter::new().with_poll_interval(Duration::from_millis(20)))
        .with_timeout(Duration::from_secs(1))
        .screenshot_dir(dir.path());

    let result = run_scenario(&remote_config(&server), &scenario, &runner).unwrap();

    assert!(!result.passed);
    assert_eq!(result.steps_run, 2);
    match result.error() {
        Some(HarnessError::ElementNotInteractable { locator, reason }) => {
            assert_eq!(locator, &Locator::text("Pay now"));
            assert!(reason.contains("Other element would receive the click"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.url.as_deref(), Some("http://app.test/checkout"));
    assert!(failure.screenshot_path.as_ref().unwrap().exists());
    delete.assert_hits(1);
}

#[test]
fn test_alert_commands() {
    let server = MockServer::start();
    mock_session_setup(&server);
    server.mock(|when, then| {
        when.method(GET).path(format!("{}/alert/text", SESSION));
        then.status(200).json_body(json!({ "value": "Product added." }));
    });
    let accepted = server.mock(|when, then| {
        when.method(POST).path(format!("{}/alert/accept", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });
    server.mock(|when, then| {
        when.method(POST).path(format!("{}/alert/dismiss", SESSION));
        then.status(404).json_body(json!({
            "value": { "error": "no such alert", "message": "no such alert", "stacktrace": "" }
        }));
    });
    server.mock(|when, then| {
        when.method(DELETE).path(SESSION);
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut session = Session::acquire(&remote_config(&server)).unwrap();
    let text = Waiter::new().wait_for_alert(&mut session, Duration::from_millis(200)).unwrap();
    assert_eq!(text, "Product added.");

    let browser = session.browser().unwrap();
    browser.accept_alert().unwrap();
    accepted.assert();
    assert!(matches!(browser.dismiss_alert(), Err(DriverError::NoSuchAlert(_))));
}
