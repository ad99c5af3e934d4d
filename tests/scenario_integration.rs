//! Integration tests for scenario runs against the mock browser

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use web_harness::driver::MockAction;
use web_harness::{
    BrowserBackend, ConditionKind, HarnessError, Locator, MatchPolicy, MockBrowser, MockElement, MockPage, Scenario, ScenarioRunner,
    Session, SessionConfig, Step, Waiter, list_screenshots, with_backend_session,
};

const LOGIN_URL: &str = "https://app.test/login";
const DASHBOARD_URL: &str = "https://app.test/dashboard";

fn login_site(dashboard_delay: Duration) -> MockBrowser {
    MockBrowser::new()
        .with_page(
            LOGIN_URL,
            MockPage::new("Sign in")
                .element(MockElement::new("input").id("email"))
                .element(MockElement::new("input").id("password").attr("type", "password"))
                .element(
                    MockElement::new("button")
                        .id("login")
                        .text("Log in")
                        .on_click(MockAction::Navigate(DASHBOARD_URL.to_string())),
                ),
        )
        .with_page(
            DASHBOARD_URL,
            MockPage::new("Dashboard").element(MockElement::new("h2").text("Dashboard").visible_after(dashboard_delay)),
        )
}

fn login_scenario() -> Scenario {
    Scenario::new("login")
        .step(Step::navigate(LOGIN_URL))
        .step(Step::type_text(Locator::id("email"), "a@b.com"))
        .step(Step::type_text(Locator::id("password"), "secret"))
        .step(Step::click(Locator::text("Log in")))
        .step(Step::assert_condition(
            Locator::xpath("//*[text()='Dashboard']"),
            ConditionKind::Visible,
        ))
}

fn runner(dir: &std::path::Path, timeout: Duration) -> ScenarioRunner {
    ScenarioRunner::new()
        .with_waiter(Waiter::new().with_poll_interval(Duration::from_millis(20)))
        .with_timeout(timeout)
        .screenshot_dir(dir)
}

fn session_config() -> SessionConfig {
    SessionConfig::new().window_size(1280, 800)
}

#[test]
fn test_login_passes_when_dashboard_appears_in_time() {
    let dir = tempfile::tempdir().unwrap();
    let browser = login_site(Duration::from_millis(150));

    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_secs(2)).run(&login_scenario(), session))
    })
    .unwrap();

    result.assert_passed();
    assert_eq!(result.steps_run, 5);
    assert_eq!(browser.quit_count(), 1);
    assert_eq!(
        browser.actions(),
        vec![
            format!("navigate {}", LOGIN_URL),
            "clear input#email".to_string(),
            "type input#email a@b.com".to_string(),
            "clear input#password".to_string(),
            "type input#password secret".to_string(),
            "click button#login".to_string(),
            "quit".to_string(),
        ]
    );
    assert!(list_screenshots(dir.path()).unwrap().is_empty());
}

#[test]
fn test_login_fails_with_wait_timeout_and_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let browser = login_site(Duration::from_secs(30));
    let timeout = Duration::from_millis(200);

    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), timeout).run(&login_scenario(), session))
    })
    .unwrap();

    assert!(!result.passed);
    match result.error() {
        Some(HarnessError::WaitTimeout { condition, elapsed, .. }) => {
            assert_eq!(*condition, ConditionKind::Visible);
            assert!(*elapsed >= timeout);
        }
        other => panic!("expected a wait timeout, got {:?}", other),
    }
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.step_index, 4);
    assert_eq!(failure.url.as_deref(), Some(DASHBOARD_URL));
    let screenshot = failure.screenshot_path.as_ref().unwrap();
    assert!(screenshot.exists());
    assert!(screenshot.file_name().unwrap().to_string_lossy().starts_with("login_"));
    assert!(screenshot.with_extension("json").exists());
    assert_eq!(browser.quit_count(), 1);
}

#[test]
fn test_clickable_wait_on_missing_element_times_out() {
    let browser = MockBrowser::new().with_page(LOGIN_URL, MockPage::new("Sign in"));
    let timeout = Duration::from_millis(150);

    let outcome = with_backend_session(Box::new(browser), &session_config(), |session| {
        session.browser()?.navigate(LOGIN_URL)?;
        Waiter::new()
            .with_poll_interval(Duration::from_millis(20))
            .wait_for(session, &Locator::text("Log in"), ConditionKind::Clickable, timeout)
    });

    match outcome {
        Err(HarnessError::WaitTimeout { locator, elapsed, .. }) => {
            assert_eq!(locator, Locator::text("Log in"));
            assert!(elapsed >= timeout);
        }
        other => panic!("expected a wait timeout, got {:?}", other),
    }
}

#[test]
fn test_assertion_failure_skips_remaining_steps() {
    let dir = tempfile::tempdir().unwrap();
    let browser = MockBrowser::new().with_page(
        "https://app.test/cart",
        MockPage::new("Cart")
            .element(MockElement::new("span").id("count").text("2 items"))
            .element(MockElement::new("button").id("checkout").text("Checkout")),
    );
    let scenario = Scenario::new("cart")
        .step(Step::navigate("https://app.test/cart"))
        .step(Step::assert_condition(Locator::id("count"), ConditionKind::Present))
        .step(Step::assert_page_contains("3 items"))
        .step(Step::click(Locator::id("checkout")))
        .step(Step::pause(Duration::from_millis(10)));

    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(200)).run(&scenario, session))
    })
    .unwrap();

    assert!(matches!(result.error(), Some(HarnessError::AssertionFailure { .. })));
    assert_eq!(result.steps_run, 3);
    assert_eq!(result.total_steps, 5);
    assert!(!browser.actions().iter().any(|a| a.starts_with("click")));
    assert_eq!(list_screenshots(dir.path()).unwrap().len(), 1);
    assert_eq!(browser.quit_count(), 1);
}

#[test]
fn test_zero_step_scenario_passes() {
    let dir = tempfile::tempdir().unwrap();
    let result = with_backend_session(Box::new(MockBrowser::new()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(100)).run(&Scenario::new("empty"), session))
    })
    .unwrap();
    assert!(result.passed);
    assert_eq!(result.steps_run, 0);
    assert!(result.into_result().is_ok());
}

#[test]
fn test_session_released_when_body_panics() {
    let browser = MockBrowser::new();
    let handle = browser.clone();

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        with_backend_session(Box::new(browser), &session_config(), |_session| -> Result<(), HarnessError> {
            panic!("scenario body blew up");
        })
    }));

    assert!(outcome.is_err());
    assert_eq!(handle.quit_count(), 1);
}

#[test]
fn test_session_released_when_body_errors() {
    let browser = MockBrowser::new();
    let outcome = with_backend_session(Box::new(browser.clone()), &session_config(), |_session| {
        Err::<(), _>(HarnessError::InvalidScenario("stop".to_string()))
    });
    assert!(matches!(outcome, Err(HarnessError::InvalidScenario(_))));
    assert_eq!(browser.quit_count(), 1);
}

#[test]
fn test_released_session_rejects_use() {
    let mut session = Session::with_backend(Box::new(MockBrowser::new()), &session_config()).unwrap();
    session.release().unwrap();
    session.release().unwrap();
    let err = Waiter::new()
        .wait_for(&mut session, &Locator::id("x"), ConditionKind::Present, Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, HarnessError::SessionClosed));
}

#[test]
fn test_disabled_signals_are_independent() {
    let browser = MockBrowser::new().with_page(
        "https://app.test/settings",
        MockPage::new("Settings")
            .element(MockElement::new("button").id("native").disabled())
            .element(MockElement::new("button").id("styled").class("btn").disabled_class())
            .element(MockElement::new("input").id("locked").read_only())
            .element(MockElement::new("button").id("plain")),
    );

    with_backend_session(Box::new(browser), &session_config(), |session| {
        session.browser()?.navigate("https://app.test/settings")?;
        let waiter = Waiter::new().with_poll_interval(Duration::from_millis(10));
        let quick = Duration::from_millis(50);

        waiter.wait_for_element(session, &Locator::id("native"), ConditionKind::DisabledAttribute, quick)?;
        waiter.wait_for_element(session, &Locator::id("styled"), ConditionKind::DisabledClass, quick)?;
        waiter.wait_for_element(session, &Locator::id("locked"), ConditionKind::ReadOnly, quick)?;

        // Each signal only reports its own kind of disabled state
        for (id, kind) in [
            ("styled", ConditionKind::DisabledAttribute),
            ("native", ConditionKind::DisabledClass),
            ("native", ConditionKind::ReadOnly),
            ("plain", ConditionKind::DisabledAttribute),
        ] {
            let outcome = waiter.wait_for(session, &Locator::id(id), kind, quick);
            assert!(
                matches!(outcome, Err(HarnessError::WaitTimeout { .. })),
                "{} should not be {}",
                id,
                kind
            );
        }

        // A class-disabled control is still clickable as far as the browser is concerned
        waiter.wait_for_element(session, &Locator::id("styled"), ConditionKind::Clickable, quick)?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_invisible_succeeds_without_match() {
    let browser = MockBrowser::new().with_page(
        "https://app.test/",
        MockPage::new("Home").element(MockElement::new("div").id("spinner").hidden()),
    );
    with_backend_session(Box::new(browser), &session_config(), |session| {
        session.browser()?.navigate("https://app.test/")?;
        let waiter = Waiter::new();
        let none = waiter.wait_for(session, &Locator::id("toast"), ConditionKind::Invisible, Duration::ZERO)?;
        assert!(none.is_none());
        let hidden = waiter.wait_for(session, &Locator::id("spinner"), ConditionKind::Invisible, Duration::ZERO)?;
        assert!(hidden.is_some());
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_unique_policy_rejects_ambiguous_locator() {
    let browser = MockBrowser::new().with_page(
        "https://app.test/list",
        MockPage::new("List")
            .element(MockElement::new("li").class("row").text("one"))
            .element(MockElement::new("li").class("row").text("two")),
    );
    with_backend_session(Box::new(browser), &session_config(), |session| {
        session.browser()?.navigate("https://app.test/list")?;
        let first = Waiter::new().wait_for(session, &Locator::css("li.row"), ConditionKind::Visible, Duration::ZERO);
        assert!(first.is_ok());

        let unique = Waiter::new().with_policy(MatchPolicy::Unique).wait_for(
            session,
            &Locator::css("li.row"),
            ConditionKind::Visible,
            Duration::from_millis(100),
        );
        assert!(matches!(unique, Err(HarnessError::AmbiguousLocator { count: 2, .. })));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_element_appearing_late_is_found() {
    let browser = MockBrowser::new().with_page(
        "https://app.test/slow",
        MockPage::new("Slow").element(MockElement::new("div").id("late").present_after(Duration::from_millis(100))),
    );
    with_backend_session(Box::new(browser), &session_config(), |session| {
        session.browser()?.navigate("https://app.test/slow")?;
        let started = Instant::now();
        Waiter::new().with_poll_interval(Duration::from_millis(10)).wait_for_element(
            session,
            &Locator::id("late"),
            ConditionKind::Present,
            Duration::from_secs(2),
        )?;
        assert!(started.elapsed() >= Duration::from_millis(100));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_scenario_file_round_trip_through_runner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("login.json");
    std::fs::write(
        &path,
        r#"{
            "name": "login from file",
            "base_url": "https://app.test/",
            "steps": [
                {"action": "navigate", "url": "login"},
                {"action": "type", "locator": {"by": "id", "value": "email"}, "text": "${WEB_HARNESS_TEST_UNSET_USER:-demo@app.test}"},
                {"action": "click", "locator": {"by": "text", "value": "Log in"}},
                {"action": "wait_for_url", "fragment": "/dashboard"},
                {"action": "assert_title_contains", "text": "Dash"}
            ]
        }"#,
    )
    .unwrap();

    let scenarios = Scenario::load_file(&path).unwrap();
    assert_eq!(scenarios.len(), 1);

    let browser = login_site(Duration::ZERO);
    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_secs(1)).run(&scenarios[0], session))
    })
    .unwrap();
    result.assert_passed();
    assert!(browser.actions().contains(&"type input#email demo@app.test".to_string()));
}

#[test]
fn test_status_text_rendering_late_is_awaited() {
    let dir = tempfile::tempdir().unwrap();
    let browser = MockBrowser::new().with_page(
        "https://app.test/devices",
        MockPage::new("Devices").element(
            MockElement::new("td")
                .id("status")
                .class("status")
                .text("collected")
                .visible_after(Duration::from_millis(100)),
        ),
    );
    let scenario = Scenario::new("device status")
        .step(Step::navigate("https://app.test/devices"))
        .step(Step::assert_text(Locator::id("status"), ConditionKind::Present, "collected"));

    let result = with_backend_session(Box::new(browser), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(500)).run(&scenario, session))
    })
    .unwrap();

    result.assert_passed();
}

#[test]
fn test_missing_status_text_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let browser = MockBrowser::new().with_page(
        "https://app.test/devices",
        MockPage::new("Devices").element(MockElement::new("td").id("status").text("not collected")),
    );
    let timeout = Duration::from_millis(150);
    let scenario = Scenario::new("device status")
        .step(Step::navigate("https://app.test/devices"))
        .step(Step::assert_text(Locator::id("status"), ConditionKind::Visible, "collected today"));

    let result = with_backend_session(Box::new(browser), &session_config(), |session| {
        Ok(runner(dir.path(), timeout).run(&scenario, session))
    })
    .unwrap();

    match result.error() {
        Some(HarnessError::WaitTimeout {
            expected_text, elapsed, ..
        }) => {
            assert_eq!(expected_text.as_deref(), Some("collected today"));
            assert!(*elapsed >= timeout);
        }
        other => panic!("expected a wait timeout, got {:?}", other),
    }
    assert!(result.to_string().contains("with text containing 'collected today'"));
}

#[test]
fn test_typed_secret_stays_out_of_report_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let browser = MockBrowser::new().with_page(
        LOGIN_URL,
        MockPage::new("Sign in").element(MockElement::new("input").id("password").read_only()),
    );
    let scenario = Scenario::new("login")
        .step(Step::navigate(LOGIN_URL))
        .step(Step::type_text(Locator::id("password"), "hunter2-SECRET"));

    let result = with_backend_session(Box::new(browser), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(200)).run(&scenario, session))
    })
    .unwrap();

    assert!(matches!(result.error(), Some(HarnessError::ElementNotInteractable { .. })));
    let report = result.to_string();
    assert!(report.contains("type 14 chars into id=password"));
    assert!(!report.contains("hunter2-SECRET"));
    assert!(!serde_json::to_string(&result).unwrap().contains("hunter2-SECRET"));

    let manifest = result.screenshot_path().unwrap().with_extension("json");
    let manifest = std::fs::read_to_string(manifest).unwrap();
    assert!(manifest.contains("type 14 chars into id=password"));
    assert!(!manifest.contains("hunter2-SECRET"));
}

fn shop_site() -> MockBrowser {
    MockBrowser::new()
        .with_page(
            "https://shop.test/product",
            MockPage::new("MacBook Pro")
                .element(
                    MockElement::new("a")
                        .id("add")
                        .text("Add to cart")
                        .on_click(MockAction::AlertAfter("Product added.".to_string(), Duration::from_millis(60))),
                )
                .element(
                    MockElement::new("a")
                        .id("cartur")
                        .text("Cart")
                        .on_click(MockAction::Navigate("https://shop.test/cart".to_string())),
                ),
        )
        .with_page(
            "https://shop.test/cart",
            MockPage::new("Cart")
                .element(MockElement::new("td").class("item").text("Sony vaio i5"))
                .element(
                    MockElement::new("td")
                        .class("item")
                        .text("MacBook Pro")
                        .visible_after(Duration::from_millis(80)),
                ),
        )
}

#[test]
fn test_add_to_cart_with_alert_and_any_match() {
    let dir = tempfile::tempdir().unwrap();
    let browser = shop_site();
    let scenario = Scenario::new("add to cart")
        .step(Step::navigate("https://shop.test/product"))
        .step(Step::click(Locator::id("add")))
        .step(Step::accept_alert_with("Product added"))
        .step(Step::click(Locator::id("cartur")))
        .step(Step::assert_count(Locator::css("td.item"), 2))
        .step(Step::assert_any_text(Locator::css("td.item"), "MacBook Pro"));

    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_secs(1)).run(&scenario, session))
    })
    .unwrap();

    result.assert_passed();
    assert!(browser.actions().contains(&"accept alert 'Product added.'".to_string()));
    assert_eq!(browser.url(), "https://shop.test/cart");
}

#[test]
fn test_product_missing_from_cart_lists_seen_texts() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = Scenario::new("wrong product")
        .step(Step::navigate("https://shop.test/cart"))
        .step(Step::assert_any_text(Locator::css("td.item"), "ThinkPad"));

    let result = with_backend_session(Box::new(shop_site()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(200)).run(&scenario, session))
    })
    .unwrap();

    match result.error() {
        Some(HarnessError::AssertionFailure { actual, .. }) => {
            assert!(actual.contains("Sony vaio i5"));
            assert!(actual.contains("MacBook Pro"));
        }
        other => panic!("expected an assertion failure, got {:?}", other),
    }
}

#[test]
fn test_too_few_matches_fails_count() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = Scenario::new("count")
        .step(Step::navigate("https://shop.test/cart"))
        .step(Step::assert_count(Locator::css("td.item"), 3));

    let result = with_backend_session(Box::new(shop_site()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(150)).run(&scenario, session))
    })
    .unwrap();

    match result.error() {
        Some(HarnessError::AssertionFailure { actual, .. }) => assert_eq!(actual, "2"),
        other => panic!("expected an assertion failure, got {:?}", other),
    }
}

#[test]
fn test_alert_failures() {
    let dir = tempfile::tempdir().unwrap();

    let no_alert = Scenario::new("no alert")
        .step(Step::navigate("https://shop.test/product"))
        .step(Step::dismiss_alert());
    let result = with_backend_session(Box::new(shop_site()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_millis(150)).run(&no_alert, session))
    })
    .unwrap();
    match result.error() {
        Some(HarnessError::PageWaitTimeout { expectation, .. }) => assert_eq!(expectation, "an alert"),
        other => panic!("expected an alert wait timeout, got {:?}", other),
    }

    let wrong_text = Scenario::new("wrong alert")
        .step(Step::navigate("https://shop.test/product"))
        .step(Step::click(Locator::id("add")))
        .step(Step::accept_alert_with("Out of stock"));
    let browser = shop_site();
    let result = with_backend_session(Box::new(browser.clone()), &session_config(), |session| {
        Ok(runner(dir.path(), Duration::from_secs(1)).run(&wrong_text, session))
    })
    .unwrap();
    match result.error() {
        Some(HarnessError::AssertionFailure { actual, .. }) => assert_eq!(actual, "'Product added.'"),
        other => panic!("expected an assertion failure, got {:?}", other),
    }
    assert!(!browser.actions().iter().any(|a| a.starts_with("accept alert")));
}

#[test]
fn test_wait_for_all_returns_every_row() {
    with_backend_session(Box::new(shop_site()), &session_config(), |session| {
        session.browser()?.navigate("https://shop.test/cart")?;
        let waiter = Waiter::new().with_poll_interval(Duration::from_millis(10));
        let rows = waiter.wait_for_all(session, &Locator::css("td.item"), Duration::from_millis(100))?;
        assert_eq!(rows.len(), 2);

        let none = waiter.wait_for_all(session, &Locator::css("td.missing"), Duration::from_millis(50));
        assert!(matches!(none, Err(HarnessError::WaitTimeout { condition: ConditionKind::Present, .. })));
        Ok(())
    })
    .unwrap();
}
