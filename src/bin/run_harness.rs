use std::path::PathBuf;
use std::time::Duration;

use web_harness::driver::MockAction;
use web_harness::harness::run_harness_with;
use web_harness::{
    ConditionKind, HarnessConfig, Locator, MockBrowser, MockElement, MockPage, Scenario, ScenarioRunner, Session,
    Step, Waiter,
};

/// A scripted login flow: the dashboard heading appears shortly after login.
fn demo_site() -> MockBrowser {
    MockBrowser::new()
        .with_page(
            "https://demo.test/login",
            MockPage::new("Sign in")
                .element(MockElement::new("input").id("email").name("email"))
                .element(MockElement::new("input").id("password").attr("type", "password"))
                .element(
                    MockElement::new("button")
                        .id("submit")
                        .text("Log in")
                        .on_click(MockAction::Navigate("https://demo.test/dashboard".to_string())),
                ),
        )
        .with_page(
            "https://demo.test/dashboard",
            MockPage::new("Dashboard").element(
                MockElement::new("h1")
                    .text("Dashboard")
                    .visible_after(Duration::from_millis(300)),
            ),
        )
}

fn login(name: &str, expected_heading: &str) -> Scenario {
    Scenario::new(name)
        .base_url("https://demo.test/")
        .step(Step::navigate("login"))
        .step(Step::type_text(Locator::id("email"), "a@b.com"))
        .step(Step::type_text(Locator::id("password"), "secret"))
        .step(Step::click(Locator::text("Log in")))
        .step(Step::wait_for_url("/dashboard"))
        .step(Step::assert_condition(Locator::text(expected_heading), ConditionKind::Visible))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("web_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = HarnessConfig::new(vec![login("login", "Dashboard"), login("login_wrong_heading", "Welcome")])
        .runner(
            ScenarioRunner::new()
                .with_waiter(Waiter::new().with_poll_interval(Duration::from_millis(50)))
                .with_timeout(Duration::from_secs(2))
                .screenshot_dir(PathBuf::from("./harness_screenshots")),
        )
        .jobs(2);

    match run_harness_with(&config, |session| Session::with_backend(Box::new(demo_site()), session)) {
        Ok(results) => {
            println!("Harness completed");
            for result in results {
                println!("{}", result);
            }
        }
        Err(e) => {
            eprintln!("Harness failed: {}", e);
        }
    }
}
