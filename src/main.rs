use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use web_harness::config::{self, BrowserKind};
use web_harness::diagnostics::{cleanup_old_screenshots, list_screenshots};
use web_harness::{BrowserBackend, HarnessConfig, Scenario, ScenarioRunner, SessionConfig, run_harness, with_session};

/// Web Harness - browser-driven UI scenarios with failure screenshots
#[derive(Parser, Debug)]
#[command(
    name = "web-harness",
    about = "Run browser UI scenarios over WebDriver, capturing a screenshot at the first failing step",
    after_help = "ENVIRONMENT VARIABLES:\n\
        WEB_HARNESS_BROWSER          Browser to drive (chrome, firefox)\n\
        WEB_HARNESS_DRIVER           WebDriver binary to spawn\n\
        WEB_HARNESS_DRIVER_PORT      Fixed port for the spawned driver\n\
        WEB_HARNESS_REMOTE_URL       Existing WebDriver server to use instead\n\
        WEB_HARNESS_HEADLESS         Run the browser headless (true/false)\n\
        WEB_HARNESS_WINDOW_SIZE      desktop, laptop, tablet, mobile, or WxH\n\
        WEB_HARNESS_IMPLICIT_WAIT_MS Driver implicit wait (ms)\n\
        WEB_HARNESS_WAIT_TIMEOUT     Default condition timeout (seconds)\n\
        WEB_HARNESS_POLL_MS          Condition polling interval (ms)\n\
        WEB_HARNESS_STARTUP_TIMEOUT  Driver readiness timeout (seconds)\n\
        WEB_HARNESS_SCREENSHOT_DIR   Directory for failure screenshots\n\
        WEB_HARNESS_BASE_URL         Base URL for relative navigation\n\
        RUST_LOG                     Log filter (default: web_harness=info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Session options shared by commands that open a browser
#[derive(clap::Args, Debug)]
struct BrowserArgs {
    /// Browser to drive: chrome or firefox
    #[arg(long)]
    browser: Option<String>,

    /// WebDriver binary (default: chromedriver or geckodriver)
    #[arg(long)]
    driver: Option<PathBuf>,

    /// Connect to a running WebDriver server instead of spawning one
    #[arg(long)]
    remote_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Window size: desktop (1920x1080), laptop, tablet, mobile, or WxH
    #[arg(long, short = 's')]
    size: Option<String>,

    /// Base URL for relative navigation
    #[arg(long)]
    base_url: Option<String>,
}

impl BrowserArgs {
    fn session_config(&self) -> Result<SessionConfig, Box<dyn Error>> {
        let mut session = SessionConfig::new();
        if let Some(name) = &self.browser {
            let browser = BrowserKind::parse(name)
                .ok_or_else(|| format!("Invalid browser '{}'. Use: chrome or firefox", name))?;
            session = session.browser(browser);
        }
        if let Some(driver) = &self.driver {
            session = session.driver_path(driver);
        }
        if let Some(url) = &self.remote_url {
            session = session.remote_url(url);
        }
        if self.headed {
            session = session.headless(false);
        }
        if let Some(size) = &self.size {
            let (width, height) = config::parse_window_size(size).ok_or_else(|| {
                format!("Invalid window size '{}'. Use: desktop, laptop, tablet, mobile, or WxH", size)
            })?;
            session = session.window_size(width, height);
        }
        if let Some(url) = &self.base_url {
            session = session.base_url(url);
        }
        Ok(session)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scenarios in a JSON file, one browser session per scenario
    Run {
        /// Scenario file (one scenario object or an array of them)
        #[arg(long)]
        scenario: PathBuf,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Number of scenarios run in parallel
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Condition wait timeout in seconds (default: WEB_HARNESS_WAIT_TIMEOUT)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Directory for failure screenshots
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Open a session, load a URL and report what the browser sees
    Probe {
        /// Page to load
        #[arg(long)]
        url: String,

        #[command(flatten)]
        browser: BrowserArgs,

        /// Save a screenshot of the loaded page
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },

    /// List failure screenshots
    List {
        /// Screenshot directory (default: WEB_HARNESS_SCREENSHOT_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Delete old failure screenshots, manifests and page sources
    Clean {
        /// Remove files older than this many hours
        #[arg(long, default_value = "24")]
        older_than_hours: u64,

        /// Screenshot directory (default: WEB_HARNESS_SCREENSHOT_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("web_harness=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn max_age(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn screenshot_dir(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from(&config::get().output.screenshot_dir))
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Some(Commands::Run {
            scenario,
            browser,
            jobs,
            timeout,
            output,
            json,
        }) => {
            let scenarios = Scenario::load_file(&scenario)?;
            let mut runner = ScenarioRunner::new();
            if let Some(secs) = timeout {
                runner = runner.with_timeout(Duration::from_secs(secs));
            }
            if let Some(dir) = output {
                runner = runner.screenshot_dir(dir);
            }
            let harness = HarnessConfig::new(scenarios)
                .session(browser.session_config()?)
                .runner(runner)
                .jobs(jobs);

            let results = run_harness(&harness)?;
            let failed = results.iter().filter(|r| !r.passed).count();

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    println!("{}", result);
                }
                println!();
                println!("{} scenarios, {} passed, {} failed", results.len(), results.len() - failed, failed);
            }

            if failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Some(Commands::Probe {
            url,
            browser,
            screenshot,
        }) => {
            let session_config = browser.session_config()?;
            let (current_url, title) = with_session(&session_config, |session| {
                let browser = session.browser()?;
                browser.navigate(&url)?;
                let current_url = browser.current_url()?;
                let title = browser.title()?;
                if let Some(path) = &screenshot {
                    std::fs::write(path, browser.screenshot()?)?;
                }
                Ok((current_url, title))
            })?;

            println!("URL:   {}", current_url);
            println!("Title: {}", title);
            if let Some(path) = screenshot {
                println!("Screenshot: {}", path.display());
            }
        }

        Some(Commands::List { dir }) => {
            let dir = screenshot_dir(dir);
            let screenshots = list_screenshots(&dir)?;
            if screenshots.is_empty() {
                println!("No screenshots in {}", dir.display());
            }
            for path in screenshots {
                println!("{}", path.display());
            }
        }

        Some(Commands::Clean { older_than_hours, dir }) => {
            let dir = screenshot_dir(dir);
            let removed = cleanup_old_screenshots(&dir, max_age(older_than_hours))?;
            println!("Removed {} files from {}", removed, dir.display());
        }

        None => {
            println!("Web Harness - browser-driven UI scenarios");
            println!();
            println!("Usage: web-harness <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run    Run scenarios from a JSON file");
            println!("  probe  Load a URL and report the page title");
            println!("  list   List failure screenshots");
            println!("  clean  Delete old failure screenshots");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(ExitCode::SUCCESS)
}
