use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use crate::harness::types::{HarnessConfig, HarnessResult, Scenario};
use crate::runner::{ScenarioResult, ScenarioRunner, duration_ms};
use crate::session::{Session, SessionConfig};

/// Runs every configured scenario, each with its own browser session.
/// Returns one result per scenario, in input order.
pub fn run_harness(config: &HarnessConfig) -> HarnessResult<Vec<ScenarioResult>> {
    run_harness_with(config, Session::acquire)
}

/// `run_harness` with a custom session factory, e.g. one handing out mock
/// browsers.
///
/// The first session that cannot be acquired stops the run: no new scenarios
/// start, in-flight ones finish, and that error is returned.
pub fn run_harness_with<F>(config: &HarnessConfig, connect: F) -> HarnessResult<Vec<ScenarioResult>>
where
    F: Fn(&SessionConfig) -> HarnessResult<Session> + Sync,
{
    let started = Instant::now();
    let total = config.scenarios.len();
    let jobs = config.jobs.clamp(1, total.max(1));
    info!(scenarios = total, jobs, "starting harness run");

    let results = if jobs == 1 {
        let mut results = Vec::with_capacity(total);
        for scenario in &config.scenarios {
            results.push(run_one(&config.runner, &config.session, scenario, &connect)?);
        }
        results
    } else {
        run_parallel(config, jobs, &connect)?
    };

    let failed = results.iter().filter(|r| !r.passed).count();
    info!(
        scenarios = total,
        failed,
        duration_ms = duration_ms(started.elapsed()),
        "harness run complete"
    );
    Ok(results)
}

fn run_parallel<F>(config: &HarnessConfig, jobs: usize, connect: &F) -> HarnessResult<Vec<ScenarioResult>>
where
    F: Fn(&SessionConfig) -> HarnessResult<Session> + Sync,
{
    let next = AtomicUsize::new(0);
    let aborted = AtomicBool::new(false);
    let slots: Vec<Mutex<Option<HarnessResult<ScenarioResult>>>> =
        config.scenarios.iter().map(|_| Mutex::new(None)).collect();

    thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| {
                loop {
                    if aborted.load(Ordering::SeqCst) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(scenario) = config.scenarios.get(index) else {
                        break;
                    };
                    let outcome = run_one(&config.runner, &config.session, scenario, connect);
                    if outcome.is_err() {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    *slots[index].lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome);
                }
            });
        }
    });

    let mut results = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot.into_inner().unwrap_or_else(|p| p.into_inner()) {
            Some(Ok(result)) => results.push(result),
            Some(Err(err)) => return Err(err),
            // Never started because an earlier acquisition failed
            None => continue,
        }
    }
    Ok(results)
}

fn run_one<F>(
    runner: &ScenarioRunner,
    session_config: &SessionConfig,
    scenario: &Scenario,
    connect: &F,
) -> HarnessResult<ScenarioResult>
where
    F: Fn(&SessionConfig) -> HarnessResult<Session>,
{
    let mut session = connect(session_config)?;
    let result = runner.run(scenario, &mut session);
    if let Err(err) = session.release() {
        warn!(scenario = %scenario.name, error = %err, "session release failed");
    }
    Ok(result)
}
