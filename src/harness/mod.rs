pub mod run;
pub mod types;

pub use run::{run_harness, run_harness_with};
pub use types::{HarnessConfig, HarnessError, HarnessResult, Scenario, Step};
