pub mod link;
pub mod scenario_runner;
pub mod trace;

pub use link::{LinkEventSummary, LinkHandle, SimLink};
pub use scenario_runner::{load_scenario, run_scenario, simulate};
pub use trace::SimulationReport;
