pub mod engine;
pub mod error;
pub mod executor;
pub mod runner;
pub mod state;

pub use engine::{CycleReport, Engine, Phase, RequestReport, RANDOM_TOKEN_VAR};
pub use error::ExecuteError;
pub use executor::execute;
pub use runner::Runner;
pub use state::{RunnerInfo, RunnerState};
