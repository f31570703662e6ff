pub mod config;
pub mod models;
pub mod problem;

pub use config::{ParameterSet, SolverSettings};
pub use models::procurement::ledger::Ledgers;
pub use models::procurement::model::{ProcurementSolver, SolveOutcome};
pub use problem::Problem;
