pub mod ledger;
pub mod model;
pub mod sets_and_parameters;
