pub mod ingest;
pub mod ledger;
pub mod policy;
pub mod proximity;
pub mod registry;
pub mod state_machine;
