pub mod batch;
pub mod ledger;
pub mod participant;
pub mod placement;
pub mod template;
