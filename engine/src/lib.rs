//! Certificate generation engine: template rendering, certificate ID
//! issuance, organized storage and batch orchestration.

pub mod db;
pub mod error;
pub mod job_controller;
pub mod orchestrator;
pub mod services;

pub use error::{EngineError, Result};
