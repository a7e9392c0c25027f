//! Runtime glue that wires configs, batching with checkpoints, publishing,
//! telemetry, and runner orchestration.

pub mod config;
pub mod driver;
pub mod publish;
pub mod runner;
pub mod telemetry;
