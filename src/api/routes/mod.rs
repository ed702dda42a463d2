//! Route handlers, grouped by who calls them
//!
//! - `ingest`: report endpoints called by devices
//! - `leak`: query and control endpoints for dashboards
//! - `health`: liveness and store statistics

pub mod health;
pub mod ingest;
pub mod leak;
