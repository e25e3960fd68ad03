//! processing_state.json Management Module
//!
//! Handles persistence of per-month progress:
//! - Phase records (status, attempts, last error, artifacts)
//! - Overall month status
//! - Crash-safe replacement of the state file

mod store;

pub use store::StateStore;
