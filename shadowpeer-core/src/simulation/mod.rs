//! Synthetic upload traffic.
//!
//! Stands in for real transfer progress so the announce engine has
//! plausible counters to report.

pub mod traffic;

pub use traffic::TrafficSimulator;
