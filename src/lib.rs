//! DNS metrics e2e harness
//!
//! Builds fixed step sequences that create a DNS client workload in a
//! Kubernetes cluster, generate DNS traffic, and check the DNS metrics the
//! network observability agent exports for that traffic.

pub mod cli;
pub mod cluster;
pub mod commands;
pub mod common;
pub mod metrics;
pub mod runner;
pub mod scenario;

// Re-export commonly used types for tests
pub use common::{Error, Result};
