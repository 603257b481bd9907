//! Local process group harness.
//!
//! Runs a whole group inside one binary and checks what it did:
//! - [`runner`]: dispatcher threads, concurrent client rounds
//! - [`checker`]: tenure history, mutual exclusion and priority order checks

pub mod checker;
pub mod runner;


pub use checker::{CheckResult, Checker, CsHistory, Tenure, Violation, ViolationKind};
pub use runner::{Cluster, ClusterConfig, ProcessHandle, DISPATCH_POLL_INTERVAL};
