//! CS history recorder and consistency checker.
//!
//! Records every tenure (request, grant, release instants plus the request
//! stamp) and verifies:
//! - Mutual Exclusion: no two tenures overlap in time
//! - Priority Order: if request A precedes request B and A was already
//!   outstanding when B was granted, A was granted first

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::mutex::{Grant, Release, RequestStamp};
use crate::ProcessId;

/// One stay in the CS.
#[derive(Debug, Clone, Copy)]
pub struct Tenure {
    pub stamp: RequestStamp,
    pub requested_at: Instant,
    pub granted_at: Instant,
    pub released_at: Instant,
}

impl Tenure {
    pub fn process(&self) -> ProcessId {
        self.stamp.process
    }
}

/// Thread-safe tenure log shared by client threads.
#[derive(Debug, Clone, Default)]
pub struct CsHistory {
    inner: Arc<Mutex<Vec<Tenure>>>,
}

impl CsHistory {
    pub fn new() -> Self {
        CsHistory {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record a completed tenure.
    pub fn record(&self, grant: &Grant, release: &Release) {
        let tenure = Tenure {
            stamp: grant.stamp,
            requested_at: grant.requested_at,
            granted_at: grant.granted_at,
            released_at: release.released_at,
        };
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tenure);
    }

    /// Copy of the recorded tenures.
    pub fn snapshot(&self) -> Vec<Tenure> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Types of consistency violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Two processes were in the CS at the same time.
    Overlap,
    /// A lower-priority outstanding request was admitted first.
    PriorityInversion,
}

/// A consistency violation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
    /// Offending tenures, by index into the checked slice.
    pub related: (usize, usize),
}

/// Statistics from the consistency check.
#[derive(Debug, Clone, Default)]
pub struct CheckStats {
    pub tenures: usize,
    pub processes: usize,
}

/// Result of a consistency check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub stats: CheckStats,
}

/// The consistency checker.
pub struct Checker;

impl Checker {
    /// Run every check over `tenures`.
    pub fn check(tenures: &[Tenure]) -> CheckResult {
        let mut violations = Self::check_mutual_exclusion(tenures);
        violations.extend(Self::check_priority_order(tenures));

        let processes: HashSet<ProcessId> = tenures.iter().map(Tenure::process).collect();
        CheckResult {
            passed: violations.is_empty(),
            violations,
            stats: CheckStats {
                tenures: tenures.len(),
                processes: processes.len(),
            },
        }
    }

    /// No tenure may start before every earlier-granted tenure has ended.
    pub fn check_mutual_exclusion(tenures: &[Tenure]) -> Vec<Violation> {
        let mut order: Vec<usize> = (0..tenures.len()).collect();
        order.sort_by_key(|&i| tenures[i].granted_at);

        let mut violations = Vec::new();
        // Tenure with the latest release seen so far
        let mut latest: Option<usize> = None;

        for &i in &order {
            let current = &tenures[i];
            if let Some(prev) = latest {
                let previous = &tenures[prev];
                if current.granted_at < previous.released_at {
                    violations.push(Violation {
                        kind: ViolationKind::Overlap,
                        description: format!(
                            "p{} {} granted while p{} {} still held the CS",
                            current.process(),
                            current.stamp,
                            previous.process(),
                            previous.stamp
                        ),
                        related: (prev, i),
                    });
                }
                if current.released_at > previous.released_at {
                    latest = Some(i);
                }
            } else {
                latest = Some(i);
            }
        }
        violations
    }

    /// Outstanding requests are admitted in stamp order.
    pub fn check_priority_order(tenures: &[Tenure]) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (a_idx, a) in tenures.iter().enumerate() {
            for (b_idx, b) in tenures.iter().enumerate() {
                if !a.stamp.precedes(&b.stamp) || a.requested_at >= b.granted_at {
                    continue;
                }
                if a.granted_at > b.granted_at {
                    violations.push(Violation {
                        kind: ViolationKind::PriorityInversion,
                        description: format!(
                            "p{} {} was outstanding but admitted after p{} {}",
                            a.process(),
                            a.stamp,
                            b.process(),
                            b.stamp
                        ),
                        related: (a_idx, b_idx),
                    });
                }
            }
        }
        violations
    }
}
