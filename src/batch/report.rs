use crate::batch::ResultSet;
use crate::funnel::AttemptRecord;
use crate::model::{FetchTarget, StrategyKind};
use std::fmt;

/// How one target ended
#[derive(Debug, Clone, PartialEq)]
pub enum TargetStatus {
    Succeeded {
        strategy: StrategyKind,
        /// Records that passed validation
        accepted: usize,
        /// Listings in the winning payload that failed validation
        rejected: usize,
    },

    Exhausted { tried: Vec<StrategyKind> },

    /// Not attempted because an earlier page of the same search came back empty
    Skipped,

    Cancelled,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { strategy, .. } => write!(f, "succeeded via {}", strategy),
            Self::Exhausted { tried } => match (tried.first(), tried.last()) {
                (Some(first), Some(last)) if first == last => {
                    write!(f, "exhausted after trying {}", first)
                }
                (Some(first), Some(last)) => {
                    write!(f, "exhausted after trying {}..{}", first, last)
                }
                _ => write!(f, "exhausted"),
            },
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Report line for one target
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: FetchTarget,
    pub status: TargetStatus,
    pub attempts: Vec<AttemptRecord>,
}

impl TargetReport {
    pub fn new(target: FetchTarget, status: TargetStatus) -> Self {
        Self {
            target,
            status,
            attempts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TargetStatus::Succeeded { .. })
    }
}

/// Everything a batch run produced
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Deduplicated records from every successful target
    pub results: ResultSet,

    /// One entry per target, in submission order
    pub targets: Vec<TargetReport>,
}

/// Per-status target counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for report in &self.targets {
            match report.status {
                TargetStatus::Succeeded { .. } => counts.succeeded += 1,
                TargetStatus::Exhausted { .. } => counts.exhausted += 1,
                TargetStatus::Skipped => counts.skipped += 1,
                TargetStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Returns the report for a target, if it was part of the batch
    pub fn report_for(&self, target: &FetchTarget) -> Option<&TargetReport> {
        self.targets.iter().find(|r| &r.target == target)
    }
}
