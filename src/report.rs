use crate::diff::DiffResult;
use crate::error::{CatalogError, ErrorKind};
use crate::model::{Mapping, Track, TrackRef};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    DryRun,
    Apply,
}

impl SyncMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run { Self::DryRun } else { Self::Apply }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Add,
    Remove,
}

/// Problem contained within one mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncIssue {
    /// Searching for a track failed; the track is left out of the desired set.
    Resolution {
        track: Track,
        kind: ErrorKind,
        message: String,
    },
    /// One reference in a mutation batch was not applied.
    Mutation {
        action: MutationKind,
        reference: TrackRef,
        kind: ErrorKind,
        message: String,
    },
}

impl SyncIssue {
    pub fn resolution(track: Track, error: &CatalogError) -> Self {
        Self::Resolution {
            track,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn mutation(action: MutationKind, reference: TrackRef, error: &CatalogError) -> Self {
        Self::Mutation {
            action,
            reference,
            kind: ErrorKind::PartialMutation,
            message: error.to_string(),
        }
    }
}

/// Outcome of one mapping that reached `Done`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub mapping: Mapping,
    pub mode: SyncMode,

    /// Computed changes, identical for dry and applied runs over the same state
    pub diff: DiffResult,

    /// Refs actually added (always empty in a dry run)
    pub added: Vec<TrackRef>,
    pub removed: Vec<TrackRef>,
    pub unchanged: usize,

    /// Source tracks with no acceptable match
    pub unresolved: Vec<Track>,
    pub errors: Vec<SyncIssue>,

    /// Cancellation stopped the batch sequence early
    pub interrupted: bool,
}

impl SyncReport {
    pub fn new(mapping: Mapping, mode: SyncMode, diff: DiffResult) -> Self {
        Self {
            mapping,
            mode,
            unchanged: diff.unchanged,
            diff,
            added: Vec::new(),
            removed: Vec::new(),
            unresolved: Vec::new(),
            errors: Vec::new(),
            interrupted: false,
        }
    }
}

/// Stage of a mapping's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingState {
    Pending,
    FetchingSource,
    Resolving,
    FetchingTarget,
    Diffing,
    Applying,
    Done,
    Broken,
    Failed,
    Cancelled,
}

impl MappingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Broken | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, to: MappingState) -> bool {
        use MappingState::*;
        match (*self, to) {
            (from, _) if from.is_terminal() => false,
            (_, Failed) => true,
            (Pending, FetchingSource | Cancelled) => true,
            (FetchingSource, Resolving) => true,
            (Resolving, FetchingTarget) => true,
            (FetchingTarget, Diffing | Broken) => true,
            (Diffing, Applying) => true,
            (Applying, Done) => true,
            // cancelled before any mutation was issued
            (Resolving | FetchingTarget | Diffing, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for MappingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::FetchingSource => "fetching source",
            Self::Resolving => "resolving",
            Self::FetchingTarget => "fetching target",
            Self::Diffing => "diffing",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Broken => "broken",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Terminal result for one mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MappingOutcome {
    Done(SyncReport),
    Broken {
        mapping: Mapping,
        reason: String,
    },
    Failed {
        mapping: Mapping,
        /// State the mapping was in when it failed
        during: MappingState,
        kind: ErrorKind,
        reason: String,

        /// Mutations that went through before the failure
        #[serde(skip_serializing_if = "Vec::is_empty")]
        added: Vec<TrackRef>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        removed: Vec<TrackRef>,
    },
    Cancelled {
        mapping: Mapping,
    },
}

impl MappingOutcome {
    pub fn mapping(&self) -> &Mapping {
        match self {
            Self::Done(report) => &report.mapping,
            Self::Broken { mapping, .. }
            | Self::Failed { mapping, .. }
            | Self::Cancelled { mapping } => mapping,
        }
    }

    pub fn state(&self) -> MappingState {
        match self {
            Self::Done(_) => MappingState::Done,
            Self::Broken { .. } => MappingState::Broken,
            Self::Failed { .. } => MappingState::Failed,
            Self::Cancelled { .. } => MappingState::Cancelled,
        }
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Done(report) => Some(report),
            _ => None,
        }
    }
}

/// Authentication failure that aborted the run for one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub catalog: String,
    pub reason: String,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} authentication failed: {}", self.catalog, self.reason)
    }
}

/// Everything one sync run produced, in mapping order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub mode: SyncMode,
    pub outcomes: Vec<MappingOutcome>,
    pub fatal: Option<FatalError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mappings: usize,
    pub done: usize,
    pub to_add: usize,
    pub to_remove: usize,
    pub added: usize,
    pub removed: usize,
    pub unresolved: usize,
    pub issues: usize,
    pub broken: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            mappings: self.outcomes.len(),
            ..RunSummary::default()
        };

        for outcome in &self.outcomes {
            match outcome {
                MappingOutcome::Done(report) => {
                    summary.done += 1;
                    summary.to_add += report.diff.to_add.len();
                    summary.to_remove += report.diff.to_remove.len();
                    summary.added += report.added.len();
                    summary.removed += report.removed.len();
                    summary.unresolved += report.unresolved.len();
                    summary.issues += report.errors.len();
                }
                MappingOutcome::Broken { .. } => summary.broken += 1,
                MappingOutcome::Failed { added, removed, .. } => {
                    summary.failed += 1;
                    summary.added += added.len();
                    summary.removed += removed.len();
                }
                MappingOutcome::Cancelled { .. } => summary.cancelled += 1,
            }
        }

        summary
    }

    pub fn outcome_for(&self, source_id: &str) -> Option<&MappingOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.mapping().source_id == source_id)
    }
}

/// Result of checking one mapping's target playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MappingValidation {
    Valid { mapping: Mapping },
    Broken { mapping: Mapping },
    Error { mapping: Mapping, reason: String },
}
