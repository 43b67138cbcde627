use crate::diff::DiffResult;
use crate::error::CatalogError;
use crate::gateway::{BatchOutcome, Gateway};
use crate::model::TrackRef;
use crate::report::{MutationKind, SyncIssue, SyncMode};
use tokio_util::sync::CancellationToken;

/// What the mutation phase actually did to the target playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    pub added: Vec<TrackRef>,
    pub removed: Vec<TrackRef>,
    pub issues: Vec<SyncIssue>,

    /// Cancellation stopped further batches
    pub interrupted: bool,
}

/// A fatal failure stopped the mutation phase. `partial` holds what was
/// applied before it, including refs from the failing batch that went through.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyAborted {
    pub error: CatalogError,
    pub partial: ApplyOutcome,
}

/// Applies `diff` to `playlist_id`: all removals, then all additions, in
/// batches of the gateway's size, one batch at a time.
///
/// A dry run issues no calls. Cancellation is checked between batches, never
/// inside one. Only a fatal (authentication) failure is returned as `Err`;
/// every other failure is recorded per reference.
pub async fn apply(
    target: &Gateway,
    playlist_id: &str,
    diff: &DiffResult,
    mode: SyncMode,
    cancel: &CancellationToken,
) -> Result<ApplyOutcome, ApplyAborted> {
    let mut outcome = ApplyOutcome::default();
    if mode == SyncMode::DryRun {
        return Ok(outcome);
    }

    let batch_size = target.max_batch_size();
    let phases = [
        (MutationKind::Remove, &diff.to_remove),
        (MutationKind::Add, &diff.to_add),
    ];

    for (action, refs) in phases {
        for batch in refs.chunks(batch_size) {
            if cancel.is_cancelled() {
                outcome.interrupted = true;
                return Ok(outcome);
            }

            let result = match action {
                MutationKind::Remove => target.remove_tracks(playlist_id, batch).await,
                MutationKind::Add => target.add_tracks(playlist_id, batch).await,
            };
            let batch_outcome = match result {
                Ok(batch_outcome) => batch_outcome,
                Err(e) if e.is_fatal() => {
                    return Err(ApplyAborted {
                        error: e,
                        partial: outcome,
                    });
                }
                Err(e) => BatchOutcome::all_failed(batch, e),
            };

            if let Some(error) = record(&mut outcome, action, batch_outcome) {
                return Err(ApplyAborted {
                    error,
                    partial: outcome,
                });
            }
        }
    }

    Ok(outcome)
}

/// Adds one batch to `outcome`. Returns the first fatal per-ref failure, after
/// the refs that did go through have been recorded.
fn record(
    outcome: &mut ApplyOutcome,
    action: MutationKind,
    batch: BatchOutcome,
) -> Option<CatalogError> {
    match action {
        MutationKind::Remove => outcome.removed.extend(batch.applied),
        MutationKind::Add => outcome.added.extend(batch.applied),
    }

    let (fatal, failed): (Vec<_>, Vec<_>) = batch
        .failed
        .into_iter()
        .partition(|f| f.error.is_fatal());
    outcome.issues.extend(
        failed
            .into_iter()
            .map(|f| SyncIssue::mutation(action, f.reference, &f.error)),
    );
    fatal.into_iter().next().map(|f| f.error)
}
