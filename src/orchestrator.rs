//! Drives each mapping through fetch, resolve, diff and apply, and collects
//! the outcomes of a whole run.

use crate::applier::{self, ApplyOutcome};
use crate::diff;
use crate::error::{CatalogError, ErrorKind, Result};
use crate::gateway::Gateway;
use crate::model::{Mapping, MappingSnapshot, Track};
use crate::report::{
    FatalError, MappingOutcome, MappingState, MappingValidation, RunReport, SyncIssue, SyncMode,
    SyncReport,
};
use crate::resolver::{Resolution, Resolver};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Mappings processed at the same time
    pub max_parallel_mappings: usize,

    /// Searches in flight per mapping
    pub max_parallel_searches: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_mappings: 2,
            max_parallel_searches: 4,
        }
    }
}

pub struct SyncOrchestrator {
    source: Gateway,
    target: Gateway,
    resolver: Resolver,
    config: OrchestratorConfig,
}

/// Per-run abort flag: set once by the first authentication failure.
#[derive(Default)]
struct RunGuard {
    fatal: OnceLock<FatalError>,
}

impl RunGuard {
    fn abort(&self, catalog: &str, error: &CatalogError) {
        let _ = self.fatal.set(FatalError {
            catalog: catalog.to_string(),
            reason: error.to_string(),
        });
    }

    fn fatal(&self) -> Option<&FatalError> {
        self.fatal.get()
    }
}

/// Current stage of one mapping.
struct Pipeline {
    mapping: Mapping,
    state: MappingState,
}

impl Pipeline {
    fn advance(&mut self, to: MappingState) {
        debug_assert!(
            self.state.can_transition_to(to),
            "invalid transition {} -> {}",
            self.state,
            to
        );
        self.state = to;
    }

    fn cancelled(mut self) -> MappingOutcome {
        self.advance(MappingState::Cancelled);
        MappingOutcome::Cancelled {
            mapping: self.mapping,
        }
    }

    fn failed(
        mut self,
        kind: ErrorKind,
        reason: String,
        applied: ApplyOutcome,
    ) -> MappingOutcome {
        let during = self.state;
        self.advance(MappingState::Failed);
        MappingOutcome::Failed {
            mapping: self.mapping,
            during,
            kind,
            reason,
            added: applied.added,
            removed: applied.removed,
        }
    }
}

/// Stage failure tagged with the catalog it came from.
struct StageError {
    catalog: String,
    error: CatalogError,

    /// Mutations that went through before the failure
    applied: ApplyOutcome,
}

struct Resolved {
    desired: Vec<Track>,
    unresolved: Vec<Track>,
    issues: Vec<SyncIssue>,
}

impl SyncOrchestrator {
    pub fn new(source: Gateway, target: Gateway, resolver: Resolver) -> Self {
        Self {
            source,
            target,
            resolver,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Syncs every mapping of `snapshot` and returns their outcomes in order.
    ///
    /// Mappings are independent: a broken or failed mapping does not stop the
    /// others, except that an authentication failure fails every mapping not
    /// yet finished. After `cancel` fires no new mapping or mutation batch is
    /// started; mappings that had not started are reported as cancelled.
    pub async fn run(
        &self,
        snapshot: MappingSnapshot,
        mode: SyncMode,
        cancel: CancellationToken,
    ) -> RunReport {
        let guard = RunGuard::default();

        let outcomes = stream::iter(snapshot.mappings())
            .map(|mapping| self.sync_mapping(mapping, mode, &cancel, &guard))
            .buffered(self.config.max_parallel_mappings.max(1))
            .collect::<Vec<_>>()
            .await;

        RunReport {
            mode,
            outcomes,
            fatal: guard.fatal().cloned(),
        }
    }

    async fn sync_mapping(
        &self,
        mapping: &Mapping,
        mode: SyncMode,
        cancel: &CancellationToken,
        guard: &RunGuard,
    ) -> MappingOutcome {
        let mut pipeline = Pipeline {
            mapping: mapping.clone(),
            state: MappingState::Pending,
        };

        if let Some(fatal) = guard.fatal() {
            return pipeline.failed(
                ErrorKind::Authentication,
                fatal.to_string(),
                ApplyOutcome::default(),
            );
        }
        if cancel.is_cancelled() {
            return pipeline.cancelled();
        }

        match self.drive(&mut pipeline, mode, cancel, guard).await {
            Ok(Some(report)) => {
                pipeline.advance(MappingState::Done);
                MappingOutcome::Done(report)
            }
            Ok(None) if pipeline.state == MappingState::Broken => MappingOutcome::Broken {
                mapping: pipeline.mapping,
                reason: "target not found".to_string(),
            },
            Ok(None) => pipeline.cancelled(),
            Err(StageError {
                catalog,
                error,
                applied,
            }) => {
                if error.is_fatal() {
                    guard.abort(&catalog, &error);
                }
                let reason = format!("{catalog}: {error}");
                pipeline.failed(error.kind(), reason, applied)
            }
        }
    }

    /// Runs the stages. `Ok(None)` means the pipeline stopped early in the
    /// state it was left in (broken or about to be cancelled).
    async fn drive(
        &self,
        pipeline: &mut Pipeline,
        mode: SyncMode,
        cancel: &CancellationToken,
        guard: &RunGuard,
    ) -> std::result::Result<Option<SyncReport>, StageError> {
        let mapping = pipeline.mapping.clone();
        let source_err = |error| StageError {
            catalog: self.source.name().to_string(),
            error,
            applied: ApplyOutcome::default(),
        };
        let target_err = |error| StageError {
            catalog: self.target.name().to_string(),
            error,
            applied: ApplyOutcome::default(),
        };

        pipeline.advance(MappingState::FetchingSource);
        let source_tracks: Vec<Track> = self
            .source
            .list_playlist_tracks(&mapping.source_id)
            .try_collect()
            .await
            .map_err(source_err)?;

        pipeline.advance(MappingState::Resolving);
        let resolved = self
            .resolve_all(&source_tracks, cancel, guard)
            .await
            .map_err(target_err)?;
        if cancel.is_cancelled() {
            return Ok(None);
        }
        check_aborted(guard)?;

        pipeline.advance(MappingState::FetchingTarget);
        let actual: Vec<Track> = match self
            .target
            .list_playlist_tracks(&mapping.target_id)
            .try_collect()
            .await
        {
            Ok(tracks) => tracks,
            Err(e) if e.is_not_found() => {
                pipeline.advance(MappingState::Broken);
                return Ok(None);
            }
            Err(e) => return Err(target_err(e)),
        };

        pipeline.advance(MappingState::Diffing);
        let diff = diff::compute(
            resolved.desired.iter().filter_map(|t| t.target_ref.as_ref()),
            actual.iter().filter_map(|t| t.target_ref.as_ref()),
        );
        if cancel.is_cancelled() {
            return Ok(None);
        }
        check_aborted(guard)?;

        pipeline.advance(MappingState::Applying);
        let applied = applier::apply(&self.target, &mapping.target_id, &diff, mode, cancel)
            .await
            .map_err(|aborted| StageError {
                catalog: self.target.name().to_string(),
                error: aborted.error,
                applied: aborted.partial,
            })?;

        let mut report = SyncReport::new(mapping, mode, diff);
        report.added = applied.added;
        report.removed = applied.removed;
        report.unresolved = resolved.unresolved;
        report.errors = resolved.issues;
        report.errors.extend(applied.issues);
        report.interrupted = applied.interrupted;
        Ok(Some(report))
    }

    /// Resolves tracks concurrently, keeping source order. A search the
    /// catalog rejected becomes a per-track issue. An unreachable catalog or
    /// an authentication failure fails the whole mapping: no diff is computed
    /// from an incomplete desired set.
    async fn resolve_all(
        &self,
        tracks: &[Track],
        cancel: &CancellationToken,
        guard: &RunGuard,
    ) -> Result<Resolved> {
        let results: Vec<(&Track, Option<Result<Resolution>>)> = stream::iter(tracks)
            .map(|track| async move {
                if cancel.is_cancelled() || guard.fatal().is_some() {
                    return (track, None);
                }
                let result = self.resolver.resolve(&self.target, track).await;
                if let Err(e) = &result {
                    if e.is_fatal() {
                        guard.abort(self.target.name(), e);
                    }
                }
                (track, Some(result))
            })
            .buffered(self.config.max_parallel_searches.max(1))
            .collect()
            .await;

        let fatal = results.iter().find_map(|(_, result)| match result {
            Some(Err(e)) if e.is_fatal() => Some(e.clone()),
            _ => None,
        });
        if let Some(e) = fatal {
            return Err(e);
        }

        let mut resolved = Resolved {
            desired: Vec::new(),
            unresolved: Vec::new(),
            issues: Vec::new(),
        };

        for (track, result) in results {
            match result {
                None => {}
                Some(Ok(Resolution::Matched { track, .. })) => resolved.desired.push(track),
                Some(Ok(Resolution::Unresolved)) => resolved.unresolved.push(track.clone()),
                Some(Err(e)) if e.is_unavailable() => return Err(e),
                Some(Err(e)) => resolved.issues.push(SyncIssue::resolution(track.clone(), &e)),
            }
        }

        Ok(resolved)
    }

    /// Checks every mapping's target playlist: present in the library listing,
    /// or readable directly. Authentication failures abort the check.
    pub async fn validate(&self, snapshot: &MappingSnapshot) -> Result<Vec<MappingValidation>> {
        let library: HashSet<String> = self
            .target
            .list_playlists()
            .map_ok(|playlist| playlist.id)
            .try_collect()
            .await?;

        let mut validations = Vec::with_capacity(snapshot.len());
        for mapping in snapshot.mappings() {
            let mapping = mapping.clone();
            if library.contains(&mapping.target_id) {
                validations.push(MappingValidation::Valid { mapping });
                continue;
            }

            let first_page = self
                .target
                .list_playlist_tracks(&mapping.target_id)
                .try_next()
                .await;
            validations.push(match first_page {
                Ok(_) => MappingValidation::Valid { mapping },
                Err(e) if e.is_not_found() => MappingValidation::Broken { mapping },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => MappingValidation::Error {
                    mapping,
                    reason: e.to_string(),
                },
            });
        }

        Ok(validations)
    }
}

fn check_aborted(guard: &RunGuard) -> std::result::Result<(), StageError> {
    match guard.fatal() {
        Some(fatal) => Err(StageError {
            catalog: fatal.catalog.clone(),
            error: CatalogError::Authentication(fatal.reason.clone()),
            applied: ApplyOutcome::default(),
        }),
        None => Ok(()),
    }
}
