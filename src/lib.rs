//! Playlist synchronization from a source music catalog (Spotify) to a
//! target catalog (YouTube Music).
//!
//! - `gateway`: throttled, retrying catalog access
//! - `resolver`: matches source tracks to target-catalog tracks
//! - `diff`: set difference between desired and actual playlist contents
//! - `applier`: issues removals then additions
//! - `orchestrator`: runs every mapping and collects the reports

pub mod applier;
pub mod config;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod resolver;

pub use diff::DiffResult;
pub use error::{CatalogError, ErrorKind, SyncError};
pub use gateway::{BatchOutcome, CatalogClient, Gateway, RateLimiter, RefFailure, RetryPolicy};
pub use model::{Mapping, MappingSnapshot, MatchCandidate, Page, PlaylistSummary, Track, TrackRef};
pub use orchestrator::{OrchestratorConfig, SyncOrchestrator};
pub use report::{
    MappingOutcome, MappingState, MappingValidation, RunReport, RunSummary, SyncIssue, SyncMode,
    SyncReport,
};
pub use resolver::{Resolution, Resolver, ResolverConfig};
