//! In-memory catalog used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use playbridge::{
    BatchOutcome, CatalogClient, CatalogError, Gateway, Page, PlaylistSummary, RateLimiter,
    RefFailure, Resolver, RetryPolicy, SyncOrchestrator, Track, TrackRef,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListTracks(String),
    ListPlaylists,
    Search(String),
    Add(String, Vec<TrackRef>),
    Remove(String, Vec<TrackRef>),
}

/// Catalog backed by hash maps, recording every call it receives.
pub struct FakeCatalog {
    name: &'static str,
    playlists: Mutex<HashMap<String, Vec<Track>>>,
    /// Listed by `list playlists`; a playlist can exist without being listed
    library: Mutex<Vec<String>>,
    search_results: Mutex<HashMap<String, Vec<Track>>>,
    calls: Mutex<Vec<Call>>,
    attempts: AtomicUsize,

    batch_size: usize,
    rate_limit_every: Option<usize>,
    unreachable: HashSet<String>,
    failing_searches: HashMap<String, CatalogError>,
    rejected_refs: HashSet<TrackRef>,
    revoked_refs: HashSet<TrackRef>,
    auth_expired: bool,
    cancel_on_add: Option<CancellationToken>,
}

impl FakeCatalog {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            playlists: Mutex::new(HashMap::new()),
            library: Mutex::new(Vec::new()),
            search_results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            batch_size: 50,
            rate_limit_every: None,
            unreachable: HashSet::new(),
            failing_searches: HashMap::new(),
            rejected_refs: HashSet::new(),
            revoked_refs: HashSet::new(),
            auth_expired: false,
            cancel_on_add: None,
        }
    }

    pub fn with_playlist(self, id: &str, tracks: Vec<Track>) -> Self {
        self.playlists.lock().unwrap().insert(id.to_string(), tracks);
        self.library.lock().unwrap().push(id.to_string());
        self
    }

    /// Playlist readable by id but missing from the library listing.
    pub fn with_unlisted_playlist(self, id: &str, tracks: Vec<Track>) -> Self {
        self.playlists.lock().unwrap().insert(id.to_string(), tracks);
        self
    }

    pub fn with_search(self, query: &str, results: Vec<Track>) -> Self {
        self.search_results
            .lock()
            .unwrap()
            .insert(query.to_string(), results);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Every n-th call attempt is answered with a rate-limit error.
    pub fn rate_limit_every(mut self, n: usize) -> Self {
        self.rate_limit_every = Some(n);
        self
    }

    /// Listing this playlist always fails transiently.
    pub fn with_unreachable(mut self, id: &str) -> Self {
        self.unreachable.insert(id.to_string());
        self
    }

    pub fn with_failing_search(mut self, query: &str, error: CatalogError) -> Self {
        self.failing_searches.insert(query.to_string(), error);
        self
    }

    pub fn with_rejected_ref(mut self, reference: &str) -> Self {
        self.rejected_refs.insert(TrackRef::from(reference));
        self
    }

    /// Adding this ref fails with an authentication error for that ref only.
    pub fn with_revoked_ref(mut self, reference: &str) -> Self {
        self.revoked_refs.insert(TrackRef::from(reference));
        self
    }

    /// Fires `cancel` once the first add batch has been applied.
    pub fn cancel_after_add(mut self, cancel: CancellationToken) -> Self {
        self.cancel_on_add = Some(cancel);
        self
    }

    pub fn with_expired_auth(mut self) -> Self {
        self.auth_expired = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add(..) | Call::Remove(..)))
            .collect()
    }

    pub fn playlist_refs(&self, id: &str) -> Vec<TrackRef> {
        self.playlists
            .lock()
            .unwrap()
            .get(id)
            .map(|tracks| tracks.iter().filter_map(|t| t.target_ref.clone()).collect())
            .unwrap_or_default()
    }

    fn record(&self, call: Call) -> Result<(), CatalogError> {
        self.calls.lock().unwrap().push(call);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.auth_expired {
            return Err(CatalogError::Authentication("token expired".into()));
        }
        match self.rate_limit_every {
            Some(n) if attempt % n == 0 => Err(CatalogError::RateLimited { retry_after: None }),
            _ => Ok(()),
        }
    }
}

fn paginate<T: Clone>(items: &[T], page: Option<String>) -> Page<T> {
    let offset: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
    let end = (offset + PAGE_SIZE).min(items.len());
    Page {
        items: items[offset.min(end)..end].to_vec(),
        next: (end < items.len()).then(|| end.to_string()),
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    fn name(&self) -> &str {
        self.name
    }

    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        page: Option<String>,
    ) -> Result<Page<Track>, CatalogError> {
        self.record(Call::ListTracks(playlist_id.to_string()))?;
        if self.unreachable.contains(playlist_id) {
            return Err(CatalogError::Transient("connection reset".into()));
        }
        let playlists = self.playlists.lock().unwrap();
        let tracks = playlists
            .get(playlist_id)
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {playlist_id}")))?;
        Ok(paginate(tracks, page))
    }

    async fn playlists_page(
        &self,
        page: Option<String>,
    ) -> Result<Page<PlaylistSummary>, CatalogError> {
        self.record(Call::ListPlaylists)?;
        let summaries: Vec<PlaylistSummary> = self
            .library
            .lock()
            .unwrap()
            .iter()
            .map(|id| PlaylistSummary {
                id: id.clone(),
                name: format!("Playlist {id}"),
            })
            .collect();
        Ok(paginate(&summaries, page))
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>, CatalogError> {
        self.record(Call::Search(query.to_string()))?;
        if let Some(error) = self.failing_searches.get(query) {
            return Err(error.clone());
        }
        let results = self.search_results.lock().unwrap();
        Ok(results
            .get(query)
            .map(|r| r.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        refs: &[TrackRef],
    ) -> Result<BatchOutcome, CatalogError> {
        self.record(Call::Add(playlist_id.to_string(), refs.to_vec()))?;
        let mut playlists = self.playlists.lock().unwrap();
        let tracks = playlists
            .get_mut(playlist_id)
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {playlist_id}")))?;

        let mut outcome = BatchOutcome::default();
        for reference in refs {
            if self.rejected_refs.contains(reference) {
                outcome.failed.push(RefFailure {
                    reference: reference.clone(),
                    error: CatalogError::Rejected("video unavailable".into()),
                });
                continue;
            }
            if self.revoked_refs.contains(reference) {
                outcome.failed.push(RefFailure {
                    reference: reference.clone(),
                    error: CatalogError::Authentication("access revoked".into()),
                });
                continue;
            }
            if !tracks.iter().any(|t| t.target_ref.as_ref() == Some(reference)) {
                tracks.push(Track::from_target(reference.clone(), reference.as_str(), vec![], None));
            }
            outcome.applied.push(reference.clone());
        }
        if let Some(cancel) = &self.cancel_on_add {
            cancel.cancel();
        }
        Ok(outcome)
    }

    async fn remove_tracks(
        &self,
        playlist_id: &str,
        refs: &[TrackRef],
    ) -> Result<BatchOutcome, CatalogError> {
        self.record(Call::Remove(playlist_id.to_string(), refs.to_vec()))?;
        let mut playlists = self.playlists.lock().unwrap();
        let tracks = playlists
            .get_mut(playlist_id)
            .ok_or_else(|| CatalogError::NotFound(format!("playlist {playlist_id}")))?;

        tracks.retain(|t| t.target_ref.as_ref().is_none_or(|r| !refs.contains(r)));
        Ok(BatchOutcome::all_applied(refs))
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

pub fn gateway(catalog: &Arc<FakeCatalog>) -> Gateway {
    Gateway::new(
        Arc::clone(catalog) as Arc<dyn CatalogClient>,
        Arc::new(RateLimiter::unlimited()),
        fast_retry(),
    )
}

pub fn orchestrator(source: &Arc<FakeCatalog>, target: &Arc<FakeCatalog>) -> SyncOrchestrator {
    SyncOrchestrator::new(gateway(source), gateway(target), Resolver::default())
}

pub fn source_track(id: &str, title: &str, artist: &str, secs: u32) -> Track {
    Track::from_source(TrackRef::from(id), title, vec![artist.to_string()], Some(secs))
}

pub fn target_track(id: &str, title: &str, artist: &str, secs: u32) -> Track {
    Track::from_target(TrackRef::from(id), title, vec![artist.to_string()], Some(secs))
}

pub fn refs(ids: &[&str]) -> Vec<TrackRef> {
    ids.iter().map(|id| TrackRef::from(*id)).collect()
}
