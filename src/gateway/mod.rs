//! Catalog access: one `Gateway` per catalog, wrapping a `CatalogClient`
//! with the shared rate limiter and the retry policy.

pub mod rate_limit;
pub mod retry;
pub mod spotify;
pub mod youtube;

use crate::error::{CatalogError, Result};
use crate::model::{Page, PlaylistSummary, Track, TrackRef};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::sync::Arc;

pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;

/// Page-level primitives a catalog API exposes.
///
/// Implementations translate their API failures into `CatalogError` and do
/// not retry; retrying and throttling belong to `Gateway`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Short catalog name used in reports ("spotify", "youtube").
    fn name(&self) -> &str;

    /// One page of a playlist's tracks. `page` is the token returned by the
    /// previous page, `None` for the first one.
    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        page: Option<String>,
    ) -> Result<Page<Track>>;

    /// One page of the authenticated user's playlists.
    async fn playlists_page(&self, page: Option<String>) -> Result<Page<PlaylistSummary>>;

    async fn search_tracks(&self, _query: &str, _limit: usize) -> Result<Vec<Track>> {
        Err(CatalogError::Unsupported("search"))
    }

    /// Adds `refs` to the playlist. Refs already present count as applied.
    async fn add_tracks(&self, _playlist_id: &str, _refs: &[TrackRef]) -> Result<BatchOutcome> {
        Err(CatalogError::Unsupported("adding tracks"))
    }

    /// Removes every occurrence of `refs`. Absent refs count as applied.
    async fn remove_tracks(
        &self,
        _playlist_id: &str,
        _refs: &[TrackRef],
    ) -> Result<BatchOutcome> {
        Err(CatalogError::Unsupported("removing tracks"))
    }

    /// Largest number of refs accepted by one mutation call.
    fn max_batch_size(&self) -> usize {
        1
    }

    /// API requests made by one `playlist_tracks_page` or `search_tracks` call.
    fn lookup_cost(&self) -> usize {
        1
    }
}

/// Per-reference result of one mutation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub applied: Vec<TrackRef>,
    pub failed: Vec<RefFailure>,
}

impl BatchOutcome {
    pub fn all_applied(refs: &[TrackRef]) -> Self {
        Self {
            applied: refs.to_vec(),
            failed: Vec::new(),
        }
    }

    pub fn all_failed(refs: &[TrackRef], error: CatalogError) -> Self {
        Self {
            applied: Vec::new(),
            failed: refs
                .iter()
                .map(|r| RefFailure {
                    reference: r.clone(),
                    error: error.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefFailure {
    pub reference: TrackRef,
    pub error: CatalogError,
}

/// Throttled, retrying access to one catalog.
///
/// Cloning is cheap and clones share the rate limiter, so every task working
/// against the same catalog draws from the same budget.
#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn CatalogClient>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl Gateway {
    pub fn new(client: Arc<dyn CatalogClient>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            retry,
        }
    }

    pub fn name(&self) -> &str {
        self.client.name()
    }

    pub fn max_batch_size(&self) -> usize {
        self.client.max_batch_size().max(1)
    }

    /// Lazily pages through a playlist. Every call starts from the first page.
    pub fn list_playlist_tracks<'a>(
        &'a self,
        playlist_id: &'a str,
    ) -> BoxStream<'a, Result<Track>> {
        let cost = self.client.lookup_cost();
        self.paginate("list playlist tracks", cost, move |page| {
            self.client.playlist_tracks_page(playlist_id, page)
        })
    }

    pub fn list_playlists(&self) -> BoxStream<'_, Result<PlaylistSummary>> {
        self.paginate("list playlists", 1, move |page| self.client.playlists_page(page))
    }

    pub async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let cost = self.client.lookup_cost();
        self.call("search tracks", cost, || self.client.search_tracks(query, limit))
            .await
    }

    pub async fn add_tracks(&self, playlist_id: &str, refs: &[TrackRef]) -> Result<BatchOutcome> {
        if refs.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.call("add tracks", refs.len(), || {
            self.client.add_tracks(playlist_id, refs)
        })
        .await
    }

    pub async fn remove_tracks(&self, playlist_id: &str, refs: &[TrackRef]) -> Result<BatchOutcome> {
        if refs.is_empty() {
            return Ok(BatchOutcome::default());
        }
        self.call("remove tracks", refs.len(), || {
            self.client.remove_tracks(playlist_id, refs)
        })
        .await
    }

    /// Runs one catalog call under the retry policy, taking `cost` rate-limit
    /// tokens before each attempt.
    async fn call<T, Op, Fut>(&self, operation: &str, cost: usize, op: Op) -> Result<T>
    where
        Op: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let limiter = &self.limiter;
        let gate = move || async move {
            for _ in 0..cost {
                limiter.acquire().await;
            }
        };
        let operation = format!("{} {}", self.name(), operation);
        self.retry.run(&operation, gate, op).await
    }

    fn paginate<'a, T, F, Fut>(
        &'a self,
        operation: &'static str,
        cost: usize,
        fetch: F,
    ) -> BoxStream<'a, Result<T>>
    where
        T: Send + 'a,
        F: Fn(Option<String>) -> Fut + Send + Sync + 'a,
        Fut: std::future::Future<Output = Result<Page<T>>> + Send + 'a,
    {
        enum Cursor {
            Start,
            Next(String),
            Done,
        }

        let fetch = Arc::new(fetch);
        stream::try_unfold(Cursor::Start, move |cursor| {
            let fetch = Arc::clone(&fetch);
            async move {
                let token = match cursor {
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                    Cursor::Done => return Ok(None),
                };
                let page = self
                    .call(operation, cost, || fetch(token.clone()))
                    .await?;
                let next = page.next.map_or(Cursor::Done, Cursor::Next);
                let items = page.items.into_iter().map(Ok::<T, CatalogError>);
                Ok::<_, CatalogError>(Some((stream::iter(items), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}
