use crate::error::{CatalogError, Result, SyncError};
use crate::gateway::{BatchOutcome, CatalogClient, RefFailure};
use crate::model::{Page, PlaylistSummary, Track, TrackRef};
use async_trait::async_trait;
use google_youtube3::{
    YouTube,
    api::{PlaylistItem, PlaylistItemSnippet, ResourceId},
    hyper_util, yup_oauth2,
};
use hyper::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

const MUSIC_CATEGORY_ID: &str = "10";
const PAGE_SIZE: u32 = 50;

type Connector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// YouTube (Music) client used as the target catalog. Track refs are video ids.
pub struct YouTubeClient {
    hub: YouTube<Connector>,

    /// playlist id -> video id -> playlist item ids, filled while reading playlists.
    /// Removal deletes playlist items, not videos, so it needs this lookup.
    items: Mutex<HashMap<String, HashMap<String, Vec<String>>>>,
}

impl YouTubeClient {
    pub async fn new(oauth_json_path: &str) -> std::result::Result<Self, SyncError> {
        let client_err = |e: &dyn std::fmt::Display| SyncError::Client(e.to_string());

        // Read OAuth2 credentials from the provided JSON file
        let secret = yup_oauth2::read_application_secret(oauth_json_path)
            .await
            .map_err(|e| client_err(&e))?;

        // Token cache lives next to the configuration file
        let cache_dir = confy::get_configuration_file_path(crate::config::APP_NAME, None)?
            .parent()
            .ok_or(SyncError::MissingSetting("configuration directory"))?
            .to_path_buf();

        std::fs::create_dir_all(&cache_dir).map_err(|e| client_err(&e))?;
        let token_cache_path = cache_dir.join("token_cache.json");

        let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
            secret,
            yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(token_cache_path)
        .build()
        .await
        .map_err(|e| client_err(&e))?;

        let scopes = &["https://www.googleapis.com/auth/youtube"];
        auth.token(scopes).await.map_err(|e| client_err(&e))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| client_err(&e))?
            .https_or_http()
            .enable_http1()
            .build();

        let hub = YouTube::new(
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(connector),
            auth,
        );

        Ok(Self {
            hub,
            items: Mutex::new(HashMap::new()),
        })
    }

    /// Durations for `video_ids` in seconds, keyed by video id.
    async fn durations(&self, video_ids: &[String]) -> Result<HashMap<String, u32>> {
        let mut durations = HashMap::new();

        for chunk in video_ids.chunks(PAGE_SIZE as usize) {
            let mut request = self.hub.videos().list(&vec!["contentDetails".to_string()]);
            for id in chunk {
                request = request.add_id(id);
            }

            let (_, response) = request
                .doit()
                .await
                .map_err(|e| classify(e, "videos"))?;

            for video in response.items.unwrap_or_default() {
                let secs = video
                    .content_details
                    .and_then(|d| d.duration)
                    .and_then(|d| parse_duration(&d));
                if let (Some(id), Some(secs)) = (video.id, secs) {
                    durations.insert(id, secs);
                }
            }
        }

        Ok(durations)
    }

    fn is_present(&self, playlist_id: &str, video_id: &str) -> bool {
        self.items
            .lock()
            .map(|items| {
                items
                    .get(playlist_id)
                    .is_some_and(|videos| videos.contains_key(video_id))
            })
            .unwrap_or(false)
    }

    fn record_item(&self, playlist_id: &str, video_id: &str, item_id: String) {
        if let Ok(mut items) = self.items.lock() {
            items
                .entry(playlist_id.to_string())
                .or_default()
                .entry(video_id.to_string())
                .or_default()
                .push(item_id);
        }
    }

    fn item_ids(&self, playlist_id: &str, video_id: &str) -> Vec<String> {
        self.items
            .lock()
            .ok()
            .and_then(|items| items.get(playlist_id)?.get(video_id).cloned())
            .unwrap_or_default()
    }

    fn forget_video(&self, playlist_id: &str, video_id: &str) {
        if let Ok(mut items) = self.items.lock() {
            if let Some(videos) = items.get_mut(playlist_id) {
                videos.remove(video_id);
            }
        }
    }

    async fn insert(&self, playlist_id: &str, video: &TrackRef) -> Result<()> {
        if self.is_present(playlist_id, video.as_str()) {
            debug!("{} already in {}, skipping insert", video, playlist_id);
            return Ok(());
        }

        let playlist_item = PlaylistItem {
            snippet: Some(PlaylistItemSnippet {
                playlist_id: Some(playlist_id.to_string()),
                resource_id: Some(ResourceId {
                    kind: Some("youtube#video".to_string()),
                    video_id: Some(video.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, inserted) = self
            .hub
            .playlist_items()
            .insert(playlist_item)
            .add_part("snippet")
            .doit()
            .await
            .map_err(|e| classify(e, &format!("playlist {playlist_id}")))?;

        if let Some(item_id) = inserted.id {
            self.record_item(playlist_id, video.as_str(), item_id);
        }
        Ok(())
    }

    async fn delete(&self, playlist_id: &str, video: &TrackRef) -> Result<()> {
        for item_id in self.item_ids(playlist_id, video.as_str()) {
            match self.hub.playlist_items().delete(&item_id).doit().await {
                Ok(_) => {}
                // already gone
                Err(e) if classify_ref(&e).is_some_and(|s| s == StatusCode::NOT_FOUND) => {}
                Err(e) => return Err(classify(e, &format!("playlist item {item_id}"))),
            }
        }
        self.forget_video(playlist_id, video.as_str());
        Ok(())
    }
}

/// Applies `op` to each ref. A failure before anything was applied fails the
/// whole call so the gateway can retry it; later failures are per reference.
async fn per_ref<'a, F, Fut>(refs: &'a [TrackRef], op: F) -> Result<BatchOutcome>
where
    F: Fn(&'a TrackRef) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut outcome = BatchOutcome::default();
    for reference in refs {
        match op(reference).await {
            Ok(()) => outcome.applied.push(reference.clone()),
            Err(e) if outcome.applied.is_empty() && outcome.failed.is_empty() => return Err(e),
            Err(error) => outcome.failed.push(RefFailure {
                reference: reference.clone(),
                error,
            }),
        }
    }
    Ok(outcome)
}

#[async_trait]
impl CatalogClient for YouTubeClient {
    fn name(&self) -> &str {
        "youtube"
    }

    /// Tracks pages and searches both follow up with `videos.list` for durations.
    fn lookup_cost(&self) -> usize {
        2
    }

    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        page: Option<String>,
    ) -> Result<Page<Track>> {
        let mut request = self
            .hub
            .playlist_items()
            .list(&vec!["snippet".to_string(), "contentDetails".to_string()])
            .playlist_id(playlist_id)
            .max_results(PAGE_SIZE);

        if let Some(token) = &page {
            request = request.page_token(token);
        }

        let (_, result) = request
            .doit()
            .await
            .map_err(|e| classify(e, &format!("playlist {playlist_id}")))?;

        if page.is_none() {
            if let Ok(mut items) = self.items.lock() {
                items.insert(playlist_id.to_string(), HashMap::new());
            }
        }

        let mut entries = Vec::new();
        for item in result.items.unwrap_or_default() {
            let video_id = item.content_details.as_ref().and_then(|d| d.video_id.clone());
            let (Some(video_id), Some(snippet)) = (video_id, item.snippet) else {
                continue;
            };
            if let Some(item_id) = item.id {
                self.record_item(playlist_id, &video_id, item_id);
            }
            let (title, artists) = split_video_title(
                snippet.title.as_deref().unwrap_or_default(),
                snippet.video_owner_channel_title.as_deref(),
            );
            entries.push((video_id, title, artists));
        }

        let ids: Vec<String> = entries.iter().map(|(id, _, _)| id.clone()).collect();
        let durations = self.durations(&ids).await?;

        let items = entries
            .into_iter()
            .map(|(id, title, artists)| {
                let duration = durations.get(&id).copied();
                Track::from_target(TrackRef::new(id), title, artists, duration)
            })
            .collect();

        Ok(Page {
            items,
            next: result.next_page_token,
        })
    }

    async fn playlists_page(&self, page: Option<String>) -> Result<Page<PlaylistSummary>> {
        let mut request = self
            .hub
            .playlists()
            .list(&vec!["snippet".to_string()])
            .mine(true)
            .max_results(PAGE_SIZE);

        if let Some(token) = &page {
            request = request.page_token(token);
        }

        let (_, result) = request
            .doit()
            .await
            .map_err(|e| classify(e, "playlists"))?;

        let items = result
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                let name = p.snippet.and_then(|s| s.title).unwrap_or_default();
                Some(PlaylistSummary { id: p.id?, name })
            })
            .collect();

        Ok(Page {
            items,
            next: result.next_page_token,
        })
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let (_, result) = self
            .hub
            .search()
            .list(&vec!["snippet".to_string()])
            .q(query)
            .add_type("video")
            .video_category_id(MUSIC_CATEGORY_ID)
            .max_results(limit.min(PAGE_SIZE as usize) as u32)
            .doit()
            .await
            .map_err(|e| classify(e, "search"))?;

        let mut entries = Vec::new();
        for hit in result.items.unwrap_or_default() {
            let video_id = hit.id.and_then(|id| id.video_id);
            let (Some(video_id), Some(snippet)) = (video_id, hit.snippet) else {
                continue;
            };
            let (title, artists) = split_video_title(
                snippet.title.as_deref().unwrap_or_default(),
                snippet.channel_title.as_deref(),
            );
            entries.push((video_id, title, artists));
        }

        let ids: Vec<String> = entries.iter().map(|(id, _, _)| id.clone()).collect();
        let durations = self.durations(&ids).await?;
        info!("Search '{}' returned {} candidates", query, entries.len());

        Ok(entries
            .into_iter()
            .map(|(id, title, artists)| {
                let duration = durations.get(&id).copied();
                Track::from_target(TrackRef::new(id), title, artists, duration)
            })
            .collect())
    }

    async fn add_tracks(&self, playlist_id: &str, refs: &[TrackRef]) -> Result<BatchOutcome> {
        per_ref(refs, |video| self.insert(playlist_id, video)).await
    }

    async fn remove_tracks(&self, playlist_id: &str, refs: &[TrackRef]) -> Result<BatchOutcome> {
        per_ref(refs, |video| self.delete(playlist_id, video)).await
    }
}

/// HTTP status behind a YouTube API error, when there is one.
fn classify_ref(e: &google_youtube3::Error) -> Option<StatusCode> {
    match e {
        google_youtube3::Error::Failure(response) => Some(response.status()),
        google_youtube3::Error::BadRequest(value) => value["error"]["code"]
            .as_u64()
            .and_then(|code| StatusCode::from_u16(code as u16).ok()),
        _ => None,
    }
}

fn classify(e: google_youtube3::Error, resource: &str) -> CatalogError {
    use google_youtube3::Error;

    if let Error::BadRequest(value) = &e {
        let reason = value["error"]["errors"][0]["reason"].as_str().unwrap_or_default();
        if matches!(
            reason,
            "quotaExceeded" | "rateLimitExceeded" | "userRateLimitExceeded"
        ) {
            return CatalogError::RateLimited { retry_after: None };
        }
    }
    if let Some(status) = classify_ref(&e) {
        return CatalogError::from_status(status, resource, e.to_string());
    }

    match e {
        Error::MissingToken(err) => CatalogError::Authentication(err.to_string()),
        Error::MissingAPIKey => CatalogError::Authentication("missing API key".to_string()),
        Error::HttpError(err) => CatalogError::Transient(err.to_string()),
        Error::Io(err) => CatalogError::Transient(err.to_string()),
        Error::JsonDecodeError(_, err) => CatalogError::Decode(err.to_string()),
        other => CatalogError::Rejected(other.to_string()),
    }
}

/// Splits a video title into (title, artists).
///
/// Auto-generated "Artist - Topic" channels carry the bare song title; other
/// uploads usually follow "Artist - Title".
fn split_video_title(title: &str, channel: Option<&str>) -> (String, Vec<String>) {
    if let Some(artist) = channel.and_then(|c| c.strip_suffix(" - Topic")) {
        return (title.to_string(), vec![artist.to_string()]);
    }
    if let Some((artist, song)) = title.split_once(" - ") {
        return (song.trim().to_string(), vec![artist.trim().to_string()]);
    }
    let artists = channel.map(|c| vec![c.to_string()]).unwrap_or_default();
    (title.to_string(), artists)
}

/// Parses an ISO 8601 duration such as `PT3M30S` into seconds.
fn parse_duration(iso: &str) -> Option<u32> {
    let rest = iso.strip_prefix('P')?;
    let (days, time) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut total: u32 = 0;
    let mut number = String::new();
    for (part, in_time) in [(days, false), (time, true)] {
        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }
            let value: u32 = number.parse().ok()?;
            number.clear();
            let unit: u32 = match (c, in_time) {
                ('D', false) => 86_400,
                ('W', false) => 604_800,
                ('H', true) => 3_600,
                ('M', true) => 60,
                ('S', true) => 1,
                _ => return None,
            };
            total = total.checked_add(value.checked_mul(unit)?)?;
        }
    }

    number.is_empty().then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("PT3M30S"), Some(210));
        assert_eq!(parse_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_duration("PT45S"), Some(45));
        assert_eq!(parse_duration("P0D"), Some(0));
        assert_eq!(parse_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_duration("3M30S"), None);
        assert_eq!(parse_duration("PT3X"), None);
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("P10000W"), None);
        assert_eq!(parse_duration("PT4294967295S"), Some(u32::MAX));
        assert_eq!(parse_duration("PT4294967295S1S"), None);
        assert_eq!(parse_duration("PT99999999999S"), None);
    }

    #[test]
    fn test_split_topic_channel() {
        let (title, artists) = split_video_title("Song A", Some("Artist X - Topic"));
        assert_eq!(title, "Song A");
        assert_eq!(artists, ["Artist X"]);
    }

    #[test]
    fn test_split_artist_dash_title() {
        let (title, artists) = split_video_title("Artist X - Song A (Official Video)", Some("ArtistXVEVO"));
        assert_eq!(title, "Song A (Official Video)");
        assert_eq!(artists, ["Artist X"]);
    }

    #[test]
    fn test_split_falls_back_to_channel() {
        let (title, artists) = split_video_title("Song A", Some("Artist X"));
        assert_eq!(title, "Song A");
        assert_eq!(artists, ["Artist X"]);
    }
}
