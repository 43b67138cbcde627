use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque track identifier inside one catalog (a Spotify track id, a YouTube video id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A track as read from a catalog.
///
/// Tracks are never mutated after construction; resolving a source track
/// against the target catalog yields a new value with `target_ref` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,

    /// Primary artist first
    pub artists: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<TrackRef>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<TrackRef>,
}

impl Track {
    pub fn new(title: impl Into<String>, artists: Vec<String>, duration_secs: Option<u32>) -> Self {
        Self {
            title: title.into(),
            artists,
            duration_secs,
            source_ref: None,
            target_ref: None,
        }
    }

    /// Track read from the source catalog.
    pub fn from_source(
        source_ref: TrackRef,
        title: impl Into<String>,
        artists: Vec<String>,
        duration_secs: Option<u32>,
    ) -> Self {
        Self {
            source_ref: Some(source_ref),
            ..Self::new(title, artists, duration_secs)
        }
    }

    /// Track read from the target catalog.
    pub fn from_target(
        target_ref: TrackRef,
        title: impl Into<String>,
        artists: Vec<String>,
        duration_secs: Option<u32>,
    ) -> Self {
        Self {
            target_ref: Some(target_ref),
            ..Self::new(title, artists, duration_secs)
        }
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }

    /// Returns a copy of this track resolved to `target_ref`.
    pub fn resolved_to(&self, target_ref: TrackRef) -> Self {
        Self {
            target_ref: Some(target_ref),
            ..self.clone()
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.artists.is_empty() {
            true => write!(f, "{}", self.title),
            false => write!(f, "{} - {}", self.artists.join(", "), self.title),
        }
    }
}

/// Playlist header as returned by `list playlists`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
}

/// Declared correspondence between a source playlist and a target playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mapping {
    pub source_id: String,
    pub target_id: String,
}

impl Mapping {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_id, self.target_id)
    }
}

/// Immutable list of mappings taken once at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSnapshot {
    mappings: Vec<Mapping>,
}

impl MappingSnapshot {
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self { mappings }
    }

    /// Keep only mappings whose source playlist is `source_id`.
    pub fn only_source(self, source_id: &str) -> Self {
        Self {
            mappings: self
                .mappings
                .into_iter()
                .filter(|m| m.source_id == source_id)
                .collect(),
        }
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// A target-catalog track scored against a source track.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub track: Track,

    /// In `[0, 1]`
    pub score: f64,
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolving_returns_a_new_track() {
        let source = Track::from_source("sp1".into(), "Song A", vec!["Artist X".into()], Some(210));
        let resolved = source.resolved_to("yt1".into());

        assert_eq!(source.target_ref, None);
        assert_eq!(resolved.target_ref, Some(TrackRef::from("yt1")));
        assert_eq!(resolved.source_ref, source.source_ref);
    }

    #[test]
    fn snapshot_filters_by_source() {
        let snapshot = MappingSnapshot::new(vec![Mapping::new("a", "1"), Mapping::new("b", "2")]);
        let only = snapshot.only_source("b");

        assert_eq!(only.mappings(), &[Mapping::new("b", "2")]);
    }

    #[test]
    fn display_joins_artists() {
        let track = Track::new("Song", vec!["X".into(), "Y".into()], None);
        assert_eq!(track.to_string(), "X, Y - Song");
    }
}
