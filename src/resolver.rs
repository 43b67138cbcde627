//! Cross-catalog track identity: search the target catalog and accept the
//! best-scoring candidate, or report the track as unresolved.

use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{MatchCandidate, Track};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static RE_FEAT_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\(\[]\s*(feat\.?|ft\.?|featuring)\s[^\)\]]*[\)\]]").expect("valid regex")
});
static RE_FEAT_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(feat\.?|ft\.?|featuring)\s.*$").expect("valid regex"));
static RE_UPLOAD_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[\(\[][^\)\]]*\b(official|video|audio|lyrics?|visuali[sz]er|mv)\b[^\)\]]*[\)\]]")
        .expect("valid regex")
});
static RE_NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

const TITLE_WEIGHT: f64 = 0.55;
const ARTIST_WEIGHT: f64 = 0.35;
const DURATION_WEIGHT: f64 = 0.10;
const PRIMARY_ARTIST_SHARE: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// A candidate is accepted only when its score exceeds this value.
    pub threshold: f64,

    /// Durations further apart than this contribute nothing.
    pub duration_tolerance_secs: u32,

    /// Maximum candidates requested per search.
    pub search_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            duration_tolerance_secs: 5,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// `track` is the source track with its target ref filled in.
    Matched { track: Track, candidate: MatchCandidate },
    Unresolved,
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Search query for a source track: title followed by the primary artist.
    pub fn query_for(track: &Track) -> String {
        match track.primary_artist() {
            Some(artist) => format!("{} {}", track.title, artist),
            None => track.title.clone(),
        }
    }

    /// Searches the target catalog for `source` and picks a match.
    ///
    /// Search failures are returned to the caller; an empty or weak result
    /// set is `Resolution::Unresolved`.
    pub async fn resolve(&self, target: &Gateway, source: &Track) -> Result<Resolution> {
        if source.title.trim().is_empty() {
            return Ok(Resolution::Unresolved);
        }

        let candidates = target
            .search_tracks(&Self::query_for(source), self.config.search_limit)
            .await?;

        Ok(match self.best_match(source, candidates) {
            Some(candidate) => match &candidate.track.target_ref {
                Some(target_ref) => Resolution::Matched {
                    track: source.resolved_to(target_ref.clone()),
                    candidate,
                },
                None => Resolution::Unresolved,
            },
            None => Resolution::Unresolved,
        })
    }

    /// The top-ranked candidate if it clears the threshold.
    pub fn best_match(&self, source: &Track, candidates: Vec<Track>) -> Option<MatchCandidate> {
        self.rank(source, candidates)
            .into_iter()
            .next()
            .filter(|c| c.score > self.config.threshold)
    }

    /// Scores every candidate that carries a target ref and orders them best
    /// first: higher score, then closer duration, then search order.
    pub fn rank(&self, source: &Track, candidates: Vec<Track>) -> Vec<MatchCandidate> {
        let mut ranked: Vec<(MatchCandidate, u32)> = candidates
            .into_iter()
            .filter(|c| c.target_ref.is_some())
            .map(|track| {
                let gap = duration_gap(source, &track).unwrap_or(u32::MAX);
                let score = self.score(source, &track);
                (MatchCandidate { track, score }, gap)
            })
            .collect();

        // stable: equal keys keep search order
        ranked.sort_by(|(a, a_gap), (b, b_gap)| {
            b.score.total_cmp(&a.score).then_with(|| a_gap.cmp(b_gap))
        });
        ranked.into_iter().map(|(c, _)| c).collect()
    }

    /// Combined similarity in `[0, 1]`.
    pub fn score(&self, source: &Track, candidate: &Track) -> f64 {
        let title = title_similarity(&source.title, &candidate.title);
        let artists = artist_similarity(&source.artists, &candidate.artists);
        let duration = self.duration_closeness(source, candidate);

        (TITLE_WEIGHT * title + ARTIST_WEIGHT * artists + DURATION_WEIGHT * duration).clamp(0.0, 1.0)
    }

    fn duration_closeness(&self, source: &Track, candidate: &Track) -> f64 {
        let tolerance = self.config.duration_tolerance_secs;
        match duration_gap(source, candidate) {
            Some(gap) if gap <= tolerance => 1.0 - f64::from(gap) / f64::from(tolerance + 1),
            _ => 0.0,
        }
    }
}

fn duration_gap(a: &Track, b: &Track) -> Option<u32> {
    Some(a.duration_secs?.abs_diff(b.duration_secs?))
}

/// Lowercased words with punctuation removed.
fn normalize(s: &str) -> String {
    RE_NON_WORD
        .replace_all(&s.replace('_', " "), " ")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title without featuring clauses or upload qualifiers, normalized.
fn normalize_title(title: &str) -> String {
    let title = RE_FEAT_BRACKET.replace_all(title, "");
    let title = RE_UPLOAD_NOISE.replace_all(&title, "");
    let title = RE_FEAT_TAIL.replace(&title, "");
    normalize(&title)
}

fn title_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_title(a), normalize_title(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b).max(dice(&a, &b))
}

/// Word-set Dice coefficient; forgives reordered words.
fn dice(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    2.0 * a.intersection(&b).count() as f64 / total as f64
}

/// Primary artist match dominates; secondary artists add the remainder.
fn artist_similarity(source: &[String], candidate: &[String]) -> f64 {
    let source: Vec<String> = source.iter().map(|a| normalize(a)).collect();
    let candidate: Vec<String> = candidate.iter().map(|a| normalize(a)).collect();
    let (Some(primary), Some(candidate_primary)) = (source.first(), candidate.first()) else {
        return 0.0;
    };

    let primary_score = if primary == candidate_primary {
        1.0
    } else if candidate.contains(primary) || contains_word_run(candidate_primary, primary) {
        // "Artist X & Artist Y" style channel names
        0.75
    } else {
        0.0
    };

    let secondary = &source[1..];
    let secondary_score = if secondary.is_empty() {
        primary_score
    } else {
        let hits = secondary
            .iter()
            .filter(|a| candidate.contains(a) || contains_word_run(candidate_primary, a))
            .count();
        hits as f64 / secondary.len() as f64
    };

    PRIMARY_ARTIST_SHARE * primary_score + (1.0 - PRIMARY_ARTIST_SHARE) * secondary_score
}

/// `needle` appears in `haystack` on word boundaries.
fn contains_word_run(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}
