use crate::model::TrackRef;
use serde::Serialize;
use std::collections::HashSet;

/// Changes that turn the actual target playlist into the desired one.
///
/// `to_add` and `to_remove` are disjoint and free of duplicates; both keep the
/// order in which refs first appeared in their input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub to_add: Vec<TrackRef>,
    pub to_remove: Vec<TrackRef>,

    /// Refs both desired and present
    pub unchanged: usize,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Set difference in both directions. Duplicates on either side count once.
pub fn compute<'a, D, A>(desired: D, actual: A) -> DiffResult
where
    D: IntoIterator<Item = &'a TrackRef>,
    A: IntoIterator<Item = &'a TrackRef>,
{
    let desired = dedup(desired);
    let actual = dedup(actual);

    let desired_set: HashSet<&TrackRef> = desired.iter().copied().collect();
    let actual_set: HashSet<&TrackRef> = actual.iter().copied().collect();

    let to_add: Vec<TrackRef> = desired
        .iter()
        .filter(|r| !actual_set.contains(*r))
        .map(|r| (*r).clone())
        .collect();
    let to_remove: Vec<TrackRef> = actual
        .iter()
        .filter(|r| !desired_set.contains(*r))
        .map(|r| (*r).clone())
        .collect();

    DiffResult {
        unchanged: desired.len() - to_add.len(),
        to_add,
        to_remove,
    }
}

fn dedup<'a>(refs: impl IntoIterator<Item = &'a TrackRef>) -> Vec<&'a TrackRef> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(*r)).collect()
}
