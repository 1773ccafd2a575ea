use std::collections::HashMap;

use leaven_common::{Candidate, IdentityKey};

/// How a batch changed the set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: u32,
    pub merged: u32,
}

/// Candidates for one run, unique by identity key, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    index: HashMap<IdentityKey, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fold into the existing sighting. Returns true if the
    /// candidate was new.
    ///
    /// A sighting whose bucket is not indexed yet still folds into the
    /// nearest same-name candidate in a neighbouring bucket when the two agree
    /// within `COORD_EPSILON_DEG`.
    pub fn insert(&mut self, candidate: Candidate) -> bool {
        let key = candidate.identity_key();
        let existing = self
            .index
            .get(&key)
            .copied()
            .or_else(|| self.nearest_neighbour(&key, &candidate));
        match existing {
            Some(pos) => {
                self.candidates[pos].absorb(candidate);
                false
            }
            None => {
                self.index.insert(key, self.candidates.len());
                self.candidates.push(candidate);
                true
            }
        }
    }

    pub fn merge(&mut self, batch: impl IntoIterator<Item = Candidate>) -> MergeStats {
        let mut stats = MergeStats::default();
        for candidate in batch {
            if self.insert(candidate) {
                stats.added += 1;
            } else {
                stats.merged += 1;
            }
        }
        stats
    }

    fn nearest_neighbour(&self, key: &IdentityKey, candidate: &Candidate) -> Option<usize> {
        key.neighbours()
            .iter()
            .filter_map(|k| self.index.get(k).copied())
            .filter_map(|pos| {
                self.candidates[pos]
                    .coordinate_gap(candidate)
                    .map(|gap| (pos, gap))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(pos, _)| pos)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut set = CandidateSet::new();
        set.merge(iter);
        set
    }
}
