use crate::enumerator::ImageRef;
use crate::scorer::Observation;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Divisor used when turning an accumulated sum into an average.
///
/// `References` divides by the number of reference images enumerated at the
/// start of the run, so a candidate missing comparisons (failed pairs, cap
/// truncation) ends up with a lower, better-looking average. `Contributions`
/// divides by the number of comparisons that actually succeeded instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AverageBase {
    #[default]
    References,
    Contributions,
}

impl AverageBase {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "references" | "reference" => Some(Self::References),
            "contributions" | "contribution" => Some(Self::Contributions),
            _ => None,
        }
    }
}

/// Accumulated statistics for one candidate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub candidate_path: PathBuf,
    pub sum: f64,
    pub contributions: usize,
}

impl AggregateEntry {
    fn new(candidate_path: PathBuf) -> Self {
        Self {
            candidate_path,
            sum: 0.0,
            contributions: 0,
        }
    }

    fn record(&mut self, distance: f64) {
        self.sum += distance;
        self.contributions += 1;
    }
}

/// Per-candidate aggregates plus the reference count captured at enumeration.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    entries: FxHashMap<PathBuf, AggregateEntry>,
    reference_count: usize,
    base: AverageBase,
}

impl Aggregates {
    pub fn new(reference_count: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            reference_count,
            base: AverageBase::References,
        }
    }

    pub fn with_base(mut self, base: AverageBase) -> Self {
        self.base = base;
        self
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    pub fn base(&self) -> AverageBase {
        self.base
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, candidate: &Path) -> Option<&AggregateEntry> {
        self.entries.get(candidate)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AggregateEntry> {
        self.entries.values()
    }

    /// Computes the ranking key for `entry` from the captured divisor.
    pub fn average(&self, entry: &AggregateEntry) -> f64 {
        let divisor = match self.base {
            AverageBase::References => self.reference_count,
            AverageBase::Contributions => entry.contributions,
        };
        if divisor == 0 {
            return f64::INFINITY;
        }
        entry.sum / divisor as f64
    }

    /// Folds one reference's observations into the map.
    pub fn absorb(&mut self, observations: &[Observation]) {
        for observation in observations {
            self.entries
                .entry(observation.candidate.path.clone())
                .or_insert_with(|| AggregateEntry::new(observation.candidate.path.clone()))
                .record(observation.distance);
        }
    }
}

/// Merges per-reference observation lists once the worker pool has drained.
pub fn merge<'a, I>(per_reference: I, reference_count: usize) -> Aggregates
where
    I: IntoIterator<Item = (&'a ImageRef, &'a [Observation])>,
{
    let mut aggregates = Aggregates::new(reference_count);
    for (_, observations) in per_reference {
        aggregates.absorb(observations);
    }
    aggregates
}
