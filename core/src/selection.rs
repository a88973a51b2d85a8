use crate::accumulator::Aggregates;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Rule deciding which ranked candidates survive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Keep the `n` best candidates.
    TopN(usize),
    /// Keep every candidate whose average is at most this distance.
    #[serde(rename = "max_distance")]
    Threshold(f64),
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::TopN(20)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub path: PathBuf,
    pub average: f64,
    pub contributions: usize,
}

/// Candidates in ascending order of average distance.
pub type RankedResult = Vec<RankedCandidate>;

/// Orders every aggregate by average, path breaking ties, then applies `policy`.
pub fn select(aggregates: &Aggregates, policy: SelectionPolicy) -> RankedResult {
    let mut ranked: RankedResult = aggregates
        .entries()
        .map(|entry| RankedCandidate {
            path: entry.candidate_path.clone(),
            average: aggregates.average(entry),
            contributions: entry.contributions,
        })
        .collect();
    ranked.sort_by(compare_ranked);

    match policy {
        SelectionPolicy::TopN(limit) => {
            ranked.truncate(limit);
            ranked
        }
        SelectionPolicy::Threshold(max_distance) => ranked
            .into_iter()
            .take_while(|candidate| candidate.average <= max_distance)
            .collect(),
    }
}

fn compare_ranked(left: &RankedCandidate, right: &RankedCandidate) -> Ordering {
    left.average
        .total_cmp(&right.average)
        .then_with(|| left.path.cmp(&right.path))
}
