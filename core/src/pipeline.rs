//! End-to-end ranking run: enumerate, score on the pool, merge, select.
//!
//! Materialization is left to the caller so a cancelled or failed run never
//! touches the output directory.

use crate::accumulator::{merge, AverageBase};
use crate::config::{ConfigError, RunConfig};
use crate::enumerator::{enumerate_images, EnumerationError, ImageRef};
use crate::materialize::MaterializeError;
use crate::oracle::{DistanceOracle, OracleError, PerceptualOracle, TimeoutOracle};
use crate::pool::{CancelToken, PoolError, WorkerPool};
use crate::scorer::PairScorer;
use crate::selection::{select, RankedResult, SelectionPolicy};
use indicatif::ProgressBar;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Knobs of a single ranking pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankOptions {
    pub concurrency: usize,
    pub cap: usize,
    pub policy: SelectionPolicy,
    pub average: AverageBase,
}

impl From<&RunConfig> for RankOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            cap: config.cap,
            policy: config.selection,
            average: config.average,
        }
    }
}

/// Outcome of a ranking pass, before anything is written to disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reference_count: usize,
    pub candidate_count: usize,
    /// Distinct candidates with at least one accepted observation.
    pub aggregated: usize,
    pub ranked: RankedResult,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub compared_pairs: usize,
    pub failed_pairs: usize,
    pub degenerate_pairs: usize,
    pub truncated_references: usize,
}

/// Both image sets, each enumerated once for the whole run.
#[derive(Debug, Clone)]
pub struct ImageSets {
    pub references: Vec<ImageRef>,
    pub candidates: Vec<ImageRef>,
}

pub fn enumerate_sets(config: &RunConfig) -> Result<ImageSets, RunError> {
    let references = enumerate_images(&config.reference_root, &config.extensions)
        .map_err(|source| RunError::Enumeration {
            role: SetRole::Reference,
            source,
        })?;
    let candidates = enumerate_images(config.candidate_root()?, &config.extensions)
        .map_err(|source| RunError::Enumeration {
            role: SetRole::Candidate,
            source,
        })?;
    Ok(ImageSets {
        references,
        candidates,
    })
}

/// Ranks `sets` with the built-in oracle selected by `backend` and `model`.
pub fn run_tags(
    config: &RunConfig,
    sets: &ImageSets,
    backend: &str,
    model: &str,
    progress: &ProgressBar,
    cancel: &CancelToken,
) -> Result<RunSummary, RunError> {
    let oracle = PerceptualOracle::from_tags(model, backend).map_err(RunError::Oracle)?;
    let options = RankOptions::from(config);
    match config.oracle_timeout() {
        Some(limit) => rank(
            &sets.references,
            &sets.candidates,
            &TimeoutOracle::new(oracle, limit),
            options,
            progress,
            cancel,
        ),
        None => rank(
            &sets.references,
            &sets.candidates,
            &oracle,
            options,
            progress,
            cancel,
        ),
    }
}

/// Scores every reference against `corpus` and selects the winners.
///
/// Aggregation starts only after the pool has drained. A cancelled run
/// returns [`RunError::Cancelled`] instead of a partial ranking.
pub fn rank<O: DistanceOracle>(
    references: &[ImageRef],
    corpus: &[ImageRef],
    oracle: &O,
    options: RankOptions,
    progress: &ProgressBar,
    cancel: &CancelToken,
) -> Result<RunSummary, RunError> {
    let pool = WorkerPool::new(options.concurrency)
        .map_err(RunError::Pool)?
        .with_progress(progress.clone())
        .with_cancel(cancel.clone());
    let scorer = PairScorer::new(oracle, corpus, options.cap)
        .with_progress(progress.clone(), references.len())
        .with_cancel(cancel.clone());

    let run = pool.run(references, |reference| scorer.score(reference));
    if run.cancelled {
        return Err(RunError::Cancelled);
    }

    let mut summary = RunSummary {
        reference_count: references.len(),
        candidate_count: corpus.len(),
        completed_tasks: run.completed(),
        failed_tasks: run.failed(),
        ..RunSummary::default()
    };
    for report in run.tasks.iter().filter_map(|task| task.value()) {
        summary.compared_pairs += report.compared;
        summary.failed_pairs += report.failed_pairs;
        summary.degenerate_pairs += report.degenerate_pairs;
        if report.truncated {
            summary.truncated_references += 1;
        }
    }

    let per_reference = run.tasks.iter().map(|task| {
        let observations = task
            .value()
            .map(|report| report.observations.as_slice())
            .unwrap_or(&[]);
        (&task.reference, observations)
    });
    let aggregates = merge(per_reference, references.len()).with_base(options.average);
    summary.aggregated = aggregates.len();
    summary.ranked = select(&aggregates, options.policy);

    tracing::info!(
        references = summary.reference_count,
        candidates = summary.candidate_count,
        aggregated = summary.aggregated,
        selected = summary.ranked.len(),
        failed_tasks = summary.failed_tasks,
        failed_pairs = summary.failed_pairs,
        truncated = summary.truncated_references,
        "ranking complete"
    );
    Ok(summary)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetRole {
    Reference,
    Candidate,
}

impl Display for SetRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Candidate => write!(f, "candidate"),
        }
    }
}

/// Fatal errors that abort a run before anything is materialized.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Enumeration {
        role: SetRole,
        source: EnumerationError,
    },
    Oracle(OracleError),
    Pool(PoolError),
    Materialize(MaterializeError),
    Cancelled,
}

impl Display for RunError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(error) => write!(f, "{}", error),
            Self::Enumeration { role, source } => {
                write!(f, "cannot enumerate {} images: {}", role, source)
            }
            Self::Oracle(error) => write!(f, "cannot build distance oracle: {}", error),
            Self::Pool(error) => write!(f, "{}", error),
            Self::Materialize(error) => write!(f, "{}", error),
            Self::Cancelled => write!(f, "run cancelled before completion"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(error) => Some(error),
            Self::Enumeration { source, .. } => Some(source),
            Self::Oracle(error) => Some(error),
            Self::Pool(error) => Some(error),
            Self::Materialize(error) => Some(error),
            Self::Cancelled => None,
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<MaterializeError> for RunError {
    fn from(error: MaterializeError) -> Self {
        Self::Materialize(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corpus, ScriptedOracle};
    use image::{Rgb, RgbImage};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn options(concurrency: usize, policy: SelectionPolicy) -> RankOptions {
        RankOptions {
            concurrency,
            cap: 1_000,
            policy,
            average: AverageBase::References,
        }
    }

    fn example_oracle() -> ScriptedOracle {
        ScriptedOracle::new()
            .with("ref1", "A", Some(0.2))
            .with("ref1", "B", Some(0.4))
            .with("ref1", "C", None)
            .with("ref2", "A", Some(0.3))
            .with("ref2", "B", Some(0.1))
            .with("ref2", "C", Some(0.5))
    }

    fn rank_with(
        oracle: &ScriptedOracle,
        references: &[&str],
        candidates: &[&str],
        options: RankOptions,
    ) -> RunSummary {
        rank(
            &corpus(references),
            &corpus(candidates),
            oracle,
            options,
            &ProgressBar::hidden(),
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn failed_pair_still_divides_by_reference_count() {
        let summary = rank_with(
            &example_oracle(),
            &["ref1", "ref2"],
            &["C", "B", "A"],
            options(2, SelectionPolicy::TopN(3)),
        );

        assert_eq!(summary.aggregated, 3);
        assert_eq!(summary.failed_pairs, 1);
        let ranked: Vec<_> = summary
            .ranked
            .iter()
            .map(|candidate| (candidate.path.clone(), candidate.average, candidate.contributions))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (PathBuf::from("A"), 0.25, 2),
                (PathBuf::from("B"), 0.25, 2),
                (PathBuf::from("C"), 0.25, 1),
            ]
        );
    }

    #[test]
    fn top_one_breaks_exact_ties_by_path() {
        let summary = rank_with(
            &example_oracle(),
            &["ref1", "ref2"],
            &["C", "B", "A"],
            options(2, SelectionPolicy::TopN(1)),
        );
        assert_eq!(summary.ranked.len(), 1);
        assert_eq!(summary.ranked[0].path, PathBuf::from("A"));
        assert_eq!(summary.ranked[0].average, 0.25);
    }

    #[test]
    fn output_is_independent_of_concurrency() {
        let mut oracle = ScriptedOracle::new();
        let references: Vec<String> = (0..6).map(|index| format!("r{}", index)).collect();
        let candidates: Vec<String> = (0..12).map(|index| format!("c{:02}", index)).collect();
        for (r, reference) in references.iter().enumerate() {
            for (c, candidate) in candidates.iter().enumerate() {
                let distance = if (r + c) % 5 == 0 {
                    None
                } else {
                    Some(((r * 7 + c * 3) % 11 + 1) as f64 / 16.0)
                };
                oracle = oracle.with(reference, candidate, distance);
            }
        }
        let references: Vec<&str> = references.iter().map(String::as_str).collect();
        let candidates: Vec<&str> = candidates.iter().map(String::as_str).collect();

        let sequential = rank_with(
            &oracle,
            &references,
            &candidates,
            options(1, SelectionPolicy::TopN(100)),
        );
        let parallel = rank_with(
            &oracle,
            &references,
            &candidates,
            options(4, SelectionPolicy::TopN(100)),
        );
        let again = rank_with(
            &oracle,
            &references,
            &candidates,
            options(4, SelectionPolicy::TopN(100)),
        );
        assert_eq!(sequential.ranked, parallel.ranked);
        assert_eq!(parallel.ranked, again.ranked);
    }

    #[test]
    fn single_pair_failure_only_touches_that_candidate() {
        let healthy = ScriptedOracle::new()
            .with("r1", "a", Some(0.25))
            .with("r1", "b", Some(0.5))
            .with("r2", "a", Some(0.75))
            .with("r2", "b", Some(0.125));
        let faulty = healthy.clone().with("r2", "a", None);
        let policy = options(2, SelectionPolicy::TopN(10));

        let before = rank_with(&healthy, &["r1", "r2"], &["a", "b"], policy);
        let after = rank_with(&faulty, &["r1", "r2"], &["a", "b"], policy);

        let find = |summary: &RunSummary, name: &str| {
            summary
                .ranked
                .iter()
                .find(|candidate| candidate.path == PathBuf::from(name))
                .cloned()
                .unwrap()
        };
        assert_eq!(find(&before, "b"), find(&after, "b"));
        assert_eq!(find(&before, "a").contributions, 2);
        assert_eq!(find(&after, "a").contributions, 1);
        assert_eq!(find(&after, "a").average, 0.125);
        assert_eq!(after.failed_pairs, 1);
    }

    #[test]
    fn failing_reference_contributes_nothing() {
        let oracle = example_oracle().with_broken("ref2");
        let summary = rank_with(
            &oracle,
            &["ref1", "ref2"],
            &["A", "B", "C"],
            options(2, SelectionPolicy::TopN(10)),
        );
        assert_eq!(summary.failed_tasks, 1);
        assert_eq!(summary.completed_tasks, 1);
        let a = &summary.ranked[0];
        assert_eq!(a.path, PathBuf::from("A"));
        assert!((a.average - 0.1).abs() < 1e-12);
        assert_eq!(summary.aggregated, 2);
    }

    #[test]
    fn cap_limits_each_reference() {
        let mut oracle = ScriptedOracle::new();
        let candidates: Vec<String> = (0..8).map(|index| format!("c{}", index)).collect();
        for reference in ["r1", "r2"] {
            for candidate in &candidates {
                oracle = oracle.with(reference, candidate, Some(0.5));
            }
        }
        let candidates: Vec<&str> = candidates.iter().map(String::as_str).collect();
        let summary = rank_with(
            &oracle,
            &["r1", "r2"],
            &candidates,
            RankOptions {
                cap: 3,
                ..options(2, SelectionPolicy::TopN(100))
            },
        );
        assert_eq!(summary.truncated_references, 2);
        assert_eq!(summary.aggregated, 3);
        assert!(summary
            .ranked
            .iter()
            .all(|candidate| candidate.contributions == 2));
    }

    #[test]
    fn threshold_zero_selects_nothing() {
        let summary = rank_with(
            &example_oracle(),
            &["ref1", "ref2"],
            &["A", "B", "C"],
            options(2, SelectionPolicy::Threshold(0.0)),
        );
        assert!(summary.ranked.is_empty());
        assert_eq!(summary.aggregated, 3);
    }

    #[test]
    fn no_candidates_is_not_an_error() {
        let summary = rank_with(
            &example_oracle(),
            &["ref1", "ref2"],
            &[],
            options(2, SelectionPolicy::TopN(5)),
        );
        assert!(summary.ranked.is_empty());
        assert_eq!(summary.reference_count, 2);
    }

    #[test]
    fn cancelled_run_yields_no_ranking() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = rank(
            &corpus(&["ref1", "ref2"]),
            &corpus(&["A", "B", "C"]),
            &example_oracle(),
            options(2, SelectionPolicy::TopN(5)),
            &ProgressBar::hidden(),
            &cancel,
        );
        assert!(matches!(result, Err(RunError::Cancelled)));
    }

    #[test]
    fn missing_reference_root_is_fatal() {
        let dir = tempdir().unwrap();
        let config = RunConfig {
            reference_root: dir.path().join("absent"),
            candidate_root: Some(dir.path().to_path_buf()),
            ..RunConfig::default()
        };
        let result = enumerate_sets(&config);
        assert!(matches!(
            result,
            Err(RunError::Enumeration {
                role: SetRole::Reference,
                ..
            })
        ));
    }

    #[test]
    fn ranks_real_images_with_built_in_oracle() {
        let dir = tempdir().unwrap();
        let reals = dir.path().join("reals");
        let fakes = dir.path().join("fakes");
        std::fs::create_dir_all(&reals).unwrap();
        std::fs::create_dir_all(&fakes).unwrap();
        RgbImage::from_pixel(16, 16, Rgb([200, 40, 40]))
            .save(reals.join("real.png"))
            .unwrap();
        RgbImage::from_pixel(16, 16, Rgb([190, 50, 40]))
            .save(fakes.join("close.png"))
            .unwrap();
        RgbImage::from_pixel(16, 16, Rgb([10, 10, 240]))
            .save(fakes.join("far.png"))
            .unwrap();
        RgbImage::from_pixel(16, 16, Rgb([200, 40, 40]))
            .save(fakes.join("same.png"))
            .unwrap();

        let config = RunConfig {
            reference_root: reals,
            candidate_root: Some(fakes.clone()),
            concurrency: 2,
            models: vec![String::from("color")],
            selection: SelectionPolicy::TopN(5),
            ..RunConfig::default()
        };
        let sets = enumerate_sets(&config).unwrap();
        let summary = run_tags(
            &config,
            &sets,
            "image",
            "color",
            &ProgressBar::hidden(),
            &CancelToken::new(),
        )
        .unwrap();

        let paths: Vec<_> = summary
            .ranked
            .iter()
            .map(|candidate| candidate.path.clone())
            .collect();
        assert_eq!(paths, vec![fakes.join("close.png"), fakes.join("far.png")]);
        assert_eq!(summary.degenerate_pairs, 1);
    }

    #[test]
    fn unknown_model_tag_is_fatal() {
        let config = RunConfig {
            candidate_root: Some(PathBuf::from("fakes")),
            ..RunConfig::default()
        };
        let sets = ImageSets {
            references: Vec::new(),
            candidates: Vec::new(),
        };
        let result = run_tags(
            &config,
            &sets,
            "image",
            "Facenet512",
            &ProgressBar::hidden(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(RunError::Oracle(_))));
    }
}
