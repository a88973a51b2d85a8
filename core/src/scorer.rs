use crate::enumerator::ImageRef;
use crate::oracle::{DistanceOracle, OracleError};
use crate::pool::CancelToken;
use indicatif::ProgressBar;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Default number of accepted observations per reference image.
pub const DEFAULT_COMPARISON_CAP: usize = 50_000;

/// One accepted comparison between a reference image and a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub candidate: ImageRef,
    pub distance: f64,
}

/// Everything a single reference task produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreReport {
    pub observations: Vec<Observation>,
    /// Pairs handed to the oracle, whatever their outcome.
    pub compared: usize,
    pub failed_pairs: usize,
    /// Pairs whose distance was exactly zero and were discarded as self-matches.
    pub degenerate_pairs: usize,
    /// Set when the comparison cap stopped the walk before the corpus ended.
    pub truncated: bool,
}

/// Scores one reference image against a pre-enumerated candidate corpus.
///
/// Failed or zero-distance pairs are skipped. Scoring stops once `cap`
/// observations were accepted, so on corpora larger than the cap only the
/// first candidates in traversal order are ever compared for a reference.
pub struct PairScorer<'a, O> {
    oracle: &'a O,
    corpus: &'a [ImageRef],
    cap: usize,
    reference_total: usize,
    cancel: CancelToken,
    progress: ProgressBar,
}

impl<'a, O: DistanceOracle> PairScorer<'a, O> {
    pub fn new(oracle: &'a O, corpus: &'a [ImageRef], cap: usize) -> Self {
        Self {
            oracle,
            corpus,
            cap,
            reference_total: 0,
            cancel: CancelToken::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar, reference_total: usize) -> Self {
        self.progress = progress;
        self.reference_total = reference_total;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn score(&self, reference: &ImageRef) -> Result<ScoreReport, ScoreError> {
        let reference_image =
            self.oracle
                .load(&reference.path)
                .map_err(|source| ScoreError::Reference {
                    source,
                    path: reference.path.clone(),
                })?;

        let mut report = ScoreReport::default();
        for (index, candidate) in self.corpus.iter().enumerate() {
            if report.observations.len() >= self.cap {
                report.truncated = true;
                tracing::info!(
                    reference = %reference.path.display(),
                    cap = self.cap,
                    skipped = self.corpus.len() - index,
                    "comparison cap reached"
                );
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(ScoreError::Cancelled);
            }

            let outcome = self
                .oracle
                .load(&candidate.path)
                .and_then(|image| self.oracle.distance(&reference_image, &image));
            report.compared += 1;

            match outcome {
                Ok(distance) if distance == 0.0 => {
                    report.degenerate_pairs += 1;
                    tracing::debug!(
                        reference = %reference.path.display(),
                        candidate = %candidate.path.display(),
                        "discarding zero distance"
                    );
                }
                Ok(distance) if distance.is_finite() && distance > 0.0 => {
                    self.progress.set_message(format!(
                        "reference {}/{} candidate {}/{} distance={:.4}",
                        reference.ordinal,
                        self.reference_total,
                        index + 1,
                        self.corpus.len(),
                        distance
                    ));
                    report.observations.push(Observation {
                        candidate: candidate.clone(),
                        distance,
                    });
                }
                Ok(distance) => {
                    report.failed_pairs += 1;
                    log_pair_failure(reference, candidate, &OracleError::InvalidDistance(distance));
                }
                Err(error) => {
                    report.failed_pairs += 1;
                    log_pair_failure(reference, candidate, &error);
                }
            }
        }

        Ok(report)
    }
}

fn log_pair_failure(reference: &ImageRef, candidate: &ImageRef, error: &OracleError) {
    tracing::warn!(
        reference = %reference.path.display(),
        candidate = %candidate.path.display(),
        %error,
        "skipping pair"
    );
}

/// Failure of a whole reference task.
#[derive(Debug)]
pub enum ScoreError {
    Reference {
        source: OracleError,
        path: PathBuf,
    },
    Cancelled,
}

impl Display for ScoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference { source, path } => {
                write!(f, "cannot load reference {}: {}", path.display(), source)
            }
            Self::Cancelled => write!(f, "scoring cancelled"),
        }
    }
}

impl Error for ScoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reference { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}
