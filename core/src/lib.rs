//! Reference-set image ranking engine for nearmatch.
//!
//! Every reference image is compared against every candidate image through a
//! pluggable [`DistanceOracle`]. Per-candidate distances are summed and
//! averaged, candidates are ordered by that average, and the winners are
//! copied into an output directory under names that encode their rank.
//!
//! The pieces compose in one direction: [`enumerate_images`] feeds
//! [`PairScorer`] tasks running on a [`WorkerPool`]; their observations are
//! folded by [`merge`] and filtered by [`select`]; [`materialize`] delivers
//! the result.

pub mod accumulator;
pub mod config;
pub mod enumerator;
pub mod materialize;
pub mod oracle;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod reporting;
pub mod scorer;
pub mod selection;

#[cfg(test)]
mod testing;

pub use accumulator::{merge, AggregateEntry, Aggregates, AverageBase};
pub use config::{default_config_path, ConfigError, RunConfig, DEFAULT_CONFIG_FILE};
pub use enumerator::{
    default_extensions, enumerate_images, EnumerationError, ImageRef, DEFAULT_EXTENSIONS,
};
pub use materialize::{
    materialize, namespaced_output_dir, ranked_file_name, MaterializeError, MaterializeStats,
    MaterializedFile,
};
pub use oracle::{
    Backend, DistanceOracle, ImageFeatures, Metric, OracleError, PerceptualOracle, TimeoutOracle,
};
pub use pipeline::{
    enumerate_sets, rank, run_tags, ImageSets, RankOptions, RunError, RunSummary, SetRole,
};
pub use pool::{
    CancelToken, PoolError, PoolRun, TaskOutcome, TaskResult, WorkerPool, DEFAULT_CONCURRENCY,
};
pub use reporting::{
    print_ranking, read_manifest, write_manifest, ManifestEntry, ReportingError, RunLabels,
    RunManifest, MANIFEST_FILE,
};
pub use scorer::{Observation, PairScorer, ScoreError, ScoreReport, DEFAULT_COMPARISON_CAP};
pub use selection::{select, RankedCandidate, RankedResult, SelectionPolicy};
