use crate::accumulator::AverageBase;
use crate::materialize::MaterializeStats;
use crate::pipeline::RunSummary;
use crate::selection::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Manifest written next to the copied files.
pub const MANIFEST_FILE: &str = "ranking.json";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    pub generated_at: String,
    pub reference_root: PathBuf,
    pub candidate_root: PathBuf,
    pub backend: String,
    pub model: String,
    pub policy: SelectionPolicy,
    pub average: AverageBase,
    pub reference_count: usize,
    pub candidate_count: usize,
    pub aggregated: usize,
    pub failed_tasks: usize,
    pub failed_pairs: usize,
    pub degenerate_pairs: usize,
    pub truncated_references: usize,
    pub results: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub rank: usize,
    pub path: PathBuf,
    pub average: f64,
    pub contributions: usize,
    /// Copied file, absent when the copy failed.
    pub file: Option<PathBuf>,
}

/// Roots and tags identifying one ranking run.
#[derive(Debug, Clone, Copy)]
pub struct RunLabels<'a> {
    pub reference_root: &'a Path,
    pub candidate_root: &'a Path,
    pub backend: &'a str,
    pub model: &'a str,
    pub policy: SelectionPolicy,
    pub average: AverageBase,
}

impl RunManifest {
    pub fn new(labels: RunLabels<'_>, summary: &RunSummary, stats: &MaterializeStats) -> Self {
        let results = summary
            .ranked
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let rank = index + 1;
                ManifestEntry {
                    rank,
                    path: candidate.path.clone(),
                    average: candidate.average,
                    contributions: candidate.contributions,
                    file: stats
                        .copied
                        .iter()
                        .find(|copied| copied.rank == rank)
                        .map(|copied| copied.destination.clone()),
                }
            })
            .collect();

        Self {
            version: MANIFEST_VERSION,
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| String::from("unknown")),
            reference_root: labels.reference_root.to_path_buf(),
            candidate_root: labels.candidate_root.to_path_buf(),
            backend: labels.backend.to_string(),
            model: labels.model.to_string(),
            policy: labels.policy,
            average: labels.average,
            reference_count: summary.reference_count,
            candidate_count: summary.candidate_count,
            aggregated: summary.aggregated,
            failed_tasks: summary.failed_tasks,
            failed_pairs: summary.failed_pairs,
            degenerate_pairs: summary.degenerate_pairs,
            truncated_references: summary.truncated_references,
            results,
        }
    }
}

pub fn write_manifest<P: AsRef<Path>>(
    manifest: &RunManifest,
    path: P,
) -> Result<(), ReportingError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| ReportingError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, manifest).map_err(ReportingError::Serialization)
}

pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<RunManifest, ReportingError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReportingError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(ReportingError::Serialization)
}

pub fn print_ranking(summary: &RunSummary) {
    if summary.ranked.is_empty() {
        println!("No candidates selected.");
        return;
    }
    println!("Selected candidates:");
    for (index, candidate) in summary.ranked.iter().enumerate() {
        println!(
            "  {:>5}  {:.4}  ({}/{})  {}",
            index + 1,
            candidate.average,
            candidate.contributions,
            summary.reference_count,
            candidate.path.display()
        );
    }
}

#[derive(Debug)]
pub enum ReportingError {
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    Serialization(serde_json::Error),
}

impl Display for ReportingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { source, path } => write!(f, "io error for {}: {}", path.display(), source),
            Self::Serialization(error) => write!(f, "serialization error: {}", error),
        }
    }
}

impl Error for ReportingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialization(error) => Some(error),
        }
    }
}
