//! Deterministic oracle and fixtures shared by unit tests.

use crate::enumerator::ImageRef;
use crate::oracle::{DistanceOracle, OracleError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Oracle answering from a fixed table keyed by (reference, candidate) path.
///
/// Pairs missing from the table, or scripted as `None`, fail.
#[derive(Clone, Debug, Default)]
pub(crate) struct ScriptedOracle {
    responses: HashMap<(PathBuf, PathBuf), Option<f64>>,
    broken: HashSet<PathBuf>,
}

impl ScriptedOracle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, reference: &str, candidate: &str, distance: Option<f64>) -> Self {
        self.responses
            .insert((PathBuf::from(reference), PathBuf::from(candidate)), distance);
        self
    }

    pub(crate) fn with_broken(mut self, path: &str) -> Self {
        self.broken.insert(PathBuf::from(path));
        self
    }
}

impl DistanceOracle for ScriptedOracle {
    type Image = PathBuf;

    fn load(&self, path: &Path) -> Result<PathBuf, OracleError> {
        if self.broken.contains(path) {
            return Err(OracleError::EmptyImage(path.to_path_buf()));
        }
        Ok(path.to_path_buf())
    }

    fn distance(&self, reference: &PathBuf, candidate: &PathBuf) -> Result<f64, OracleError> {
        match self.responses.get(&(reference.clone(), candidate.clone())) {
            Some(Some(distance)) => Ok(*distance),
            _ => Err(OracleError::Internal(format!(
                "no scripted distance for {} -> {}",
                reference.display(),
                candidate.display()
            ))),
        }
    }
}

pub(crate) fn corpus(names: &[&str]) -> Vec<ImageRef> {
    names
        .iter()
        .enumerate()
        .map(|(index, name)| ImageRef::new(PathBuf::from(name), index + 1))
        .collect()
}
