use super::{DistanceOracle, OracleError};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Bounds every call of the wrapped oracle by a wall-clock limit.
///
/// Each call runs on its own thread, so a scored pair costs two thread spawns
/// (candidate load and distance). A call that overruns is abandoned and
/// reported as [`OracleError::Timeout`]. The abandoned thread keeps running
/// until the inner oracle returns, so after timeouts more oracle calls can be
/// in flight than the pool's `concurrency`.
pub struct TimeoutOracle<O> {
    inner: Arc<O>,
    limit: Duration,
}

impl<O> TimeoutOracle<O> {
    pub fn new(inner: O, limit: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            limit,
        }
    }
}

impl<O> DistanceOracle for TimeoutOracle<O>
where
    O: DistanceOracle + 'static,
    O::Image: 'static,
{
    type Image = Arc<O::Image>;

    fn load(&self, path: &Path) -> Result<Self::Image, OracleError> {
        let inner = Arc::clone(&self.inner);
        let path = path.to_path_buf();
        run_with_limit(self.limit, move || inner.load(&path).map(Arc::new))
    }

    fn distance(
        &self,
        reference: &Self::Image,
        candidate: &Self::Image,
    ) -> Result<f64, OracleError> {
        let inner = Arc::clone(&self.inner);
        let reference = Arc::clone(reference);
        let candidate = Arc::clone(candidate);
        run_with_limit(self.limit, move || inner.distance(&reference, &candidate))
    }
}

fn run_with_limit<T, F>(limit: Duration, job: F) -> Result<T, OracleError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, OracleError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(String::from("oracle-call"))
        .spawn(move || {
            let _ = sender.send(job());
        })
        .map_err(|error| {
            OracleError::Internal(format!("failed to spawn oracle call: {}", error))
        })?;

    match receiver.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(OracleError::Timeout(limit)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(OracleError::Internal(String::from("oracle call panicked")))
        }
    }
}
