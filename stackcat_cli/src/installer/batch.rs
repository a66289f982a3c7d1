/// Bounded worker-pool fan-out over a batch of install specs (spec.md
/// §4.5, §5): one `threadpool` worker owns the download -> extract -> place
/// sequence for a single `(tool, version)`, reporting back over an
/// `mpsc::channel` carrying `{index, total, result}`, mirroring the
/// teacher's own parallel-helm-upgrade concurrency shape.

use std::sync::mpsc;
use std::sync::Arc;

use stackcat_core::registry::Registry;

use super::Installer;

/// One worker's outcome, tagged with its position in the original batch so
/// results can be reassembled in submission order regardless of completion
/// order.
pub struct BatchOutcome {
    pub index: usize,
    pub total: usize,
    pub spec: String,
    pub result: super::Result<std::path::PathBuf>,
}

/// Runs `specs` through `installer.install(..)` across a bounded
/// `threadpool::ThreadPool`, sized to the number of logical CPUs (capped to
/// the batch size so a handful of specs doesn't spin up idle workers).
/// Results are collected off a completion channel and returned in the
/// original submission order.
pub struct InstallBatch;

impl InstallBatch {
    /// The single-spec path (`specs.len() == 1`) defers directly to
    /// `Installer::install`, skipping the thread pool entirely.
    pub fn run<R>(installer: Arc<Installer<R>>, specs: &[String], set_default: bool, reinstall: bool) -> Vec<BatchOutcome>
    where
        R: Registry + Send + Sync + 'static,
    {
        let total = specs.len();
        if total == 0 {
            return Vec::new();
        }
        if total == 1 {
            let spec = specs[0].clone();
            let result = installer.install(&spec, set_default, reinstall);
            return vec![BatchOutcome { index: 0, total, spec, result }];
        }

        let workers = num_cpus::get().max(1).min(total);
        let pool = threadpool::ThreadPool::new(workers);
        let (tx, rx) = mpsc::channel();

        for (index, spec) in specs.iter().cloned().enumerate() {
            let tx = tx.clone();
            let installer = Arc::clone(&installer);
            pool.execute(move || {
                let result = installer.install(&spec, set_default, reinstall);
                // the receiver always outlives every worker (pool.join()
                // below), so a send error here would only ever indicate a
                // programmer bug, not a runtime condition to recover from.
                let _ = tx.send(BatchOutcome { index, total, spec, result });
            });
        }
        drop(tx);
        pool.join();

        let mut outcomes: Vec<BatchOutcome> = rx.into_iter().collect();
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackcat_core::registry::InlineRegistry;
    use crate::fetcher::Fetcher;

    fn installer() -> Arc<Installer<InlineRegistry>> {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(dir.path().join("cache"), None).unwrap();
        Arc::new(Installer::new(dir.path().join("root"), InlineRegistry::default(), fetcher, dir.path().join(".tool-versions")))
    }

    #[test]
    fn empty_batch_returns_nothing() {
        let outcomes = InstallBatch::run(installer(), &[], false, false);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn single_spec_skips_pool_and_still_reports_outcome() {
        let outcomes = InstallBatch::run(installer(), &["nope".to_string()], false, false);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].spec, "nope");
        assert!(outcomes[0].result.is_err());
    }

    #[test]
    fn batch_preserves_submission_order_in_results() {
        let specs: Vec<String> = (0..5).map(|i| format!("unknown-tool-{}", i)).collect();
        let outcomes = InstallBatch::run(installer(), &specs, false, false);
        assert_eq!(outcomes.len(), 5);
        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.index, i);
            assert_eq!(outcome.total, 5);
            assert!(outcome.result.is_err());
        }
    }
}
