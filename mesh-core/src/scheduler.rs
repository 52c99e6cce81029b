//! Background consolidation — periodic "sleep cycles".
//!
//! A tokio task wakes every `consolidation.interval_seconds` and runs a
//! non-forced [`MemoryMesh::consolidate_all`], which only does work once the
//! working tier has reached the consolidation threshold. Each pass runs on
//! the blocking pool because it writes to disk. The task stops when
//! [`ConsolidationHandle::shutdown`] is called or the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::mesh::MemoryMesh;

/// Owner of a running background consolidation task.
#[derive(Debug)]
pub struct ConsolidationHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsolidationHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        // Send fails only if the task already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Consolidation task ended abnormally");
        }
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the periodic consolidation loop on the current tokio runtime.
///
/// The first check happens one full `period` after spawning.
///
/// # Panics
/// Panics if called outside a tokio runtime.
#[must_use]
pub fn spawn_consolidation_task(mesh: Arc<MemoryMesh>, period: Duration) -> ConsolidationHandle {
    let (tx, mut rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = period.as_secs(), "Auto-consolidation task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pass = Arc::clone(&mesh);
                    match tokio::task::spawn_blocking(move || pass.consolidate_all(false)).await {
                        Ok(report) if report.ran => debug!(
                            consolidated = report.consolidated,
                            persisted = report.persisted,
                            "Periodic consolidation"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Periodic consolidation pass failed"),
                    }
                }
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Auto-consolidation task stopped");
    });

    ConsolidationHandle { shutdown: tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryHint;
    use crate::config::MeshConfig;
    use crate::types::Metadata;

    fn mesh(dir: &std::path::Path) -> Arc<MemoryMesh> {
        Arc::new(MemoryMesh::open(MeshConfig::with_memory_dir(dir)).expect("open mesh"))
    }

    fn fill(mesh: &MemoryMesh, n: usize) {
        for i in 0..n {
            mesh.store(&format!("note number {i}"), CategoryHint::Auto, 0.5, Metadata::new())
                .expect("store");
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    /// Yield until `done` holds; passes run on the blocking pool, so give
    /// them real time as well.
    async fn wait_until(done: impl Fn() -> bool) -> bool {
        for _ in 0..500 {
            if done() {
                return true;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[tokio::test(start_paused = true)]
    async fn consolidates_after_one_interval() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = mesh(dir.path());
        fill(&mesh, 5);

        let handle = spawn_consolidation_task(Arc::clone(&mesh), Duration::from_secs(300));
        settle().await;
        tokio::time::advance(Duration::from_secs(299)).await;
        settle().await;
        assert_eq!(mesh.stats().working_memory_count, 5, "no tick before the period");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(wait_until(|| mesh.stats().working_memory_count == 0).await);
        assert_eq!(mesh.stats().episodic_memory_count, 5);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = mesh(dir.path());
        fill(&mesh, 4);

        let handle = spawn_consolidation_task(Arc::clone(&mesh), Duration::from_secs(300));
        settle().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;
        assert_eq!(mesh.stats().working_memory_count, 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_loop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mesh = mesh(dir.path());

        let handle = spawn_consolidation_task(Arc::clone(&mesh), Duration::from_secs(60));
        settle().await;
        assert!(!handle.is_finished());
        handle.shutdown().await;

        fill(&mesh, 6);
        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(mesh.stats().working_memory_count, 6);
    }
}
