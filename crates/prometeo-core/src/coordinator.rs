//! Download Coordinator (§4.3): owns one Plan, spawns one Worker per Range,
//! samples aggregate progress every 500ms, and composes finished parts into
//! the destination file.
//!
//! The state machine and the 500ms progress sampler are original, grounded
//! directly on §4.3's description. Cancellation reuses the shared
//! `Arc<AtomicBool>` token from `control.rs`'s `JobControl`; the completion
//! wait is a single-shot `tokio::sync::Notify` rather than a poll loop, per
//! the resolved Open Question in DESIGN.md.

use crate::error::PrometeoError;
use crate::events::CoordinatorEvent;
use crate::manifest::{write_manifest, DownloadLog};
use crate::plan::Plan;
use crate::prober;
use crate::storage::compose_file;
use crate::throttle::Throttle;
use crate::worker::{Worker, WorkerStats};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Mutex, Notify};

/// §4.3's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Planned,
    Running,
    Stopping,
    Stopped,
    Composing,
    Cleaned,
    Finished,
}

/// Last progress sample: human-readable speed, percent complete (0-100), and
/// ETA in milliseconds (`u64::MAX` stands in for "+infinity", i.e. the
/// aggregate speed is currently zero and the download isn't finished).
#[derive(Debug, Clone)]
struct LastProgress {
    speed: String,
    percent: u32,
    eta_ms: u64,
}

impl Default for LastProgress {
    fn default() -> Self {
        LastProgress {
            speed: "0 B/s".to_string(),
            percent: 0,
            eta_ms: u64::MAX,
        }
    }
}

pub struct Coordinator {
    plan: Mutex<Plan>,
    state: Mutex<CoordinatorState>,
    user_agent: String,
    cancel: Arc<AtomicBool>,
    throttle: Arc<Throttle>,
    notify: Arc<Notify>,
    last_progress: Arc<Mutex<LastProgress>>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
}

impl Coordinator {
    /// Builds a Coordinator for `plan`. `plan.speed_bps` must already be
    /// positive (§4.1: a rate of zero is never valid); the Manager is
    /// responsible for filling it in from its configured speed ceiling
    /// before constructing a Coordinator.
    pub fn new(plan: Plan, user_agent: String) -> Result<Self, PrometeoError> {
        if plan.speed_bps == 0 {
            return Err(PrometeoError::InvalidArgumentError(
                "speed_bps must be > 0".to_string(),
            ));
        }
        let (event_tx, _) = broadcast::channel(64);
        Ok(Coordinator {
            throttle: Arc::new(Throttle::new(plan.speed_bps)),
            plan: Mutex::new(plan),
            state: Mutex::new(CoordinatorState::Planned),
            user_agent,
            cancel: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            last_progress: Arc::new(Mutex::new(LastProgress::default())),
            event_tx,
        })
    }

    pub async fn name(&self) -> String {
        self.plan.lock().await.name.clone()
    }

    pub async fn url(&self) -> String {
        self.plan.lock().await.url.clone()
    }

    pub async fn size(&self) -> u64 {
        self.plan.lock().await.size
    }

    pub async fn speed_bps(&self) -> u64 {
        self.plan.lock().await.speed_bps
    }

    pub async fn state(&self) -> CoordinatorState {
        *self.state.lock().await
    }

    /// The most recent progress sample: `(human speed, percent, eta_ms)`.
    /// `eta_ms == u64::MAX` means "unknown" (aggregate speed is zero).
    pub async fn progress(&self) -> (String, u32, u64) {
        let p = self.last_progress.lock().await;
        (p.speed.clone(), p.percent, p.eta_ms)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    /// Runs the download to completion: spawns one Worker per Range, samples
    /// progress every 500ms, and composes the finished parts once every
    /// Worker reports terminal. Resolves with the destination path.
    pub async fn start(&self) -> Result<PathBuf, PrometeoError> {
        {
            let mut state = self.state.lock().await;
            if *state != CoordinatorState::Planned {
                return Err(PrometeoError::InvalidArgumentError(
                    "download already started".to_string(),
                ));
            }
            *state = CoordinatorState::Running;
        }
        let _ = self.event_tx.send(CoordinatorEvent::Start);

        let (url, work_dir, ranges, size) = {
            let plan = self.plan.lock().await;
            (plan.url.clone(), plan.work_dir.clone(), plan.parts.clone(), plan.size)
        };

        let log = DownloadLog::new(&work_dir);

        // Re-probe the URL; a failed revalidation is logged, never fatal
        // (§7: the core does not abort a resume over a prober hiccup).
        let probe_url = url.clone();
        let probe_ua = self.user_agent.clone();
        match tokio::task::spawn_blocking(move || prober::get_data_blocking(&probe_url, &probe_ua)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "revalidation probe failed, continuing with existing plan");
                let _ = log.append(&format!("revalidation probe failed: {e}"));
            }
            Err(join_err) => {
                tracing::warn!(url = %url, error = %join_err, "revalidation probe task panicked");
            }
        }

        if let Err(e) = std::fs::create_dir_all(&work_dir) {
            let mut state = self.state.lock().await;
            *state = CoordinatorState::Stopped;
            return Err(PrometeoError::InternalError(format!(
                "create work dir {}: {e}",
                work_dir.display()
            )));
        }

        let worker_stats: Vec<Arc<WorkerStats>> =
            ranges.iter().map(|_| Arc::new(WorkerStats::new())).collect();
        let range_lens: Vec<u64> = ranges.iter().map(|r| r.len()).collect();

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let log_for_events = DownloadLog::new(&work_dir);
        let log_task = tokio::spawn(async move {
            while let Some(event) = report_rx.recv().await {
                if let crate::events::WorkerEvent::Log(message) = event {
                    tracing::debug!(%message, "worker log");
                    let _ = log_for_events.append(&message);
                }
            }
        });

        let remaining = Arc::new(AtomicUsize::new(ranges.len()));
        let mut handles = Vec::with_capacity(ranges.len());
        for (range, stats) in ranges.iter().cloned().zip(worker_stats.iter().cloned()) {
            let worker = Worker::new(
                range,
                url.clone(),
                self.user_agent.clone(),
                Arc::clone(&self.throttle),
                Arc::clone(&self.cancel),
                stats,
                report_tx.clone(),
            );
            let remaining = Arc::clone(&remaining);
            let notify = Arc::clone(&self.notify);
            handles.push(tokio::spawn(async move {
                let outcome = worker.start().await;
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    // `notify_one` stores a permit if nobody is waiting yet,
                    // so `start()`'s completion wait below can never miss
                    // this even if every Worker finishes before `start()`
                    // reaches its own `.notified().await`.
                    notify.notify_one();
                }
                outcome
            }));
        }
        drop(report_tx);

        let sampler = spawn_progress_sampler(
            size,
            range_lens,
            worker_stats.clone(),
            Arc::clone(&self.last_progress),
            self.event_tx.clone(),
        );

        self.notify.notified().await;
        sampler.abort();
        drop(log_task);

        for handle in handles {
            let _ = handle.await;
        }

        let cancelled = self.cancel.load(Ordering::SeqCst);
        if cancelled {
            let mut state = self.state.lock().await;
            *state = CoordinatorState::Stopped;
            let _ = self.event_tx.send(CoordinatorEvent::Stop);
            return Err(PrometeoError::InternalError("download stopped".to_string()));
        }

        {
            let mut state = self.state.lock().await;
            *state = CoordinatorState::Composing;
        }
        let _ = self.event_tx.send(CoordinatorEvent::Finish);

        let destination = {
            let plan = self.plan.lock().await;
            plan.destination.clone()
        };
        if let Err(e) = compose_file(&ranges, &destination) {
            return Err(PrometeoError::InternalError(format!("compose failed: {e}")));
        }

        self.cleanup(&work_dir).await;

        {
            let mut state = self.state.lock().await;
            *state = CoordinatorState::Finished;
        }
        Ok(destination)
    }

    /// Requests a stop: flips the shared cancel flag so every Worker aborts
    /// its in-flight request, then waits (bounded by 1000ms) for the
    /// log-write queue to drain before declaring the Coordinator Stopped.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().await;
            if matches!(
                *state,
                CoordinatorState::Stopping
                    | CoordinatorState::Stopped
                    | CoordinatorState::Finished
                    | CoordinatorState::Composing
                    | CoordinatorState::Cleaned
            ) {
                return;
            }
            // Nothing has been spawned yet, so there are no Workers to wait
            // on draining.
            if *state == CoordinatorState::Planned {
                *state = CoordinatorState::Stopped;
                self.cancel.store(true, Ordering::SeqCst);
                return;
            }
            *state = CoordinatorState::Stopping;
        }
        self.cancel.store(true, Ordering::SeqCst);

        // Bounded wait for `start()`'s own completion wait to drain the
        // Workers and flip the state out of `Stopping`. This polls rather
        // than sharing `self.notify` with `start()`'s single-permit wait,
        // since two concurrent `.notified()` callers could race for that
        // one stored permit and leave one of them hanging.
        let deadline = Instant::now() + Duration::from_millis(1000);
        while Instant::now() < deadline {
            if *self.state.lock().await != CoordinatorState::Stopping {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Updates the shared rate ceiling; every Worker draws from the same
    /// `Throttle`, so changing its rate redistributes bandwidth across
    /// however many Workers are still active without needing to recompute
    /// a per-Worker share.
    pub async fn set_speed(&self, total_bps: u64) -> Result<(), PrometeoError> {
        self.throttle
            .set_rate(total_bps)
            .map_err(|e| PrometeoError::InvalidArgumentError(e.to_string()))?;
        self.plan.lock().await.speed_bps = total_bps;
        Ok(())
    }

    /// Closes the log sink and removes the work directory. On removal
    /// failure, the Plan is marked `finished` and its manifest rewritten so
    /// a later Manager scan garbage-collects the directory instead of
    /// resuming it.
    async fn cleanup(&self, work_dir: &std::path::Path) {
        if let Err(e) = std::fs::remove_dir_all(work_dir) {
            tracing::warn!(dir = %work_dir.display(), error = %e, "failed to remove work directory");
            let mut plan = self.plan.lock().await;
            plan.finished = true;
            if let Err(e) = write_manifest(work_dir, &plan) {
                tracing::warn!(error = %e, "failed to rewrite manifest after cleanup failure");
            }
        }
    }
}

fn spawn_progress_sampler(
    size: u64,
    range_lens: Vec<u64>,
    worker_stats: Vec<Arc<WorkerStats>>,
    last_progress: Arc<Mutex<LastProgress>>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        let mut previous: Vec<u64> = worker_stats.iter().map(|s| s.downloaded()).collect();
        let mut previous_tick = Instant::now();

        loop {
            interval.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(previous_tick).as_secs_f64().max(0.001);
            previous_tick = now;

            let mut aggregate_speed = 0.0f64;
            let mut percent_sum = 0.0f64;
            let mut not_done_count = 0u32;
            let mut total_downloaded = 0u64;

            for (i, stats) in worker_stats.iter().enumerate() {
                let downloaded = stats.downloaded();
                total_downloaded += downloaded;

                if !stats.is_done() {
                    let delta = downloaded.saturating_sub(previous[i]);
                    aggregate_speed += delta as f64 / elapsed;

                    let len = range_lens[i];
                    let percent = if len == 0 {
                        100.0
                    } else {
                        (downloaded as f64 / len as f64 * 100.0).min(100.0)
                    };
                    percent_sum += percent;
                    not_done_count += 1;
                }
                previous[i] = downloaded;
            }

            let aggregate_progress = if not_done_count == 0 {
                100
            } else {
                (percent_sum / not_done_count as f64).round().clamp(0.0, 100.0) as u32
            };

            let eta_ms = if total_downloaded >= size {
                0
            } else if aggregate_speed <= 0.0 {
                u64::MAX
            } else {
                let remaining = (size - total_downloaded) as f64;
                ((remaining / aggregate_speed) * 1000.0).round() as u64
            };

            {
                let mut p = last_progress.lock().await;
                p.speed = format_human_speed(aggregate_speed);
                p.percent = aggregate_progress;
                p.eta_ms = eta_ms;
            }

            let _ = event_tx.send(CoordinatorEvent::Progress(
                format_human_speed(aggregate_speed),
                aggregate_progress,
                eta_ms,
            ));

            if worker_stats.iter().all(|s| s.is_done()) {
                break;
            }
        }
    })
}

/// Formats a byte rate to three significant figures with a per-second unit,
/// e.g. `"1.23 MB/s"`.
fn format_human_speed(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 5] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    if bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    let formatted = if value >= 100.0 {
        format!("{:.0}", value)
    } else if value >= 10.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    };
    format!("{} {}", formatted, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan_ranges, Plan};

    fn sample_plan(dir: &std::path::Path, size: u64, connections: usize) -> Plan {
        let parts = plan_ranges(size, connections, dir, "f");
        Plan {
            url: "https://example.com/f".to_string(),
            name: "f".to_string(),
            size,
            destination: dir.join("f"),
            work_dir: dir.to_path_buf(),
            content_type: "application/octet-stream".to_string(),
            parts,
            speed_bps: 1_000_000,
            finished: false,
            resumed: false,
        }
    }

    #[test]
    fn new_rejects_zero_speed() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = sample_plan(dir.path(), 1000, 1);
        plan.speed_bps = 0;
        assert!(Coordinator::new(plan, "test-agent".to_string()).is_err());
    }

    #[tokio::test]
    async fn accessors_reflect_plan_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan(dir.path(), 1000, 1);
        let coordinator = Coordinator::new(plan, "test-agent".to_string()).unwrap();
        assert_eq!(coordinator.name().await, "f");
        assert_eq!(coordinator.size().await, 1000);
        assert_eq!(coordinator.state().await, CoordinatorState::Planned);
    }

    #[tokio::test]
    async fn set_speed_rejects_zero() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan(dir.path(), 1000, 1);
        let coordinator = Coordinator::new(plan, "test-agent".to_string()).unwrap();
        assert!(coordinator.set_speed(0).await.is_err());
    }

    #[tokio::test]
    async fn set_speed_updates_plan_and_throttle() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan(dir.path(), 1000, 1);
        let coordinator = Coordinator::new(plan, "test-agent".to_string()).unwrap();
        coordinator.set_speed(500_000).await.unwrap();
        assert_eq!(coordinator.plan.lock().await.speed_bps, 500_000);
    }

    #[tokio::test]
    async fn stop_before_start_transitions_to_stopped_quickly() {
        let dir = tempfile::tempdir().unwrap();
        let plan = sample_plan(dir.path(), 1000, 1);
        let coordinator = Coordinator::new(plan, "test-agent".to_string()).unwrap();
        let start = Instant::now();
        coordinator.stop().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(coordinator.state().await, CoordinatorState::Stopped);
    }

    #[test]
    fn human_speed_formatting_picks_the_right_unit() {
        assert_eq!(format_human_speed(0.0), "0 B/s");
        assert_eq!(format_human_speed(512.0), "512 B/s");
        assert_eq!(format_human_speed(1_234_000.0), "1.23 MB/s");
        assert_eq!(format_human_speed(15_000.0), "15.0 KB/s");
    }
}
