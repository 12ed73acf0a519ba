//! Range Worker (§4.2): downloads one `[start,end]` byte range to one part
//! file, resuming from the part file's current length.
//!
//! The GET itself is grounded on `downloader/segment.rs`'s curl `Easy` +
//! `write_function` shape, adapted from a shared preallocated file with
//! offset writes to one append-only `PartFileWriter` per Range, and from a
//! permissive 2xx status check to a strict 206/416 rule (§9).

use crate::error::{classify_curl_error, classify_http_status, ErrorKind};
use crate::events::WorkerEvent;
use crate::plan::Range;
use crate::storage::PartFileWriter;
use crate::throttle::Throttle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Stream errors matching one of these messages are expected artifacts of a
/// cooperative cancellation, not real failures (§4.2 step 10).
const SUPPRESSED_ERROR_MESSAGES: [&str; 3] = ["closed", "Premature close", "canceled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    Done,
    Cancelled,
    Errored,
}

/// Shared, lock-free progress counters for one Worker, read by the
/// Coordinator's 500ms progress sampler without synchronizing with the
/// Worker's own blocking GET thread.
#[derive(Debug, Default)]
pub struct WorkerStats {
    downloaded: AtomicU64,
    done: AtomicBool,
}

impl WorkerStats {
    pub fn new() -> Self {
        WorkerStats::default()
    }

    /// Bytes of this Range written to disk so far (existing + received).
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Whether this Worker has reached a terminal state (done, cancelled, or
    /// errored) and will report no further progress.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

pub struct Worker {
    index: usize,
    range: Range,
    url: String,
    user_agent: String,
    throttle: Arc<Throttle>,
    cancel: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    report_tx: UnboundedSender<WorkerEvent>,
}

impl Worker {
    pub fn new(
        range: Range,
        url: String,
        user_agent: String,
        throttle: Arc<Throttle>,
        cancel: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
        report_tx: UnboundedSender<WorkerEvent>,
    ) -> Self {
        Worker {
            index: range.index,
            range,
            url,
            user_agent,
            throttle,
            cancel,
            stats,
            report_tx,
        }
    }

    /// Runs this Worker to completion. Step numbers in comments match §4.2.
    pub async fn start(self) -> WorkerOutcome {
        let index = self.index;
        let (writer, existing) = match PartFileWriter::open_for_append(&self.range.part_path) {
            Ok(v) => v,
            Err(e) => {
                let _ = self.report_tx.send(WorkerEvent::Log(format!(
                    "worker {index}: failed to open part file: {e}"
                )));
                let _ = self.report_tx.send(WorkerEvent::Destroy { index });
                self.stats.done.store(true, Ordering::Relaxed);
                return WorkerOutcome::Errored;
            }
        };

        self.stats.downloaded.store(existing, Ordering::Relaxed);

        // Step 1: already satisfied (degenerate range or prior full resume).
        if self.range.start + existing as i64 > self.range.end {
            let _ = self.report_tx.send(WorkerEvent::Finish {
                index,
                already_complete: true,
            });
            self.stats.done.store(true, Ordering::Relaxed);
            return WorkerOutcome::Done;
        }

        let range = self.range.clone();
        let url = self.url.clone();
        let user_agent = self.user_agent.clone();
        let throttle = Arc::clone(&self.throttle);
        let cancel = Arc::clone(&self.cancel);
        let stats = Arc::clone(&self.stats);

        let result = tokio::task::spawn_blocking(move || {
            run_get_blocking(&url, &user_agent, &range, existing, &writer, &throttle, &cancel, &stats)
        })
        .await;

        self.stats.done.store(true, Ordering::Relaxed);

        match result {
            Ok(Ok(GetOutcome::Completed)) => {
                let _ = self.report_tx.send(WorkerEvent::Finish {
                    index,
                    already_complete: false,
                });
                WorkerOutcome::Done
            }
            Ok(Ok(GetOutcome::AlreadySatisfied)) => {
                let _ = self.report_tx.send(WorkerEvent::Finish {
                    index,
                    already_complete: true,
                });
                WorkerOutcome::Done
            }
            Ok(Ok(GetOutcome::Cancelled)) => {
                let _ = self.report_tx.send(WorkerEvent::Destroy { index });
                WorkerOutcome::Cancelled
            }
            Ok(Err(e)) => {
                if !is_suppressed(&e) {
                    let _ = self.report_tx.send(WorkerEvent::Log(format!(
                        "worker {index}: {e} ({:?})",
                        e.kind()
                    )));
                }
                let _ = self.report_tx.send(WorkerEvent::Destroy { index });
                WorkerOutcome::Errored
            }
            Err(join_err) => {
                let _ = self.report_tx.send(WorkerEvent::Log(format!(
                    "worker {index}: task panicked: {join_err}"
                )));
                let _ = self.report_tx.send(WorkerEvent::Destroy { index });
                WorkerOutcome::Errored
            }
        }
    }
}

enum GetOutcome {
    Completed,
    AlreadySatisfied,
    Cancelled,
}

#[derive(Debug)]
enum GetError {
    Curl(curl::Error),
    BadStatus(u32),
    Storage(std::io::Error),
}

impl std::fmt::Display for GetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GetError::Curl(e) => write!(f, "{e}"),
            GetError::BadStatus(code) => write!(f, "unexpected status {code} (want 206 or 416)"),
            GetError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

impl GetError {
    fn kind(&self) -> ErrorKind {
        match self {
            GetError::Curl(e) => classify_curl_error(e),
            GetError::BadStatus(code) => classify_http_status(*code),
            GetError::Storage(_) => ErrorKind::Other,
        }
    }
}

fn is_suppressed(e: &GetError) -> bool {
    is_suppressed_message(&e.to_string())
}

fn is_suppressed_message(message: &str) -> bool {
    SUPPRESSED_ERROR_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// Runs one Range's GET on the current (blocking) thread. Never calls
/// `.await`; §5 requires that blocking I/O (curl, the throttle sleep, the
/// file write) stay off the async executor entirely.
fn run_get_blocking(
    url: &str,
    user_agent: &str,
    range: &Range,
    existing: u64,
    writer: &PartFileWriter,
    throttle: &Throttle,
    cancel: &AtomicBool,
    stats: &WorkerStats,
) -> Result<GetOutcome, GetError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(GetError::Curl)?;
    easy.useragent(user_agent).map_err(GetError::Curl)?;
    easy.follow_location(true).map_err(GetError::Curl)?;
    easy.connect_timeout(Duration::from_secs(30)).map_err(GetError::Curl)?;
    easy.low_speed_limit(1024).map_err(GetError::Curl)?;
    easy.low_speed_time(Duration::from_secs(60)).map_err(GetError::Curl)?;
    easy.timeout(Duration::from_secs(3600)).map_err(GetError::Curl)?;

    let start = range.start + existing as i64;
    easy.range(&format!("{}-{}", start, range.end)).map_err(GetError::Curl)?;

    let storage_error: std::sync::Mutex<Option<std::io::Error>> = std::sync::Mutex::new(None);

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                if cancel.load(Ordering::Relaxed) {
                    return Ok(0);
                }
                throttle.acquire_blocking(data.len() as u64);
                match writer.append(data) {
                    Ok(()) => {
                        stats.downloaded.fetch_add(data.len() as u64, Ordering::Relaxed);
                        Ok(data.len())
                    }
                    Err(e) => {
                        let io_err = std::io::Error::new(std::io::ErrorKind::Other, e.to_string());
                        *storage_error.lock().unwrap() = Some(io_err);
                        Ok(0)
                    }
                }
            })
            .map_err(GetError::Curl)?;

        if let Err(e) = transfer.perform() {
            if cancel.load(Ordering::Relaxed) {
                return Ok(GetOutcome::Cancelled);
            }
            if let Some(io_err) = storage_error.lock().unwrap().take() {
                return Err(GetError::Storage(io_err));
            }
            return Err(GetError::Curl(e));
        }
    }

    if cancel.load(Ordering::Relaxed) {
        return Ok(GetOutcome::Cancelled);
    }

    let code = easy.response_code().map_err(GetError::Curl)? as u32;
    match code {
        416 => Ok(GetOutcome::AlreadySatisfied),
        206 => {
            writer.sync().map_err(|e| GetError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )))?;
            Ok(GetOutcome::Completed)
        }
        other => Err(GetError::BadStatus(other)),
    }
}
