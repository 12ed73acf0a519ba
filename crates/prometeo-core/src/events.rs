//! Typed pub-sub events per component (§9 design note), replacing the
//! source's string-keyed `on/once/off/emit` emitter with a closed `enum`
//! carried over `tokio::sync::broadcast`, the way `dlman`'s
//! `DownloadManager` carries a `broadcast::Sender<CoreEvent>`.

/// Messages a Worker sends to its Coordinator. Breaks the Worker→Coordinator
/// back-reference cycle the source has (§9 "Cyclic references").
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A line for the per-download text log.
    Log(String),
    /// This Worker's range is fully written; `true` if the remote stream
    /// ended because the range was already satisfied (a 416 response).
    Finish { index: usize, already_complete: bool },
    /// This Worker was torn down (cancelled or errored) and its part file
    /// handle is closed.
    Destroy { index: usize },
}

/// Events a Download handle (Coordinator) emits to its subscribers (§6).
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Start,
    /// `(speed string, percent complete, ETA in milliseconds)`.
    Progress(String, u32, u64),
    Stop,
    Finish,
    Removed,
}

/// Events the Manager emits to its subscribers (§6).
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A new or resumed download is now tracked, named by its filename.
    Download(String),
    Removed(String),
}

