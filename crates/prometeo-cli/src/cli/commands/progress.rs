//! Shared foreground progress printer, driven by `Coordinator::subscribe`.

use prometeo_core::coordinator::Coordinator;
use prometeo_core::events::CoordinatorEvent;
use std::sync::Arc;

/// Prints `speed`/`percent`/`eta` lines for one Coordinator until it reaches
/// a terminal event, then returns. A carriage-return progress line driven by
/// the Coordinator's `(speed, percent, eta_ms)` broadcast tuple.
pub async fn print_until_done(name: &str, coordinator: &Arc<Coordinator>) {
    let mut events = coordinator.subscribe();
    loop {
        match events.recv().await {
            Ok(CoordinatorEvent::Progress(speed, percent, eta_ms)) => {
                let eta = if eta_ms == u64::MAX {
                    "?".to_string()
                } else {
                    format!("{:.1}s", eta_ms as f64 / 1000.0)
                };
                print!("\r{name}: {percent:>3}%  {speed}  ETA {eta}   ");
                use std::io::Write;
                let _ = std::io::stdout().flush();
            }
            Ok(CoordinatorEvent::Finish) | Ok(CoordinatorEvent::Stop) => {
                println!();
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }
    }
}
