//! `prometeo resume` – rehydrate every unfinished download under the
//! configured tempdir and run them to completion in the foreground.

use anyhow::Result;
use prometeo_core::manager::{install_sigint_handler, Manager};
use std::sync::Arc;

use super::progress::print_until_done;

pub async fn run_resume(manager: Arc<Manager>, speed_mbps: Option<f64>) -> Result<()> {
    manager.scan_and_resume().await?;

    if let Some(mbps) = speed_mbps {
        manager.set_speed(mbps).await?;
    }

    install_sigint_handler(Arc::clone(&manager));

    let names = manager.tracked_names().await;
    if names.is_empty() {
        println!("nothing to resume");
        return Ok(());
    }

    let mut handles = Vec::new();
    for name in names {
        let Some(coordinator) = manager.get_download(Some(&name), None).await else {
            continue;
        };
        let started = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            if let Err(e) = started.start().await {
                tracing::warn!(error = %e, "resumed download ended with an error");
            }
        }));
        let printed = Arc::clone(&coordinator);
        handles.push(tokio::spawn(
            async move { print_until_done(&name, &printed).await },
        ));
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
