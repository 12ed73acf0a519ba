//! `prometeo download <url>` – start a new download and follow it to completion.

use anyhow::Result;
use prometeo_core::manager::Manager;
use std::path::Path;

use super::progress::print_until_done;

pub async fn run_download(
    manager: &Manager,
    url: &str,
    dir: &Path,
    filename: Option<&str>,
    speed_mbps: Option<f64>,
) -> Result<()> {
    let coordinator = manager.download(url, dir, filename).await?;
    let name = coordinator.name().await;
    println!("started {name} ({url})");

    if let Some(mbps) = speed_mbps {
        manager.set_speed(mbps).await?;
    }

    print_until_done(&name, &coordinator).await;

    let state = coordinator.state().await;
    println!("{name}: {state:?}");
    Ok(())
}
