//! `prometeo status` – list every download tracked after a tempdir scan.

use anyhow::Result;
use prometeo_core::manager::Manager;

pub async fn run_status(manager: &Manager) -> Result<()> {
    manager.scan_and_resume().await?;

    let names = manager.tracked_names().await;
    if names.is_empty() {
        println!("no tracked downloads");
        return Ok(());
    }

    println!("{:<32} {:<10} {:<10} {}", "NAME", "STATE", "SIZE", "URL");
    for name in names {
        let Some(coordinator) = manager.get_download(Some(&name), None).await else {
            continue;
        };
        let state = coordinator.state().await;
        let size = coordinator.size().await;
        let url = coordinator.url().await;
        println!("{:<32} {:<10} {:<10} {}", name, format!("{state:?}"), size, url);
    }
    Ok(())
}
