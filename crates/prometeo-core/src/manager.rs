//! Manager host layer (§6, §10): the library entry point a caller constructs
//! once per process. Owns configuration, every tracked Coordinator, and the
//! startup directory scan that rehydrates resumable downloads from their
//! on-disk manifests.
//!
//! No single prior implementation covers this end to end: dispatch and job
//! storage used to live in separate places (a scheduler loop plus a
//! SQLite-backed job store queried by the CLI). This crate folds both into
//! one in-process registry since there is no database to query — the
//! manifest directory scan itself is the job list (§4.4).

use crate::config::PrometeoConfig;
use crate::coordinator::Coordinator;
use crate::error::PrometeoError;
use crate::events::ManagerEvent;
use crate::manifest::{read_manifest, write_manifest, MANIFEST_FILE_NAME};
use crate::plan::{plan_ranges, Plan};
use crate::prober;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

pub struct Manager {
    config: Mutex<PrometeoConfig>,
    coordinators: Mutex<HashMap<String, Arc<Coordinator>>>,
    event_tx: broadcast::Sender<ManagerEvent>,
}

impl Manager {
    pub fn new(config: PrometeoConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Manager {
            config: Mutex::new(config),
            coordinators: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    pub async fn config(&self) -> PrometeoConfig {
        self.config.lock().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.event_tx.subscribe()
    }

    /// Scans `config.tempdir` for work directories left from a prior process
    /// and rehydrates each one whose manifest decodes cleanly into a
    /// `Planned` Coordinator marked `resumed`. A directory whose manifest is
    /// missing or corrupt is logged at `warn` and left on disk untouched for
    /// manual inspection, never deleted by the scan itself.
    pub async fn scan_and_resume(&self) -> std::io::Result<()> {
        let config = self.config().await;
        if !config.tempdir.exists() {
            return Ok(());
        }

        let mut entries = tokio::fs::read_dir(&config.tempdir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() || !path.join(MANIFEST_FILE_NAME).exists() {
                continue;
            }

            match read_manifest(&path) {
                Ok(mut plan) => {
                    if plan.finished {
                        continue;
                    }
                    plan.resumed = true;
                    let name = plan.name.clone();
                    match Coordinator::new(plan, config.user_agent.clone()) {
                        Ok(coordinator) => {
                            self.coordinators
                                .lock()
                                .await
                                .insert(name.clone(), Arc::new(coordinator));
                            let _ = self.event_tx.send(ManagerEvent::Download(name));
                        }
                        Err(e) => {
                            tracing::warn!(dir = %path.display(), error = %e, "resumed manifest rejected");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "invalid manifest, leaving directory for manual inspection");
                }
            }
        }
        Ok(())
    }

    /// Starts a new download for `url` (§6): probes it, resolves the final
    /// filename (`filename` if given, else the probed/derived name), rejects
    /// if that destination already exists under `path`, builds a Plan split
    /// into `config.connections` Ranges, persists the manifest, registers the
    /// Coordinator, and spawns its `start()` in the background. Returns the
    /// Coordinator handle immediately; the caller observes progress via
    /// `Coordinator::subscribe`/`progress`.
    pub async fn download(
        &self,
        url: &str,
        path: &std::path::Path,
        filename: Option<&str>,
    ) -> Result<Arc<Coordinator>, PrometeoError> {
        if !prober::validate(url) {
            return Err(PrometeoError::BadURLError(format!(
                "not a valid absolute URL: {url}"
            )));
        }

        let config = self.config().await;
        let probe_url = url.to_string();
        let probe_ua = config.user_agent.clone();
        let probe =
            tokio::task::spawn_blocking(move || prober::get_data_blocking(&probe_url, &probe_ua))
                .await
                .map_err(|e| PrometeoError::InternalError(format!("probe task panicked: {e}")))??;

        if probe.size == 0 {
            return Err(PrometeoError::BadMetadataError(
                "remote reports zero-length content".to_string(),
            ));
        }
        if !probe.accept_range {
            return Err(PrometeoError::BadURLError(
                "origin does not advertise byte-range support".to_string(),
            ));
        }

        let name = match filename {
            Some(explicit) => {
                crate::url_model::resolve_filename(Some(explicit), &probe.file_type)
            }
            None => probe.file_name.clone(),
        };

        std::fs::create_dir_all(path)
            .map_err(|e| PrometeoError::InvalidArgumentError(format!("create destination dir: {e}")))?;
        let destination = path.join(&name);
        if destination.exists() {
            return Err(PrometeoError::InvalidArgumentError(format!(
                "destination already exists: {}",
                destination.display()
            )));
        }

        let work_dir = config.tempdir.join(&name);
        std::fs::create_dir_all(&work_dir)
            .map_err(|e| PrometeoError::InternalError(format!("create work dir: {e}")))?;

        let parts = plan_ranges(probe.size, config.connections, &work_dir, &name);
        let plan = Plan {
            url: url.to_string(),
            name: name.clone(),
            size: probe.size,
            destination,
            work_dir: work_dir.clone(),
            content_type: probe.content_type,
            parts,
            speed_bps: config.speed_limit_bps(),
            finished: false,
            resumed: false,
        };
        write_manifest(&work_dir, &plan)
            .map_err(|e| PrometeoError::InternalError(format!("write manifest: {e}")))?;

        let coordinator = Arc::new(Coordinator::new(plan, config.user_agent.clone())?);
        self.coordinators
            .lock()
            .await
            .insert(name.clone(), Arc::clone(&coordinator));
        let _ = self.event_tx.send(ManagerEvent::Download(name));

        let spawned = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = spawned.start().await {
                tracing::warn!(error = %e, "download ended with an error");
            }
        });

        Ok(coordinator)
    }

    /// Looks up a tracked download by filename OR url (§6: either matches
    /// independently; supplying both means "either matches", not "both must
    /// match").
    pub async fn get_download(
        &self,
        filename: Option<&str>,
        url: Option<&str>,
    ) -> Option<Arc<Coordinator>> {
        let snapshot: Vec<Arc<Coordinator>> =
            self.coordinators.lock().await.values().cloned().collect();
        for coordinator in snapshot {
            let name_matches = match filename {
                Some(f) => coordinator.name().await == f,
                None => false,
            };
            let url_matches = match url {
                Some(u) => coordinator.url().await == u,
                None => false,
            };
            if name_matches || url_matches {
                return Some(coordinator);
            }
        }
        None
    }

    /// Updates the global rate ceiling (§6 `setSpeed`) and propagates it to
    /// every currently tracked download, not just one. New downloads started
    /// afterwards pick up the new ceiling from `config.speed_limit_bps()`.
    pub async fn set_speed(&self, mbps: f64) -> Result<(), PrometeoError> {
        if mbps <= 0.0 {
            return Err(PrometeoError::InvalidArgumentError(
                "speed limit must be positive".to_string(),
            ));
        }

        let total_bps = {
            let mut config = self.config.lock().await;
            config.speed_limit_mbps = mbps;
            config.speed_limit_bps()
        };

        let snapshot: Vec<Arc<Coordinator>> =
            self.coordinators.lock().await.values().cloned().collect();
        for coordinator in snapshot {
            coordinator.set_speed(total_bps).await?;
        }
        Ok(())
    }

    /// Names of every currently tracked download, in no particular order.
    pub async fn tracked_names(&self) -> Vec<String> {
        self.coordinators.lock().await.keys().cloned().collect()
    }

    /// Stops every tracked download, each bounded by its own 1000ms drain
    /// timer (§4.3 `stop()`). Used by the SIGINT handler for a graceful exit.
    pub async fn stop_all(&self) {
        let snapshot: Vec<Arc<Coordinator>> =
            self.coordinators.lock().await.values().cloned().collect();
        for coordinator in snapshot {
            coordinator.stop().await;
        }
    }
}

/// Installs a `Ctrl-C` handler that stops every tracked download and then
/// exits the process with status 1, the way a long-running download manager
/// process is expected to shut down on an interactive interrupt.
pub fn install_sigint_handler(manager: Arc<Manager>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, stopping tracked downloads");
            manager.stop_all().await;
            std::process::exit(1);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_tempdir(tempdir: std::path::PathBuf) -> PrometeoConfig {
        PrometeoConfig {
            connections: 2,
            tempdir,
            user_agent: "test-agent".to_string(),
            speed_limit_mbps: 10.0,
        }
    }

    #[tokio::test]
    async fn scan_and_resume_on_missing_tempdir_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let manager = Manager::new(config_with_tempdir(missing));
        manager.scan_and_resume().await.unwrap();
        assert!(manager.get_download(Some("anything"), None).await.is_none());
    }

    #[tokio::test]
    async fn scan_and_resume_rehydrates_a_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("file.iso");
        std::fs::create_dir_all(&work_dir).unwrap();

        let parts = plan_ranges(1000, 2, &work_dir, "file.iso");
        let plan = Plan {
            url: "https://example.com/file.iso".to_string(),
            name: "file.iso".to_string(),
            size: 1000,
            destination: dir.path().join("file.iso"),
            work_dir: work_dir.clone(),
            content_type: "application/octet-stream".to_string(),
            parts,
            speed_bps: 1_250_000,
            finished: false,
            resumed: false,
        };
        write_manifest(&work_dir, &plan).unwrap();

        let manager = Manager::new(config_with_tempdir(dir.path().to_path_buf()));
        manager.scan_and_resume().await.unwrap();

        let found = manager.get_download(Some("file.iso"), None).await;
        assert!(found.is_some());
        let found = manager
            .get_download(None, Some("https://example.com/file.iso"))
            .await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn scan_and_resume_skips_already_finished_plans() {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("done.bin");
        std::fs::create_dir_all(&work_dir).unwrap();

        let parts = plan_ranges(10, 1, &work_dir, "done.bin");
        let plan = Plan {
            url: "https://example.com/done.bin".to_string(),
            name: "done.bin".to_string(),
            size: 10,
            destination: dir.path().join("done.bin"),
            work_dir: work_dir.clone(),
            content_type: "application/octet-stream".to_string(),
            parts,
            speed_bps: 1_250_000,
            finished: true,
            resumed: false,
        };
        write_manifest(&work_dir, &plan).unwrap();

        let manager = Manager::new(config_with_tempdir(dir.path().to_path_buf()));
        manager.scan_and_resume().await.unwrap();
        assert!(manager.get_download(Some("done.bin"), None).await.is_none());
    }

    #[tokio::test]
    async fn set_speed_rejects_non_positive_rate() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Manager::new(config_with_tempdir(dir.path().to_path_buf()));
        let result = manager.set_speed(0.0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_speed_propagates_to_every_tracked_download() {
        let dir = tempfile::tempdir().unwrap();

        for (n, speed) in [("a.bin", 1_250_000u64), ("b.bin", 1_250_000u64)] {
            let work_dir = dir.path().join(n);
            std::fs::create_dir_all(&work_dir).unwrap();
            let parts = plan_ranges(1000, 1, &work_dir, n);
            let plan = Plan {
                url: format!("https://example.com/{n}"),
                name: n.to_string(),
                size: 1000,
                destination: dir.path().join(n),
                work_dir: work_dir.clone(),
                content_type: "application/octet-stream".to_string(),
                parts,
                speed_bps: speed,
                finished: false,
                resumed: false,
            };
            write_manifest(&work_dir, &plan).unwrap();
        }

        let manager = Manager::new(config_with_tempdir(dir.path().to_path_buf()));
        manager.scan_and_resume().await.unwrap();

        manager.set_speed(5.0).await.unwrap();

        let expected_bps = manager.config().await.speed_limit_bps();
        assert_eq!(expected_bps, 5 * 125_000);

        for n in ["a.bin", "b.bin"] {
            let coordinator = manager.get_download(Some(n), None).await.unwrap();
            assert_eq!(coordinator.speed_bps().await, expected_bps);
        }
    }
}
