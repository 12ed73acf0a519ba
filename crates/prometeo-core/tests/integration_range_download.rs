//! Integration tests: a loopback HTTP/1.1 server with Range support drives
//! real `Coordinator`/`Manager` runs end-to-end (no mocked transport).

mod common;

use prometeo_core::config::PrometeoConfig;
use prometeo_core::coordinator::{Coordinator, CoordinatorState};
use prometeo_core::error::PrometeoError;
use prometeo_core::manager::Manager;
use prometeo_core::manifest::write_manifest;
use prometeo_core::plan::{plan_ranges, Plan};

use std::sync::Arc;
use std::time::{Duration, Instant};

fn build_plan(dir: &std::path::Path, size: u64, connections: usize, url: String) -> Plan {
    let work_dir = dir.join("work");
    std::fs::create_dir_all(&work_dir).unwrap();
    let parts = plan_ranges(size, connections, &work_dir, "body.bin");
    Plan {
        url,
        name: "body.bin".to_string(),
        size,
        destination: dir.join("body.bin"),
        work_dir,
        content_type: "application/octet-stream".to_string(),
        parts,
        speed_bps: 50_000_000,
        finished: false,
        resumed: false,
    }
}

#[tokio::test]
async fn clean_multi_way_download_matches_served_body() {
    let body: Vec<u8> = (0u8..=250).cycle().take(64 * 1024).collect();
    let url = common::range_server::start(body.clone());
    let dir = tempfile::tempdir().unwrap();
    let plan = build_plan(dir.path(), body.len() as u64, 4, url);
    let destination = plan.destination.clone();

    let coordinator = Coordinator::new(plan, "prometeo-test/1.0".to_string()).unwrap();
    coordinator.start().await.expect("download should complete");

    assert_eq!(coordinator.state().await, CoordinatorState::Finished);
    let content = std::fs::read(&destination).unwrap();
    assert_eq!(content.len(), body.len());
    assert_eq!(content, body);
}

#[tokio::test]
async fn resume_continues_from_partial_part_files() {
    let body: Vec<u8> = (0u8..=250).cycle().take(256 * 1024).collect();
    let url = common::range_server::start(body.clone());
    let dir = tempfile::tempdir().unwrap();
    let plan = build_plan(dir.path(), body.len() as u64, 4, url);
    let work_dir = plan.work_dir.clone();
    let destination = plan.destination.clone();

    // Throttled far below the body size so the first attempt is still
    // in-flight when we cancel it.
    let mut slow_plan = plan.clone();
    slow_plan.speed_bps = 32 * 1024;
    let first = Arc::new(Coordinator::new(slow_plan, "prometeo-test/1.0".to_string()).unwrap());
    let handle = {
        let first = Arc::clone(&first);
        tokio::spawn(async move { first.start().await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    first.stop().await;
    let _ = handle.await;

    let partial_total: u64 = std::fs::read_dir(&work_dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.metadata().unwrap().len())
        .sum();
    assert!(partial_total > 0, "expected some bytes written before stop");
    assert!(
        partial_total < body.len() as u64,
        "expected an incomplete download, got {partial_total} of {} bytes",
        body.len()
    );

    let mut resumed_plan = plan;
    resumed_plan.resumed = true;
    let second = Coordinator::new(resumed_plan, "prometeo-test/1.0".to_string()).unwrap();
    second.start().await.expect("resumed download should complete");

    let content = std::fs::read(&destination).unwrap();
    assert_eq!(content, body);
}

#[tokio::test]
async fn non_range_capable_origin_is_rejected() {
    let body = vec![7u8; 4096];
    let url = common::range_server::start_with_options(
        body,
        common::range_server::RangeServerOptions {
            head_allowed: true,
            support_ranges: false,
            advertise_ranges: false,
        },
    );

    let dir = tempfile::tempdir().unwrap();
    let config = PrometeoConfig {
        connections: 4,
        tempdir: dir.path().to_path_buf(),
        user_agent: "prometeo-test/1.0".to_string(),
        speed_limit_mbps: 1000.0,
    };
    let manager = Manager::new(config);
    let destination = tempfile::tempdir().unwrap();
    let result = manager.download(&url, destination.path(), None).await;

    assert!(matches!(result, Err(PrometeoError::BadURLError(_))));
}

#[tokio::test]
async fn manager_stop_all_halts_tracked_downloads_within_budget() {
    let body: Vec<u8> = (0u8..=250).cycle().take(512 * 1024).collect();
    let url = common::range_server::start(body.clone());
    let dir = tempfile::tempdir().unwrap();
    let tempdir_root = dir.path().join("state");
    let work_dir = tempdir_root.join("body.bin");
    std::fs::create_dir_all(&work_dir).unwrap();

    let parts = plan_ranges(body.len() as u64, 2, &work_dir, "body.bin");
    let plan = Plan {
        url,
        name: "body.bin".to_string(),
        size: body.len() as u64,
        destination: dir.path().join("body.bin"),
        work_dir: work_dir.clone(),
        content_type: "application/octet-stream".to_string(),
        parts,
        speed_bps: 16 * 1024,
        finished: false,
        resumed: false,
    };
    write_manifest(&work_dir, &plan).unwrap();

    let config = PrometeoConfig {
        connections: 2,
        tempdir: tempdir_root,
        user_agent: "prometeo-test/1.0".to_string(),
        speed_limit_mbps: 1000.0,
    };
    let manager = Arc::new(Manager::new(config));
    manager.scan_and_resume().await.unwrap();

    let coordinator = manager
        .get_download(Some("body.bin"), None)
        .await
        .expect("rehydrated download should be tracked");

    let running = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.start().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    manager.stop_all().await;
    assert!(start.elapsed() < Duration::from_millis(1100));
    assert_eq!(coordinator.state().await, CoordinatorState::Stopped);
    let _ = running.await;
}
