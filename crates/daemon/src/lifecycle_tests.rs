use super::*;
use tempfile::tempdir;

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        base_dir: dir.join("base"),
        state_dir: dir.to_path_buf(),
        router: crate::config::RouterConfig {
            base_url: "http://router.test".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        },
        control_api_base_url: "http://control.test".to_string(),
        check_interval: std::time::Duration::from_secs(3600),
        quiet_hours: None,
        lock_path: dir.join("daemon.pid"),
        log_path: dir.join("daemon.log"),
        journal_path: dir.join("journal.wal"),
        rollback_path: dir.join("rollback.json"),
        routing_state_path: dir.join("routing_state.json"),
    }
}

#[tokio::test]
async fn startup_wires_every_component() {
    let dir = tempdir().unwrap();
    let result = startup(test_config(dir.path())).await.unwrap();
    assert!(dir.path().join("daemon.pid").exists());
    result.rollback_sweeper.stop().await;
    drop(result.daemon);
}

#[tokio::test]
async fn a_second_startup_against_the_same_state_dir_fails_to_lock() {
    let dir = tempdir().unwrap();
    let first = startup(test_config(dir.path())).await.unwrap();

    let second = startup(test_config(dir.path())).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    first.rollback_sweeper.stop().await;
    drop(first.daemon);
}
