#![allow(dead_code)]

use std::time::Duration;

use sqlite_lease::Pool;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Reclamation runs on a background task; poll until it has caught up.
pub async fn wait_for_cur(pool: &Pool, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pool.cur() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "pool cur stuck at {} (expected {expected})",
            pool.cur()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
