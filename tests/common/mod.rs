//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

use std::time::{Duration, Instant};

use robot_serial::backend::{BackendMessage, FrontendReceiver};
use robot_serial::config::AppConfig;

/// Upper bound for waiting on the backend thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Config with no board reset delay and no operation log file
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.serial.reset_delay_ms = 0;
    config.serial.poll_interval_ms = 1;
    config.operation_log.enabled = false;
    config
}

/// Collect backend messages until `done` holds for the collected set or the timeout passes
pub fn collect_until(
    frontend: &FrontendReceiver,
    mut done: impl FnMut(&[BackendMessage]) -> bool,
) -> Vec<BackendMessage> {
    let deadline = Instant::now() + test_timeout();
    let mut messages = Vec::new();
    while Instant::now() < deadline {
        messages.extend(frontend.drain());
        if done(&messages) {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    messages
}

/// Text from all `Received` messages, concatenated
pub fn received_text(messages: &[BackendMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            BackendMessage::Received(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}
