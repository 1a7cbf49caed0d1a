use super::*;

use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests in this module; they all mutate process env.
fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_guard()`.
unsafe fn clear_taskflow_env() {
    unsafe {
        std::env::remove_var("TASKFLOW_API_URL");
        std::env::remove_var("TASKFLOW_PUSHER_KEY");
        std::env::remove_var("TASKFLOW_PUSHER_CLUSTER");
        std::env::remove_var("TASKFLOW_REALTIME_URL");
        std::env::remove_var("TASKFLOW_REQUEST_TIMEOUT_SECS");
        std::env::remove_var("TASKFLOW_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("TASKFLOW_POLL_INTERVAL_SECS");
    }
}

#[test]
fn from_env_defaults_with_only_key() {
    let _env = env_guard();
    unsafe {
        clear_taskflow_env();
        std::env::set_var("TASKFLOW_PUSHER_KEY", "app-key");
    }

    let cfg = SyncConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, DEFAULT_API_URL);
    assert_eq!(cfg.timeouts, HttpTimeouts::default());
    assert_eq!(cfg.poll_interval, Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
    assert_eq!(cfg.realtime.cluster, "us2");
    assert!(cfg.realtime.socket_url.starts_with("wss://ws-us2.pusher.com/app/app-key?protocol=7"));
    assert_eq!(cfg.realtime.auth_endpoint, "http://localhost:3001/api/pusher/auth");

    unsafe { clear_taskflow_env() };
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_guard();
    unsafe {
        clear_taskflow_env();
        std::env::set_var("TASKFLOW_PUSHER_KEY", "k");
        std::env::set_var("TASKFLOW_API_URL", "https://api.example.test/api/");
        std::env::set_var("TASKFLOW_PUSHER_CLUSTER", "eu");
        std::env::set_var("TASKFLOW_REALTIME_URL", "ws://127.0.0.1:6001/app/k");
        std::env::set_var("TASKFLOW_REQUEST_TIMEOUT_SECS", "3");
        std::env::set_var("TASKFLOW_CONNECT_TIMEOUT_SECS", "1");
        std::env::set_var("TASKFLOW_POLL_INTERVAL_SECS", "30");
    }

    let cfg = SyncConfig::from_env().unwrap();
    assert_eq!(cfg.api_url, "https://api.example.test/api");
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 3, connect_secs: 1 });
    assert_eq!(cfg.poll_interval, Duration::from_secs(30));
    assert_eq!(cfg.realtime.cluster, "eu");
    assert_eq!(cfg.realtime.socket_url, "ws://127.0.0.1:6001/app/k");
    assert_eq!(cfg.realtime.auth_endpoint, "https://api.example.test/api/pusher/auth");

    unsafe { clear_taskflow_env() };
}

#[test]
fn from_env_missing_key_errors() {
    let _env = env_guard();
    unsafe { clear_taskflow_env() };

    let err = SyncConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar("TASKFLOW_PUSHER_KEY")));
    assert_eq!(err.code(), "E_CONFIG_MISSING");
}

#[test]
fn from_env_rejects_non_http_api_url() {
    let _env = env_guard();
    unsafe {
        clear_taskflow_env();
        std::env::set_var("TASKFLOW_PUSHER_KEY", "k");
        std::env::set_var("TASKFLOW_API_URL", "localhost:3001");
    }

    let err = SyncConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("TASKFLOW_API_URL"));

    unsafe { clear_taskflow_env() };
}

#[test]
fn from_env_invalid_numbers_fall_back_to_defaults() {
    let _env = env_guard();
    unsafe {
        clear_taskflow_env();
        std::env::set_var("TASKFLOW_PUSHER_KEY", "k");
        std::env::set_var("TASKFLOW_REQUEST_TIMEOUT_SECS", "soon");
        std::env::set_var("TASKFLOW_POLL_INTERVAL_SECS", "0");
    }

    let cfg = SyncConfig::from_env().unwrap();
    assert_eq!(cfg.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    assert_eq!(cfg.poll_interval, Duration::from_secs(1));

    unsafe { clear_taskflow_env() };
}
