//! Tests for configuration validation

use prometheus_task_scheduler::config::SchedulerConfig;

#[test]
fn test_scheduler_config_validation() {
    let valid = SchedulerConfig {
        worker_count: 4,
        thread_stack_size: 256 * 1024,
        thread_name_prefix: "jobs".to_string(),
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_worker_count() {
    let invalid = SchedulerConfig::new().with_worker_count(0);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("worker_count"));
}

#[test]
fn test_scheduler_config_invalid_stack_size() {
    let invalid = SchedulerConfig::new().with_thread_stack_size(1024);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("thread_stack_size"));
}

#[test]
fn test_scheduler_config_invalid_prefix() {
    let invalid = SchedulerConfig::new().with_thread_name_prefix("   ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_json_partial() {
    let cfg = SchedulerConfig::from_json_str(r#"{"worker_count": 2}"#).unwrap();
    assert_eq!(cfg.worker_count, 2);
    assert_eq!(cfg.thread_name_prefix, SchedulerConfig::default().thread_name_prefix);
    assert_eq!(cfg.thread_stack_size, SchedulerConfig::default().thread_stack_size);
}

#[test]
fn test_scheduler_config_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"worker_count": 0}"#).is_err());
    let err = SchedulerConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_scheduler_config_serde_roundtrip() {
    let cfg = SchedulerConfig::new()
        .with_worker_count(6)
        .with_thread_name_prefix("render");
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"thread_name_prefix\":\"render\""));
    let back = SchedulerConfig::from_json_str(&json).unwrap();
    assert_eq!(back, cfg);
}
