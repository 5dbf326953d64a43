//! Tests for error types

use prometheus_task_scheduler::core::{SchedulerError, TaskError};

#[test]
fn test_task_not_found_error() {
    let err = SchedulerError::TaskNotFound("ingest".to_string());
    assert_eq!(format!("{}", err), "task 'ingest' not found");
}

#[test]
fn test_duplicate_task_error() {
    let err = SchedulerError::DuplicateTask("ingest".to_string());
    assert_eq!(format!("{}", err), "task with name 'ingest' already exists");
}

#[test]
fn test_type_mismatch_error() {
    let err = SchedulerError::TypeMismatch {
        name: "ingest".to_string(),
        expected: "u32",
        actual: "alloc::string::String",
    };
    let msg = err.to_string();
    assert!(msg.contains("ingest"));
    assert!(msg.contains("u32"));
    assert!(msg.contains("alloc::string::String"));
}

#[test]
fn test_lifecycle_errors() {
    assert_eq!(
        SchedulerError::NotCompleted("a".into()).to_string(),
        "task 'a' has not completed"
    );
    assert_eq!(
        SchedulerError::Cancelled("a".into()).to_string(),
        "task 'a' was cancelled"
    );
    assert_eq!(SchedulerError::PoolStopped.to_string(), "thread pool has been stopped");
    assert_eq!(SchedulerError::Timeout.to_string(), "operation timed out");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("worker_count must be greater than 0".into());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: worker_count must be greater than 0"
    );
}

#[test]
fn test_failed_is_transparent() {
    let captured = TaskError::new(anyhow::anyhow!("disk full"));
    let err = SchedulerError::Failed(captured.clone());
    assert_eq!(err.to_string(), "disk full");
    assert!(err.task_error().is_some_and(|e| e.ptr_eq(&captured)));
    assert!(SchedulerError::Timeout.task_error().is_none());
}

#[test]
fn test_task_error_downcast() {
    #[derive(Debug, thiserror::Error)]
    #[error("quota exceeded by {0}")]
    struct Quota(u32);

    let captured = TaskError::new(Quota(7).into());
    assert_eq!(captured.downcast_ref::<Quota>().map(|q| q.0), Some(7));
    assert!(captured.downcast_ref::<std::io::Error>().is_none());
    assert_eq!(captured.to_string(), "quota exceeded by 7");
}

#[test]
fn test_io_error_converts_to_worker_spawn() {
    let io = std::io::Error::other("no threads left");
    let err: SchedulerError = io.into();
    assert!(matches!(err, SchedulerError::WorkerSpawn(_)));
    assert!(err.to_string().contains("no threads left"));
}
