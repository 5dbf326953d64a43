//! Tests for shared primitive types

use prometheus_task_scheduler::core::{SchedulerStats, TaskStatus};
use prometheus_task_scheduler::util::Priority;

#[test]
fn test_priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
    assert_eq!(Priority::default(), Priority::Medium);
}

#[test]
fn test_priority_all_is_ascending() {
    let mut sorted = Priority::ALL;
    sorted.sort();
    assert_eq!(sorted, Priority::ALL);
}

#[test]
fn test_priority_display() {
    let labels: Vec<String> = Priority::ALL.iter().map(ToString::to_string).collect();
    assert_eq!(labels, ["low", "medium", "high", "critical"]);
}

#[test]
fn test_task_status_terminal() {
    assert!(!TaskStatus::Pending.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(TaskStatus::Cancelled.is_terminal());
}

#[test]
fn test_task_status_labels() {
    assert_eq!(TaskStatus::Running.to_string(), "RUNNING");
    assert_eq!(
        serde_json::to_string(&TaskStatus::Cancelled).unwrap(),
        "\"cancelled\""
    );
}

#[test]
fn test_stats_serialize() {
    let stats = SchedulerStats {
        total_tasks: 3,
        completed_tasks: 2,
        max_workers: 4,
        ..SchedulerStats::default()
    };
    let value = serde_json::to_value(&stats).unwrap();
    assert_eq!(value["total_tasks"], 3);
    assert_eq!(value["completed_tasks"], 2);
    assert_eq!(value["max_workers"], 4);
    assert_eq!(value["failed_tasks"], 0);
}
