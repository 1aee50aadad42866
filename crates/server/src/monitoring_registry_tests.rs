use std::sync::Arc;

use platform_core::model::{ContainerId, DockerId, MonitoringConfig};

use super::MonitoringRegistry;
use crate::container::ContainerDirectory;
use crate::db::HistoryStore;

struct NoopSink;

impl platform_core::monitoring_session::AutomationLogSink for NoopSink {
    fn record<'a>(
        &'a self,
        _entry: platform_core::model::AutomationLogEntry,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

fn registry() -> MonitoringRegistry {
    let db = Arc::new(HistoryStore::open_in_memory().expect("in-memory db"));
    MonitoringRegistry::new(Arc::new(ContainerDirectory::new()), db, Arc::new(NoopSink), None)
}

#[tokio::test]
async fn get_or_create_is_idempotent_per_container() {
    let registry = registry();
    let a = registry.get_or_create(ContainerId(1), DockerId("d1".into()), MonitoringConfig::default()).await;
    let b = registry.get_or_create(ContainerId(1), DockerId("d1".into()), MonitoringConfig::default()).await;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.session_count().await, 1);
    assert!(registry.get_task_queue(ContainerId(1)).await.is_some());
}

#[tokio::test]
async fn remove_is_idempotent_for_an_unknown_container() {
    let registry = registry();
    registry.remove(ContainerId(99)).await;
    assert_eq!(registry.session_count().await, 0);
}

#[tokio::test]
async fn remove_drops_the_session() {
    let registry = registry();
    registry.get_or_create(ContainerId(1), DockerId("d1".into()), MonitoringConfig::default()).await;
    registry.remove(ContainerId(1)).await;
    assert!(registry.get(ContainerId(1)).await.is_none());
    assert_eq!(registry.session_count().await, 0);
    assert!(registry.get_task_queue(ContainerId(1)).await.is_none());
}

#[tokio::test]
async fn queue_strategy_consumes_pending_task_through_the_wired_registry() {
    let registry = registry();
    let mut config = MonitoringConfig::default();
    config.active_strategy = platform_core::model::ActiveStrategy::Queue;
    config.silence_threshold_secs = 5;

    let session = registry.get_or_create(ContainerId(1), DockerId("d1".into()), config).await;
    let queue = registry.get_task_queue(ContainerId(1)).await.expect("task queue");
    queue.add("do the thing").await.expect("add task");

    session.enable();
    // Strategy execution happens on the silence timer; this test only
    // verifies the registry wiring produced a queue-backed session and a
    // reachable task queue, not timer-driven execution timing.
    assert_eq!(queue.list().await.expect("list").len(), 1);
}
