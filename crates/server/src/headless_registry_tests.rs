use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use platform_core::container::ContainerHandle;
use platform_core::model::{ContainerId, DockerId, PromptSource};
use platform_core::test_support::FakeContainer;

use super::{ContainerResolver, HeadlessRegistry};
use crate::db::HistoryStore;

struct FakeResolver {
    container: Arc<FakeContainer>,
}

impl ContainerResolver for FakeResolver {
    fn resolve<'a>(
        &'a self,
        _container_id: ContainerId,
        _docker_id: DockerId,
    ) -> Pin<Box<dyn std::future::Future<Output = Arc<dyn ContainerHandle>> + Send + 'a>> {
        Box::pin(async move { self.container.clone() as Arc<dyn ContainerHandle> })
    }
}

fn registry(idle_timeout: Duration, reaper_interval: Duration) -> (Arc<HeadlessRegistry>, Arc<FakeContainer>) {
    let db = Arc::new(HistoryStore::open_in_memory().unwrap());
    let container = Arc::new(FakeContainer::new(1));
    let resolver = Arc::new(FakeResolver { container: container.clone() });
    let registry = HeadlessRegistry::new(db, resolver, "claude".into(), 3e-6, 1.5e-5, idle_timeout, reaper_interval);
    (registry, container)
}

#[tokio::test]
async fn create_session_registers_both_maps() {
    let (registry, _container) = registry(Duration::from_secs(1800), Duration::from_secs(300));
    let session = registry.create_session(ContainerId(1), DockerId("d1".into()), "/workspace".into()).await.unwrap();

    assert!(registry.get_session(session.session_id()).await.is_some());
    assert!(registry.get_session_by_conversation_id(session.conversation_id()).await.is_some());
}

#[tokio::test]
async fn create_session_for_conversation_reuses_a_live_session() {
    let (registry, _container) = registry(Duration::from_secs(1800), Duration::from_secs(300));
    let first = registry.create_session(ContainerId(1), DockerId("d1".into()), "/workspace".into()).await.unwrap();

    let second = registry
        .create_session_for_conversation(first.conversation_id(), ContainerId(1), DockerId("d1".into()), "/workspace".into())
        .await
        .unwrap();

    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(registry.session_count().await, 1);
}

#[tokio::test]
async fn send_prompt_rejects_when_already_running() {
    let (registry, _container) = registry(Duration::from_secs(1800), Duration::from_secs(300));
    let session = registry.create_session(ContainerId(1), DockerId("d1".into()), "/workspace".into()).await.unwrap();

    registry.send_prompt(session.session_id(), "first".into(), PromptSource::User, None).await.unwrap();
    let result = registry.send_prompt(session.session_id(), "second".into(), PromptSource::User, None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn send_prompt_rejects_an_unknown_session() {
    let (registry, _container) = registry(Duration::from_secs(1800), Duration::from_secs(300));
    let result = registry
        .send_prompt(platform_core::model::SessionId(404), "hi".into(), PromptSource::User, None)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn close_session_removes_it_from_both_maps() {
    let (registry, _container) = registry(Duration::from_secs(1800), Duration::from_secs(300));
    let session = registry.create_session(ContainerId(1), DockerId("d1".into()), "/workspace".into()).await.unwrap();

    registry.close_session(session.session_id()).await;

    assert!(registry.get_session(session.session_id()).await.is_none());
    assert!(registry.get_session_by_conversation_id(session.conversation_id()).await.is_none());
}

#[tokio::test]
async fn idle_reaper_closes_sessions_past_the_timeout() {
    let (registry, _container) = registry(Duration::from_millis(20), Duration::from_millis(10));
    let session = registry.create_session(ContainerId(1), DockerId("d1".into()), "/workspace".into()).await.unwrap();
    let session_id = session.session_id();
    drop(session);

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(registry.get_session(session_id).await.is_none());
    registry.shutdown();
}
