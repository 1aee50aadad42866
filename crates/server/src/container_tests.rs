use platform_core::container::ContainerHandle;
use platform_core::model::{ContainerId, DockerId};

use super::DockerContainerHandle;

#[tokio::test]
async fn write_input_without_a_running_process_errors() {
    let handle = DockerContainerHandle::new(ContainerId(1), DockerId("nope".into()));
    let err = handle.write_input(b"hello\n").await.unwrap_err();
    assert!(err.to_string().contains("no active process"));
}

/// Exercises a real `docker exec` round trip. Requires a `docker` daemon and
/// a running container named `platform-server-test-fixture`; skipped in
/// environments without Docker.
#[tokio::test]
#[ignore = "requires a running docker daemon and test fixture container"]
async fn spawn_process_streams_stdout_from_a_real_container() {
    use platform_core::container::ProcessSpec;

    let handle = DockerContainerHandle::new(ContainerId(1), DockerId("platform-server-test-fixture".into()));
    let spec = ProcessSpec { argv: vec!["echo".into(), "hi".into()], workdir: "/".into() };
    let mut process = handle.spawn_process(spec).await.unwrap();
    let mut rx = process.take_stdout();
    let chunk = rx.recv().await.unwrap();
    assert_eq!(chunk, b"hi\n");
    let status = process.wait().await.unwrap();
    assert!(status.success());
}
