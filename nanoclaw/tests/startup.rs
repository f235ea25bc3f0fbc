use nanoclaw::check_container_subsystem;

#[tokio::test(flavor = "multi_thread")]
async fn container_subsystem_check_fails_for_a_missing_binary() {
    let err = check_container_subsystem("nanoclaw-definitely-not-a-real-binary").await.unwrap_err();
    assert!(!err.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn container_subsystem_check_fails_when_the_command_exits_nonzero() {
    let err = check_container_subsystem("false").await.unwrap_err();
    assert!(err.contains("exited"));
}

#[tokio::test(flavor = "multi_thread")]
async fn container_subsystem_check_succeeds_when_the_command_exits_zero() {
    check_container_subsystem("true").await.unwrap();
}
