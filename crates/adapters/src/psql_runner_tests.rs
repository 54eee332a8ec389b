use super::*;
use crate::runtime::FakeRuntimeAdapter;

#[tokio::test]
async fn container_runner_prefixes_psql_argv0() {
    let runtime = FakeRuntimeAdapter::new();
    let runner = ContainerPsqlRunner::new();
    let invocation = PsqlInvocation {
        instance_id: "instance-1".to_string(),
        args: vec!["-f".to_string(), "/sqlrs/scripts/a.sql".to_string()],
        workdir: None,
        stdin: None,
    };

    runner.run(&runtime, &invocation, None).await.unwrap();

    let calls = runtime.calls();
    assert!(matches!(
        calls.as_slice(),
        [crate::runtime::RuntimeCall::Exec { instance_id, cmd }]
            if instance_id == "instance-1"
                && cmd == &["psql", "-f", "/sqlrs/scripts/a.sql"]
    ));
}

#[tokio::test]
async fn container_runner_propagates_exec_errors() {
    let runtime = FakeRuntimeAdapter::new();
    runtime.fail_exec();
    let runner = ContainerPsqlRunner::new();
    let invocation = PsqlInvocation {
        instance_id: "instance-1".to_string(),
        args: vec!["-c".to_string(), "select 1".to_string()],
        workdir: None,
        stdin: None,
    };

    let err = runner.run(&runtime, &invocation, None).await.unwrap_err();
    assert!(matches!(err, PsqlRunnerError::Exec(_)));
}

#[tokio::test]
async fn fake_runner_records_calls_and_can_fail() {
    let runtime = FakeRuntimeAdapter::new();
    let runner = FakePsqlRunner::new();
    runner.fail();
    let invocation = PsqlInvocation {
        instance_id: "instance-1".to_string(),
        args: vec!["-c".to_string(), "select 1".to_string()],
        workdir: None,
        stdin: None,
    };

    let err = runner.run(&runtime, &invocation, None).await.unwrap_err();
    assert!(matches!(err, PsqlRunnerError::Exec(_)));
    assert_eq!(runner.calls().len(), 1);
}
