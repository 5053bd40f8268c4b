use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use taskshell::error::WorkerError;
use taskshell::session::SessionSandbox;
use taskshell::task::{
    self, BeginOutput, CommandInput, CommandOutput, EndInput, ReadFileInput, ReadFileOutput,
    TaskRegistry,
};

fn test_sandbox() -> SessionSandbox {
    SessionSandbox::new(format!("taskshell-test-{}", uuid::Uuid::now_v7()))
}

fn host_registry(sandbox: SessionSandbox, commands: &[(&str, &str)]) -> TaskRegistry {
    let commands: HashMap<String, String> = commands
        .iter()
        .map(|(name, command)| (name.to_string(), command.to_string()))
        .collect();
    TaskRegistry::host(sandbox, &commands).unwrap()
}

async fn dispatch(registry: &TaskRegistry, name: &str, input: &[u8]) -> Result<Vec<u8>, WorkerError> {
    registry.dispatch(name, input, &CancellationToken::new()).await
}

#[tokio::test]
async fn session_lifecycle_round_trips_through_dispatch() {
    let sandbox = test_sandbox();
    let host_task_queue = sandbox.host_task_queue().to_string();
    let registry = host_registry(sandbox, &[]);

    // Begin with an empty payload.
    let begin: BeginOutput =
        serde_json::from_slice(&dispatch(&registry, task::BEGIN, b"").await.unwrap()).unwrap();
    assert_eq!(begin.host_task_queue, host_task_queue);
    assert!(begin.session_dir.is_dir());

    // A command writes a file into the session out of band.
    std::fs::write(begin.session_dir.join("artifact"), b"session data").unwrap();

    let read_input = serde_json::to_vec(&ReadFileInput {
        session_dir: begin.session_dir.clone(),
        file_name: "artifact".to_string(),
    })
    .unwrap();
    let read: ReadFileOutput =
        serde_json::from_slice(&dispatch(&registry, task::READ_FILE, &read_input).await.unwrap())
            .unwrap();
    assert_eq!(read.data, b"session data");

    let end_input = serde_json::to_vec(&EndInput {
        session_dir: begin.session_dir.clone(),
    })
    .unwrap();
    dispatch(&registry, task::END, &end_input).await.unwrap();
    assert!(!begin.session_dir.exists());

    // Reading from the removed session is a filesystem error, not a size one.
    let result = dispatch(&registry, task::READ_FILE, &read_input).await;
    assert!(matches!(result, Err(WorkerError::Io(_))));
}

#[tokio::test]
async fn command_task_round_trips_json_payloads() {
    let registry = host_registry(test_sandbox(), &[("greet", "echo Hello $name")]);

    let input = serde_json::to_vec(&CommandInput {
        args: HashMap::from([("name".to_string(), "World".to_string())]),
        with_stdout: true,
        ..CommandInput::default()
    })
    .unwrap();
    let output: CommandOutput =
        serde_json::from_slice(&dispatch(&registry, "greet", &input).await.unwrap()).unwrap();

    assert_eq!(output.command, "echo Hello 'World'");
    assert_eq!(output.exit_code, 0);
    assert_eq!(output.stdout_data, b"Hello World\n");
    assert!(output.stderr_data.is_empty());
}

#[tokio::test]
async fn command_task_feeds_stdin_from_base64() {
    let registry = host_registry(test_sandbox(), &[("copy", "cat")]);

    let input = serde_json::to_vec(&CommandInput {
        stdin_data: b"binary \x00 payload".to_vec(),
        with_stdout: true,
        ..CommandInput::default()
    })
    .unwrap();
    let output: CommandOutput =
        serde_json::from_slice(&dispatch(&registry, "copy", &input).await.unwrap()).unwrap();

    assert_eq!(output.stdout_data, b"binary \x00 payload");
}

#[tokio::test]
async fn unknown_task_is_a_typed_failure() {
    let registry = host_registry(test_sandbox(), &[]);

    let result = dispatch(&registry, "nope", b"").await;
    match result {
        Err(WorkerError::UnknownTask(name)) => assert_eq!(name, "nope"),
        other => panic!("expected unknown task error, got {other:?}"),
    }
}

#[tokio::test]
async fn route_registry_serves_only_begin() {
    let registry = TaskRegistry::route(test_sandbox());

    let begin: BeginOutput =
        serde_json::from_slice(&dispatch(&registry, task::BEGIN, b"").await.unwrap()).unwrap();
    std::fs::remove_dir_all(&begin.session_dir).unwrap();

    let result = dispatch(&registry, task::END, b"{}").await;
    assert!(matches!(result, Err(WorkerError::UnknownTask(_))));
}

#[tokio::test]
async fn end_rejects_out_of_scope_directory() {
    let registry = host_registry(test_sandbox(), &[]);

    let input = serde_json::to_vec(&EndInput {
        session_dir: "/etc".into(),
    })
    .unwrap();
    let result = dispatch(&registry, task::END, &input).await;
    assert!(matches!(result, Err(WorkerError::InvalidSessionDir)));
}

#[test]
fn configured_command_may_not_shadow_reserved_names() {
    let commands = HashMap::from([("Begin".to_string(), "true".to_string())]);
    let result = TaskRegistry::host(test_sandbox(), &commands);
    match result {
        Err(WorkerError::ReservedTaskName(name)) => assert_eq!(name, "Begin"),
        other => panic!("expected reserved-name error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_input_payload_fails_non_retryably() {
    let registry = host_registry(test_sandbox(), &[("greet", "echo hi")]);

    let result = dispatch(&registry, "greet", b"not json").await;
    match result {
        Err(err @ WorkerError::Payload(_)) => assert!(err.is_non_retryable()),
        other => panic!("expected payload error, got {other:?}"),
    }
}
