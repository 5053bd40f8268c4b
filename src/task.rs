use std::collections::HashMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WorkerError};
use crate::session::SessionSandbox;
use crate::template::CommandTemplate;
use crate::worker::executor::ShellExecutor;

/// Task names reserved for session lifecycle and file retrieval.
pub const BEGIN: &str = "Begin";
pub const END: &str = "End";
pub const READ_FILE: &str = "ReadFile";

/// Hard ceiling on the bytes materialized in memory for captured stdout or a
/// retrieved file. Matches the largest result payload the dispatch runtime
/// accepts without complaint.
pub const BLOB_SIZE_MAX: usize = 512 * 1024;

/// Input for a configured command task. All fields default when absent from
/// the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandInput {
    /// Substitution arguments for the command template.
    pub args: HashMap<String, String>,
    /// Bytes fed to the command's standard input.
    #[serde(with = "base64_bytes")]
    pub stdin_data: Vec<u8>,
    /// Capture stdout into the output instead of passing it through.
    pub with_stdout: bool,
    /// Capture stderr (bounded) into the output instead of passing it through.
    pub with_stderr: bool,
}

/// Output of a configured command task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// The resolved command string, for diagnostics.
    pub command: String,
    /// 0 on clean exit; the child's code otherwise; -1 when killed by a
    /// signal.
    pub exit_code: i32,
    #[serde(with = "base64_bytes")]
    pub stdout_data: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub stderr_data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeginInput {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeginOutput {
    pub host_task_queue: String,
    pub session_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndInput {
    pub session_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndOutput {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadFileInput {
    pub session_dir: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileOutput {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// What a task name maps to once configuration is resolved.
#[derive(Debug)]
pub enum TaskKind {
    BeginSession,
    EndSession,
    ReadFile,
    Command(ShellExecutor),
}

/// Lookup table from task name to behavior, built once at startup.
#[derive(Debug)]
pub struct TaskRegistry {
    sandbox: SessionSandbox,
    tasks: HashMap<String, TaskKind>,
}

impl TaskRegistry {
    /// The registry served on the shared task queue: `Begin` only, so any
    /// worker may open a session that the runtime then routes back to it.
    pub fn route(sandbox: SessionSandbox) -> Self {
        let mut tasks = HashMap::new();
        tasks.insert(BEGIN.to_string(), TaskKind::BeginSession);
        Self { sandbox, tasks }
    }

    /// The registry served on the worker's own host task queue: the session
    /// surface plus one task per configured command.
    ///
    /// # Errors
    ///
    /// Fails if a configured command shadows a reserved task name.
    pub fn host(sandbox: SessionSandbox, commands: &HashMap<String, String>) -> Result<Self> {
        let mut tasks = HashMap::new();
        tasks.insert(BEGIN.to_string(), TaskKind::BeginSession);
        tasks.insert(END.to_string(), TaskKind::EndSession);
        tasks.insert(READ_FILE.to_string(), TaskKind::ReadFile);
        for (name, command) in commands {
            if tasks.contains_key(name.as_str()) {
                return Err(WorkerError::ReservedTaskName(name.clone()));
            }
            tasks.insert(
                name.clone(),
                TaskKind::Command(ShellExecutor::new(CommandTemplate::new(command))),
            );
        }
        Ok(Self { sandbox, tasks })
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tasks.keys().map(String::as_str)
    }

    /// Run one task invocation: decode the JSON input, execute, encode the
    /// JSON output. Unknown names and undecodable payloads are non-retryable
    /// failures.
    pub async fn dispatch(
        &self,
        name: &str,
        input: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| WorkerError::UnknownTask(name.to_string()))?;
        match task {
            TaskKind::BeginSession => {
                decode::<BeginInput>(input)?;
                encode(&self.sandbox.begin()?)
            }
            TaskKind::EndSession => {
                let input: EndInput = decode(input)?;
                self.sandbox.end(&input.session_dir).await?;
                encode(&EndOutput {})
            }
            TaskKind::ReadFile => {
                let input: ReadFileInput = decode(input)?;
                let data = self
                    .sandbox
                    .read_file(&input.session_dir, &input.file_name)
                    .await?;
                encode(&ReadFileOutput { data })
            }
            TaskKind::Command(executor) => {
                let input: CommandInput = decode(input)?;
                encode(&executor.execute(input, cancel).await?)
            }
        }
    }
}

/// Absent or empty payloads decode to the input type's default.
fn decode<T: DeserializeOwned + Default>(input: &[u8]) -> Result<T> {
    if input.is_empty() {
        Ok(T::default())
    } else {
        Ok(serde_json::from_slice(input)?)
    }
}

fn encode<T: Serialize>(output: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(output)?)
}

/// Byte fields travel as base64 strings inside the JSON payloads.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
