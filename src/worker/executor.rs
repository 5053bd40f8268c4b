use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WorkerError};
use crate::task::{CommandInput, CommandOutput, BLOB_SIZE_MAX};
use crate::template::CommandTemplate;
use crate::worker::capture::PrefixSuffixSaver;

/// Bytes of stderr retained at each end of the capture window.
pub const PREFIX_SUFFIX_LENGTH: usize = 32 * 1024;

/// Runs one configured command template as a shell subprocess.
///
/// When requested, stdout is captured whole under [`BLOB_SIZE_MAX`] — the
/// read aborts and the command fails the moment the ceiling is crossed.
/// Captured stderr is bounded by a [`PrefixSuffixSaver`] instead and never
/// fails on size: stderr is diagnostic, stdout is the result. Streams that
/// are not captured pass through to the worker's own stdio.
///
/// The child runs in its own process group so cancellation takes its
/// descendants down with it.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    template: CommandTemplate,
}

impl ShellExecutor {
    pub fn new(template: CommandTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    /// Execute the command with the invocation's arguments and stdio wiring.
    ///
    /// Non-zero exit codes are carried in the output, not raised as errors;
    /// a signal-terminated child reports exit code -1. Spawn and pipe
    /// failures propagate as infrastructure errors.
    pub async fn execute(
        &self,
        input: CommandInput,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        let command = self.template.resolve(&input.args);
        tracing::debug!(command = %command, "spawning shell command");

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(&command)
            .stdin(Stdio::piped())
            .stdout(if input.with_stdout {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(if input.with_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .process_group(0)
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        // Feed stdin from its own task; the child may exit without draining
        // it, so a broken pipe here is expected.
        let mut stdin = child.stdin.take().expect("stdin is piped");
        let stdin_data = input.stdin_data;
        tokio::spawn(async move {
            let _ = stdin.write_all(&stdin_data).await;
        });

        let stderr_task = if input.with_stderr {
            let mut pipe = child.stderr.take().expect("stderr is piped");
            Some(tokio::spawn(async move {
                let mut saver = PrefixSuffixSaver::new(PREFIX_SUFFIX_LENGTH);
                let mut buf = [0u8; 8192];
                loop {
                    match pipe.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => saver.write(&buf[..n]),
                    }
                }
                saver
            }))
        } else {
            None
        };

        let mut stdout_data = Vec::new();
        if input.with_stdout {
            let pipe = child.stdout.take().expect("stdout is piped");
            let mut limited = pipe.take(BLOB_SIZE_MAX as u64 + 1);
            tokio::select! {
                read = limited.read_to_end(&mut stdout_data) => {
                    read?;
                }
                () = cancel.cancelled() => {
                    kill_group(&mut child).await;
                    return Err(WorkerError::Cancelled);
                }
            }
            if stdout_data.len() > BLOB_SIZE_MAX {
                kill_group(&mut child).await;
                return Err(WorkerError::StdoutTooLarge);
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            () = cancel.cancelled() => {
                kill_group(&mut child).await;
                return Err(WorkerError::Cancelled);
            }
        };

        let stderr_data = match stderr_task {
            Some(task) => task.await.map_err(std::io::Error::other)?.into_bytes(),
            None => Vec::new(),
        };

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            tracing::debug!(command = %command, exit_code, "command exited non-zero");
        }

        Ok(CommandOutput {
            command,
            exit_code,
            stdout_data,
            stderr_data,
        })
    }
}

/// Kill the child's whole process group, then reap the child.
async fn kill_group(child: &mut Child) {
    if let Some(pid) = child.id() {
        // The child was spawned with process_group(0), so its pid is the pgid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
